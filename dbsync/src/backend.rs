//! Where a run reads from and writes to.
//!
//! [`SyncBackend`] opens both ends of a run. Production uses the HTTP
//! transfer client and a MySQL sink; tests substitute in-memory doubles.

use async_trait::async_trait;
use dbsync_core::{ExecutionSink, RemoteSource, Result, SyncPlan};

/// Opens the remote source and local sink for one run.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Read side for a resolved plan.
    fn remote(&self, plan: &SyncPlan) -> Result<Box<dyn RemoteSource>>;

    /// A fresh local connection, held for the whole run.
    async fn local(&self) -> Result<Box<dyn ExecutionSink>>;
}

#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;

#[cfg(feature = "mysql")]
mod mysql {
    use super::SyncBackend;
    use async_trait::async_trait;
    use dbsync_core::adapters::mysql::{MySqlSink, validate_mysql_connection_string};
    use dbsync_core::error::redact_database_url;
    use dbsync_core::{
        ConnectionConfig, ExecutionSink, RemoteSource, Result, SyncPlan, TransferClient,
    };
    use zeroize::Zeroizing;

    /// Transfer client in, MySQL out.
    pub struct MySqlBackend {
        local_url: Zeroizing<String>,
        connection: ConnectionConfig,
    }

    impl std::fmt::Debug for MySqlBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MySqlBackend")
                .field("local_url", &redact_database_url(&self.local_url))
                .field("connection", &self.connection)
                .finish()
        }
    }

    impl MySqlBackend {
        /// Validates the local connection string up front.
        pub fn new(local_url: impl Into<String>, connection: ConnectionConfig) -> Result<Self> {
            let local_url = Zeroizing::new(local_url.into());
            validate_mysql_connection_string(&local_url)?;
            connection.validate()?;
            Ok(Self {
                local_url,
                connection: connection.with_read_only(false),
            })
        }
    }

    #[async_trait]
    impl SyncBackend for MySqlBackend {
        fn remote(&self, plan: &SyncPlan) -> Result<Box<dyn RemoteSource>> {
            let client = TransferClient::new(plan.client.clone(), plan.credentials.clone())?;
            Ok(Box::new(client))
        }

        async fn local(&self) -> Result<Box<dyn ExecutionSink>> {
            let sink = MySqlSink::connect(&self.local_url, &self.connection).await?;
            Ok(Box::new(sink))
        }
    }

}
