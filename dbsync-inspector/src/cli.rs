//! Command line and environment configuration for the Inspector binary.

use crate::server::InspectorConfig;
use clap::{Args, Parser};
use dbsync_core::adapters::ConnectionConfig;
use dbsync_core::logging::LogTarget;
use dbsync_core::security::{AllowListSource, DEFAULT_TOKEN_INTERVAL_SECS, GateConfig, SharedSecret};
use dbsync_core::settings::parse_byte_size;
use dbsync_core::{DbSyncError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dbsync-inspector")]
#[command(about = "Remote schema Inspector for dbsync")]
#[command(version)]
#[command(long_about = "
dbsync Inspector - read-only schema and row export endpoint

Serves /api/inspect for dbsync agents. Each request names an action
(get_tables, get_table_structure, get_table_data, ...) and the database
credentials to use; the Inspector connects read-only, answers with a JSON
envelope and disconnects.

SECURITY FEATURES:
- Loopback callers are always allowed
- Other callers must be on the allow-list AND present the shared secret
- Optional time-boxed token on top of the secret (--require-token)
- Database sessions are read-only; credentials are never stored

EXAMPLES:
  DBSYNC_API_SECRET=s3cret dbsync-inspector --allow-list /etc/dbsync/allowed_ips.txt
  dbsync-inspector --listen 127.0.0.1:9000 --max-execution-time 300 -v
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Listen address
    #[arg(long, env = "DBSYNC_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Shared secret presented by agents
    #[arg(
        long,
        env = "DBSYNC_API_SECRET",
        hide_env_values = true,
        help = "Shared secret agents must send as X-API-Key"
    )]
    pub api_secret: Option<String>,

    /// Allow-list file
    #[arg(
        long,
        env = "DBSYNC_ALLOW_LIST",
        default_value = "allowed_ips.txt",
        help = "Newline-delimited IPs and CIDR blocks; re-read on every request"
    )]
    pub allow_list: PathBuf,

    /// Require the derived token as well as the secret
    #[arg(long, env = "DBSYNC_REQUIRE_TOKEN")]
    pub require_token: bool,

    /// Token bucket width in seconds
    #[arg(long, default_value_t = DEFAULT_TOKEN_INTERVAL_SECS)]
    pub token_interval: u64,

    /// Ignore X-Forwarded-For, X-Real-IP and Client-IP
    #[arg(
        long,
        help = "Use only the socket peer address for the allow-list. Without this flag any \
                caller that reaches the port directly can forge these headers, including a \
                loopback address that skips every check; keep it unless a reverse proxy sets them"
    )]
    pub ignore_proxy_headers: bool,

    /// Per-request execution limit in seconds (0 = unlimited)
    #[arg(long, env = "DBSYNC_MAX_EXECUTION_TIME", default_value_t = 0)]
    pub max_execution_time: u64,

    /// Request body cap such as 512M (-1 = unlimited)
    #[arg(long, env = "DBSYNC_MEMORY_LIMIT", default_value = "-1", allow_hyphen_values = true)]
    pub memory_limit: String,

    /// Database connect timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Turn logging on or off
    #[arg(
        long,
        env = "DBSYNC_LOG_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub log_enabled: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "DBSYNC_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn log_target(&self) -> LogTarget {
        LogTarget::from_settings(self.log_enabled, self.log_file.clone())
    }
}

impl Cli {
    /// Server configuration. A missing secret is allowed but only loopback
    /// callers will get through.
    pub fn server_config(&self) -> Result<InspectorConfig> {
        let secret = SharedSecret::new(self.api_secret.clone().unwrap_or_default());
        if secret.is_empty() {
            tracing::warn!("No shared secret configured; only loopback callers will be served");
        }
        if self.trusts_proxy_headers_publicly() {
            tracing::warn!(
                "Trusting X-Forwarded-For, X-Real-IP and Client-IP on {}; a caller that can reach \
                 this port directly can claim a loopback address. Pass --ignore-proxy-headers \
                 unless a reverse proxy sets these headers",
                self.listen
            );
        }
        if self.token_interval == 0 {
            return Err(DbSyncError::configuration(
                "Token interval must be at least one second",
            ));
        }

        let max_execution_time =
            (self.max_execution_time > 0).then(|| Duration::from_secs(self.max_execution_time));
        Ok(InspectorConfig {
            listen: self.listen,
            gate: GateConfig {
                secret,
                require_token: self.require_token,
                token_interval_secs: self.token_interval,
                trust_proxy_headers: !self.ignore_proxy_headers,
                allow_list: AllowListSource::File(self.allow_list.clone()),
            },
            max_execution_time,
            body_limit: parse_byte_size(&self.memory_limit)?,
        })
    }

    /// Proxy headers are honoured on an address other hosts can reach.
    pub fn trusts_proxy_headers_publicly(&self) -> bool {
        !self.ignore_proxy_headers && !self.listen.ip().is_loopback()
    }

    /// Settings for the per-request database connections.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::default()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_max_execution_secs(self.max_execution_time)
            .with_read_only(true);
        config.validate()?;
        Ok(config)
    }
}
