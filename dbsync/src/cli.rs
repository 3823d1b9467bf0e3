//! Command line and environment configuration for the agent binary.

use clap::{Args, Parser, Subcommand};
use dbsync_core::adapters::ConnectionConfig;
use dbsync_core::logging::LogTarget;
use dbsync_core::security::{DEFAULT_TOKEN_INTERVAL_SECS, SharedSecret};
use dbsync_core::{Result, Settings, SyncRequest};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "dbsync")]
#[command(about = "Clone a remote MySQL database through a dbsync Inspector")]
#[command(version)]
#[command(long_about = "
dbsync - local sync agent

Copies the tables, rows, views, procedures, functions and triggers of a
remote MySQL or MariaDB database into a local one. The remote side must run
dbsync-inspector; every call carries the shared secret and the remote
database credentials, nothing is stored on the remote host.

Missing request fields are taken from the last successful request (secrets
for 24 hours, everything else for 30 days) and then from settings.json in
the data directory.

EXAMPLES:
  dbsync run --remote-url https://remote.example --remote-db-host db.internal \\
      --remote-db-user reader --remote-db-name shop --local-db-name shop_copy
  dbsync serve --listen 127.0.0.1:8090
  dbsync add-user admin
  DBSYNC_API_SECRET=s3cret dbsync token
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one sync and print the report
    Run(RunArgs),
    /// Serve the local sync API
    Serve(ServeArgs),
    /// Create or replace a console account
    AddUser(AddUserArgs),
    /// Delete a console account
    RemoveUser(AddUserArgs),
    /// Print the current derived sync token
    Token(TokenArgs),
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Turn logging on or off
    #[arg(
        long,
        global = true,
        env = "DBSYNC_LOG_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub log_enabled: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, env = "DBSYNC_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Directory holding settings.json and store.json
    #[arg(long, global = true, env = "DBSYNC_DATA_DIR", default_value = ".dbsync")]
    pub data_dir: PathBuf,

    /// Settings file (defaults to <data-dir>/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Per-statement and per-request limit in seconds (0 = unlimited)
    #[arg(long, global = true, env = "DBSYNC_MAX_EXECUTION_TIME")]
    pub max_execution_time: Option<u64>,

    /// Request body cap such as 512M (-1 = unlimited)
    #[arg(
        long,
        global = true,
        env = "DBSYNC_MEMORY_LIMIT",
        allow_hyphen_values = true
    )]
    pub memory_limit: Option<String>,
}

impl GlobalArgs {
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(|| self.data_dir.join("settings.json"))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Loads the settings file and applies command line overrides.
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.settings_path())?;
        if let Some(secs) = self.max_execution_time {
            settings.max_execution_time = secs;
        }
        if let Some(limit) = &self.memory_limit {
            settings.memory_limit = Some(limit.clone());
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Logging is on only when both the flag and the settings allow it.
    pub fn log_target(&self, settings: &Settings) -> LogTarget {
        LogTarget::from_settings(
            self.log_enabled && settings.logging_enabled,
            self.log_file.clone().or_else(|| settings.log_file.clone()),
        )
    }
}

/// Local MySQL server the agent writes into.
#[derive(Args)]
pub struct LocalArgs {
    /// Local MySQL server URL
    #[arg(
        long,
        env = "DBSYNC_LOCAL_DATABASE_URL",
        hide_env_values = true,
        default_value = "mysql://root@localhost:3306",
        help = "Local MySQL server (no database path needed)"
    )]
    pub local_database_url: String,

    /// Local connect timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,
}

impl LocalArgs {
    /// Read-write connection settings for the local sink.
    pub fn connection_config(&self, settings: &Settings) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::default()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_max_execution_secs(settings.max_execution_time)
            .with_read_only(false);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub local: LocalArgs,

    /// Base URL of the remote Inspector
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Shared secret of the remote Inspector
    #[arg(long, env = "DBSYNC_API_SECRET", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Also send the time-boxed derived token
    #[arg(long)]
    pub use_token: bool,

    #[arg(long)]
    pub remote_db_host: Option<String>,

    #[arg(long)]
    pub remote_db_port: Option<u16>,

    #[arg(long)]
    pub remote_db_user: Option<String>,

    /// Prompted for when neither given nor remembered
    #[arg(long)]
    pub remote_db_pass: Option<String>,

    #[arg(long)]
    pub remote_db_name: Option<String>,

    /// Local destination database
    #[arg(long)]
    pub local_db_name: Option<String>,

    /// Rows per page (100-10000)
    #[arg(long, env = "DBSYNC_CHUNK_SIZE")]
    pub chunk_size: Option<u64>,

    /// Stop at the first table that fails instead of skipping it
    #[arg(long)]
    pub abort_on_missing_structure: bool,

    /// Leave foreign key checks on while writing
    #[arg(long)]
    pub keep_foreign_keys: bool,

    /// Keep DEFINER clauses in view, routine and trigger DDL
    #[arg(long)]
    pub keep_definers: bool,

    /// Never prompt for the remote database password
    #[arg(long)]
    pub no_prompt: bool,
}

impl RunArgs {
    /// The request as given on the command line. Flags that were not set
    /// stay empty so remembered values can fill them.
    pub fn to_request(&self) -> SyncRequest {
        SyncRequest {
            remote_url: self.remote_url.clone(),
            api_key: self.api_key.clone().map(SharedSecret::new),
            use_token: self.use_token.then_some(true),
            remote_db_host: self.remote_db_host.clone(),
            remote_db_port: self.remote_db_port,
            remote_db_user: self.remote_db_user.clone(),
            remote_db_pass: self.remote_db_pass.clone().map(Zeroizing::new),
            remote_db_name: self.remote_db_name.clone(),
            local_db_name: self.local_db_name.clone(),
            chunk_size: self.chunk_size,
            abort_on_missing_structure: self.abort_on_missing_structure.then_some(true),
            disable_foreign_keys: self.keep_foreign_keys.then_some(false),
            strip_definers: self.keep_definers.then_some(false),
        }
    }
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub local: LocalArgs,

    /// Listen address
    #[arg(long, env = "DBSYNC_LISTEN", default_value = "127.0.0.1:8090")]
    pub listen: SocketAddr,

    /// Allow-list file
    #[arg(
        long,
        env = "DBSYNC_ALLOW_LIST",
        default_value = "allowed_ips.txt",
        help = "Newline-delimited IPs and CIDR blocks; re-read on every request"
    )]
    pub allow_list: PathBuf,

    /// Ignore X-Forwarded-For, X-Real-IP and Client-IP
    #[arg(long, help = "Use only the socket peer address for the allow-list")]
    pub ignore_proxy_headers: bool,
}

#[derive(Args)]
pub struct AddUserArgs {
    /// Account name
    pub username: String,
}

#[derive(Args)]
pub struct TokenArgs {
    /// Shared secret the token is derived from
    #[arg(long, env = "DBSYNC_API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    /// Token bucket width in seconds
    #[arg(long, default_value_t = DEFAULT_TOKEN_INTERVAL_SECS)]
    pub interval: u64,
}
