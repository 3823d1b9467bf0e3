//! dbsync Inspector binary.
//!
//! Serves the read-only `/api/inspect` endpoint that dbsync agents clone
//! remote databases through.
//!
//! # Security Guarantees
//! - Every request passes the IP allow-list and shared secret gate first
//! - Database sessions are read-only
//! - Credentials are supplied per request and never stored or logged

use clap::Parser;
use dbsync_core::adapters::mysql::MySqlConnector;
use dbsync_core::logging::init_logging;
use dbsync_inspector::{Cli, serve};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_target())?;

    let config = cli.server_config()?;
    let connector = MySqlConnector::new(cli.connection_config()?);

    if let Err(e) = serve(config, Arc::new(connector)).await {
        tracing::error!("Inspector stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
