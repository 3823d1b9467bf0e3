//! dbsync agent binary.
//!
//! `run` performs one sync and prints its report, `serve` exposes the local
//! API, `add-user` and `remove-user` manage console accounts and `token`
//! prints the current derived sync token.

use anyhow::Context;
use clap::Parser;
use dbsync::cli::{AddUserArgs, Command, GlobalArgs, RunArgs, ServeArgs, TokenArgs};
use dbsync::{AgentState, Cli, MySqlBackend, SyncService};
use dbsync_core::Settings;
use dbsync_core::logging::init_logging;
use dbsync_core::security::{
    AccessGate, AccountStore, AllowListSource, GateConfig, JsonFileStore, KeyValueStore,
    SessionManager, SharedSecret, current_token,
};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = cli.global.load_settings()?;
    init_logging(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_target(&settings),
    )?;

    let outcome = match &cli.command {
        Command::Run(args) => run(&cli.global, args, settings).await,
        Command::Serve(args) => serve(&cli.global, args, settings)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::AddUser(args) => add_user(&cli.global, args).map(|()| ExitCode::SUCCESS),
        Command::RemoveUser(args) => remove_user(&cli.global, args),
        Command::Token(args) => {
            token(args);
            Ok(ExitCode::SUCCESS)
        }
    };

    outcome.inspect_err(|e| error!("{:#}", e))
}

fn open_store(global: &GlobalArgs) -> Arc<dyn KeyValueStore> {
    Arc::new(JsonFileStore::new(global.store_path()))
}

/// Reads a password without echo. The prompt goes to stderr so stdout
/// stays machine readable.
fn prompt_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    eprint!("{}", prompt);
    std::io::stderr()
        .flush()
        .context("Failed to flush stderr before reading password")?;
    let password = rpassword::read_password().context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Runs one sync and prints the report as JSON.
async fn run(global: &GlobalArgs, args: &RunArgs, settings: Settings) -> anyhow::Result<ExitCode> {
    let connection = args.local.connection_config(&settings)?;
    let backend = MySqlBackend::new(args.local.local_database_url.clone(), connection)?;
    let service = SyncService::new(Arc::new(backend), open_store(global))
        .with_settings(settings, Some(global.settings_path()));

    let mut request = args.to_request();
    if request.remote_db_pass.is_none()
        && !args.no_prompt
        && service.remembered()?.remote_db_pass.is_none()
    {
        request.remote_db_pass = Some(prompt_password("Remote database password: ")?);
    }

    let report = service.run(request).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to encode sync report")?
    );

    if report.success {
        info!("✓ Sync completed");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Serves the local API until Ctrl-C.
async fn serve(global: &GlobalArgs, args: &ServeArgs, settings: Settings) -> anyhow::Result<()> {
    let connection = args.local.connection_config(&settings)?;
    let backend = MySqlBackend::new(args.local.local_database_url.clone(), connection)?;
    let store = open_store(global);

    let accounts = AccountStore::new(Arc::clone(&store));
    let usernames = accounts.usernames()?;
    if usernames.is_empty() {
        warn!("No console accounts; allow-listed callers are served without logging in");
        warn!("Create one with `dbsync add-user <name>`");
    } else {
        info!("{} console account(s) configured", usernames.len());
    }

    let body_limit = settings.memory_limit_bytes()?;
    let request_timeout =
        (settings.max_execution_time > 0).then(|| Duration::from_secs(settings.max_execution_time));

    let service = Arc::new(
        SyncService::new(Arc::new(backend), Arc::clone(&store))
            .with_settings(settings, Some(global.settings_path())),
    );
    let gate = AccessGate::new(GateConfig {
        trust_proxy_headers: !args.ignore_proxy_headers,
        allow_list: AllowListSource::File(args.allow_list.clone()),
        ..GateConfig::default()
    });
    let state = AgentState::new(service, gate, accounts, SessionManager::new(store))
        .with_body_limit(body_limit)
        .with_request_timeout(request_timeout);

    dbsync::serve(args.listen, state).await?;
    Ok(())
}

fn add_user(global: &GlobalArgs, args: &AddUserArgs) -> anyhow::Result<()> {
    let password = prompt_password(&format!("Password for '{}': ", args.username))?;
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    let confirm = prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    AccountStore::new(open_store(global)).add_user(&args.username, &password)?;
    println!("Account '{}' saved", args.username.trim());
    Ok(())
}

fn remove_user(global: &GlobalArgs, args: &AddUserArgs) -> anyhow::Result<ExitCode> {
    if AccountStore::new(open_store(global)).remove_user(&args.username)? {
        println!("Account '{}' removed", args.username);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("No account named '{}'", args.username);
        Ok(ExitCode::FAILURE)
    }
}

fn token(args: &TokenArgs) {
    let secret = SharedSecret::new(args.api_secret.clone());
    println!("{}", current_token(&secret, args.interval));
}
