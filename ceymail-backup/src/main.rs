//! CeyMail backup service - main entry point

use anyhow::{Context, Result};
use ceymail_backup::auth::TokenGate;
use ceymail_backup::config::AppConfig;
use ceymail_backup::credentials::ConfigCredentials;
use ceymail_backup::services::process::SystemRunner;
use ceymail_backup::services::{BackupService, BackupSettings};
use ceymail_backup::state::AppState;
use ceymail_backup::{routes, utils};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backup_dir = %config.backup.dir.display(),
        "Starting ceymail-backup"
    );

    if config.auth.admin_token.is_none() {
        tracing::warn!("No admin token configured; every backup request will be rejected");
    }

    let settings = BackupSettings::from_config(&config)?;
    let runner = SystemRunner::new(
        config.commands.sudo.clone(),
        config.commands.elevated_allow_list(),
    );
    let credentials = ConfigCredentials::new(config.database.clone());
    let gate = TokenGate::new(config.auth.admin_token.clone());

    let backups = BackupService::new(settings, Arc::new(runner), Arc::new(credentials));
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = Arc::new(AppState::new(Arc::new(gate), backups));

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
