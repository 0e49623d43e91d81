//! # ledger-syncd
//!
//! Background daemon that keeps the ledger in step with the tax service.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tracing ─► config ─► database (migrations) ─► client ─► scheduler     │
//! │                                                                         │
//! │  running:   scheduled passes every interval                            │
//! │             SIGUSR1 ──► trigger_now() ──► summary logged               │
//! │                                                                         │
//! │  Ctrl-C / SIGTERM ──► scheduler.shutdown() ──► db.close()              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! ledger-syncd [CONFIG_PATH]
//! ```
//! Without a path the platform config directory is used (`sync.toml`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledger_db::{Database, DbConfig};
use ledger_sync::{InMemoryTokenStore, Scheduler, SyncConfig, SyncOrchestrator, TaxServiceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ledger sync daemon...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("Failed to load sync configuration")?;
    info!(
        tenant_id = %config.principal.tenant_id,
        base_url = %config.service.base_url,
        interval_secs = config.schedule.interval_secs,
        "Configuration loaded"
    );

    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let (total, applied) = db.migration_status().await?;
    if !db.health_check().await {
        anyhow::bail!("Database at {} failed its health check", db_path.display());
    }
    info!(path = %db_path.display(), applied, total, "Database ready");

    let principal = config.principal();
    let client = TaxServiceClient::new(
        &config.service,
        principal.clone(),
        Arc::new(InMemoryTokenStore::new()),
    )?;

    let orchestrator = SyncOrchestrator::new(
        Arc::new(client),
        Arc::new(db.clone()),
        &principal,
        (&config).into(),
    );
    let scheduler = Scheduler::start(Arc::new(orchestrator), (&config.schedule).into());

    #[cfg(unix)]
    let manual = tokio::spawn(manual::trigger_loop(scheduler.clone()));

    shutdown_signal().await;

    #[cfg(unix)]
    manual.abort();

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler did not stop cleanly");
    }
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise engine crates log at debug.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledger=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(unix)]
mod manual {
    use ledger_sync::{SchedulerHandle, SyncError};
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info, warn};

    /// Runs a manual sync for every SIGUSR1.
    pub async fn trigger_loop(scheduler: SchedulerHandle) {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "SIGUSR1 handler unavailable; manual sync disabled");
                return;
            }
        };

        while usr1.recv().await.is_some() {
            info!("SIGUSR1 received, running manual sync");

            match scheduler.trigger_now().await {
                Ok(report) => info!(
                    summary = %report.summary(),
                    transfers = report.transfers_created,
                    anchor = %report.anchor,
                    "Manual sync finished"
                ),
                Err(SyncError::AlreadyRunning) => {
                    warn!("Sync already running; manual trigger ignored")
                }
                Err(e) => error!(error = %e, "Manual sync failed"),
            }
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
