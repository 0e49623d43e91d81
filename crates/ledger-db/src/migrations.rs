//! # Database Migrations
//!
//! Embedded SQL migrations for the ledger database.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `crates/ledger-db/migrations/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_transfer_status.sql`)
//! 3. Use `IF NOT EXISTS` where possible
//! 4. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Migrations embedded at compile time from `./migrations`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs all pending database migrations.
///
/// Idempotent; each migration runs in its own transaction and is recorded in
/// `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for health reporting.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    // The bookkeeping table does not exist before the first run.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
