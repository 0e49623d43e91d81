//! # Sync State Repository
//!
//! One watermark row per tenant. Written by the orchestrator at the end of
//! a successful pass, or by an operator seeding the first watermark.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use ledger_core::SyncState;

/// Repository for sync state operations.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    pub async fn get(&self, tenant_id: &str) -> DbResult<Option<SyncState>> {
        let state = sqlx::query_as::<_, SyncState>(
            "SELECT tenant_id, watermark, last_run_at FROM sync_state WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    /// Inserts or replaces the state for `state.tenant_id`.
    pub async fn save(&self, state: &SyncState) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (tenant_id, watermark, last_run_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tenant_id) DO UPDATE SET
                watermark = excluded.watermark,
                last_run_at = excluded.last_run_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.tenant_id)
        .bind(state.watermark)
        .bind(state.last_run_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Establishes the first watermark; the next scheduled pass is due at once.
    pub async fn seed(&self, tenant_id: &str, watermark: DateTime<Utc>) -> DbResult<SyncState> {
        let state = SyncState {
            tenant_id: tenant_id.to_string(),
            watermark,
            last_run_at: None,
        };
        self.save(&state).await?;

        info!(tenant_id = %tenant_id, watermark = %watermark, "Seeded sync watermark");
        Ok(state)
    }
}
