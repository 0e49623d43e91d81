//! # Transfer Repository
//!
//! Stock transfers materialized from incoming invoices.
//!
//! Headers and lines are written by separate calls. Lines go in as one
//! transaction, so a failed batch leaves no lines behind; removing the
//! orphaned header is the caller's compensating step ([`TransferRepository::delete`]).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use ledger_core::{NewTransferLine, Transfer, TransferLine};

const TRANSFER_COLUMNS: &str = "id, invoice_id, source_warehouse_id, dest_warehouse_id, created_at";
const LINE_COLUMNS: &str = "id, transfer_id, line_no, catalog_item_id, quantity, price_cents";

/// Repository for transfer operations.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Inserts a transfer header.
    pub async fn create_header(
        &self,
        invoice_id: &str,
        source_warehouse_id: &str,
        dest_warehouse_id: &str,
    ) -> DbResult<Transfer> {
        let transfer = Transfer {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            source_warehouse_id: source_warehouse_id.to_string(),
            dest_warehouse_id: dest_warehouse_id.to_string(),
            created_at: Utc::now(),
        };

        debug!(
            transfer_id = %transfer.id,
            invoice_id = %invoice_id,
            source = %source_warehouse_id,
            dest = %dest_warehouse_id,
            "Creating transfer header"
        );

        sqlx::query(
            r#"
            INSERT INTO transfers (id, invoice_id, source_warehouse_id, dest_warehouse_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&transfer.id)
        .bind(&transfer.invoice_id)
        .bind(&transfer.source_warehouse_id)
        .bind(&transfer.dest_warehouse_id)
        .bind(transfer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(transfer)
    }

    /// Inserts all lines of a transfer in a single transaction.
    pub async fn insert_lines(
        &self,
        transfer_id: &str,
        lines: &[NewTransferLine],
    ) -> DbResult<Vec<TransferLine>> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(lines.len());

        for line in lines {
            let row = TransferLine {
                id: Uuid::new_v4().to_string(),
                transfer_id: transfer_id.to_string(),
                line_no: line.line_no,
                catalog_item_id: line.catalog_item_id.clone(),
                quantity: line.quantity,
                price_cents: line.price_cents,
            };

            sqlx::query(
                r#"
                INSERT INTO transfer_lines (id, transfer_id, line_no, catalog_item_id, quantity, price_cents)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&row.id)
            .bind(&row.transfer_id)
            .bind(row.line_no)
            .bind(&row.catalog_item_id)
            .bind(row.quantity)
            .bind(row.price_cents)
            .execute(&mut *tx)
            .await?;

            written.push(row);
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Deletes a transfer and its lines. Returns false if it did not exist.
    pub async fn delete(&self, transfer_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM transfers WHERE id = ?1")
            .bind(transfer_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn for_invoice(&self, invoice_id: &str) -> DbResult<Vec<Transfer>> {
        let sql = format!(
            "SELECT {} FROM transfers WHERE invoice_id = ?1 ORDER BY created_at",
            TRANSFER_COLUMNS
        );
        let transfers = sqlx::query_as::<_, Transfer>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(transfers)
    }

    pub async fn lines(&self, transfer_id: &str) -> DbResult<Vec<TransferLine>> {
        let sql = format!(
            "SELECT {} FROM transfer_lines WHERE transfer_id = ?1 ORDER BY line_no",
            LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, TransferLine>(&sql)
            .bind(transfer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }
}
