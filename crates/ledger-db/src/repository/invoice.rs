//! # Invoice Repository
//!
//! Local mirror of tax-service invoices, keyed by the external id.
//!
//! ## Upsert Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  INSERT INTO invoices (...) VALUES (...)                               │
//! │  ON CONFLICT(id) DO UPDATE SET                                         │
//! │      every synced column = excluded.column                             │
//! │      (seen is NOT in the list: operator state survives re-syncs)       │
//! │                                                                         │
//! │  Lines: DELETE FROM invoice_items WHERE invoice_id = ?                 │
//! │         INSERT ... one row per line          } one transaction         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ledger_core::{LocalInvoice, LocalInvoiceItem, NewInvoiceItem};

const INVOICE_COLUMNS: &str = "id, tenant_id, doc_type, direction, number, doc_date, \
    supplier_tin, supplier_name, buyer_tin, buyer_name, partner_id, total_cents, vat_cents, \
    status, external_created_at, external_updated_at, raw_payload, seen, synced_at";

const ITEM_COLUMNS: &str = "id, invoice_id, line_no, name, catalog_item_id, class_code, unit, \
    quantity, price_cents, total_cents, vat_cents";

/// Repository for invoice and invoice line operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LocalInvoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, LocalInvoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Inserts the invoice or refreshes every synced column of an existing row.
    ///
    /// The `seen` value of `invoice` is only used on insert.
    pub async fn upsert(&self, invoice: &LocalInvoice) -> DbResult<()> {
        debug!(invoice_id = %invoice.id, direction = %invoice.direction, "Upserting invoice");

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, tenant_id, doc_type, direction, number, doc_date,
                supplier_tin, supplier_name, buyer_tin, buyer_name, partner_id,
                total_cents, vat_cents, status, external_created_at, external_updated_at,
                raw_payload, seen, synced_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19
            )
            ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                doc_type = excluded.doc_type,
                direction = excluded.direction,
                number = excluded.number,
                doc_date = excluded.doc_date,
                supplier_tin = excluded.supplier_tin,
                supplier_name = excluded.supplier_name,
                buyer_tin = excluded.buyer_tin,
                buyer_name = excluded.buyer_name,
                partner_id = COALESCE(excluded.partner_id, invoices.partner_id),
                total_cents = excluded.total_cents,
                vat_cents = excluded.vat_cents,
                status = excluded.status,
                external_created_at = excluded.external_created_at,
                external_updated_at = excluded.external_updated_at,
                raw_payload = excluded.raw_payload,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.tenant_id)
        .bind(&invoice.doc_type)
        .bind(invoice.direction)
        .bind(&invoice.number)
        .bind(&invoice.doc_date)
        .bind(&invoice.supplier_tin)
        .bind(&invoice.supplier_name)
        .bind(&invoice.buyer_tin)
        .bind(&invoice.buyer_name)
        .bind(&invoice.partner_id)
        .bind(invoice.total_cents)
        .bind(invoice.vat_cents)
        .bind(&invoice.status)
        .bind(invoice.external_created_at)
        .bind(invoice.external_updated_at)
        .bind(&invoice.raw_payload)
        .bind(invoice.seen)
        .bind(invoice.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces all lines of an invoice in one transaction.
    ///
    /// Returns the rows as written, ordered by line number.
    pub async fn replace_items(
        &self,
        invoice_id: &str,
        items: &[NewInvoiceItem],
    ) -> DbResult<Vec<LocalInvoiceItem>> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM invoice_items WHERE invoice_id = ?1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut written = Vec::with_capacity(items.len());
        for item in items {
            let row = LocalInvoiceItem {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice_id.to_string(),
                line_no: item.line_no,
                name: item.name.trim().to_string(),
                catalog_item_id: item.catalog_item_id.clone(),
                class_code: item.class_code.clone(),
                unit: item.unit.clone(),
                quantity: item.quantity,
                price_cents: item.price_cents,
                total_cents: item.total_cents,
                vat_cents: item.vat_cents,
            };

            sqlx::query(
                r#"
                INSERT INTO invoice_items (
                    id, invoice_id, line_no, name, catalog_item_id, class_code, unit,
                    quantity, price_cents, total_cents, vat_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&row.id)
            .bind(&row.invoice_id)
            .bind(row.line_no)
            .bind(&row.name)
            .bind(&row.catalog_item_id)
            .bind(&row.class_code)
            .bind(&row.unit)
            .bind(row.quantity)
            .bind(row.price_cents)
            .bind(row.total_cents)
            .bind(row.vat_cents)
            .execute(&mut *tx)
            .await?;

            written.push(row);
        }

        tx.commit().await?;

        debug!(
            invoice_id = %invoice_id,
            removed,
            written = written.len(),
            "Replaced invoice items"
        );

        written.sort_by_key(|row| row.line_no);
        Ok(written)
    }

    /// Lines of an invoice ordered by line number.
    pub async fn items(&self, invoice_id: &str) -> DbResult<Vec<LocalInvoiceItem>> {
        let sql = format!(
            "SELECT {} FROM invoice_items WHERE invoice_id = ?1 ORDER BY line_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, LocalInvoiceItem>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Sets the operator `seen` flag.
    pub async fn mark_seen(&self, id: &str, seen: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE invoices SET seen = ?2 WHERE id = ?1")
            .bind(id)
            .bind(seen)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }

        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
