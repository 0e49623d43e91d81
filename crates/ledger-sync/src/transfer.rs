//! # Transfer Materialization
//!
//! Turns a newly synced incoming invoice into a stock transfer from the
//! supplier's warehouse to the ledger's receiving warehouse.
//!
//! ## Write Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. destination = setting "transfer.default_destination_warehouse"     │
//! │                   or WH-MAIN                                           │
//! │  2. resolve each invoice line → catalog item (parent if merged)        │
//! │  3. INSERT transfer header                                             │
//! │  4. INSERT all lines ─── one transaction                               │
//! │        │                                                                │
//! │        └── failed ──► DELETE header (compensating action)              │
//! │                       outcome: transfer_id = None, errors = [...]      │
//! │                                                                         │
//! │  A transfer exists with all of its lines, or not at all.               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures here never fail the invoice; they are reported on the outcome.

use std::sync::Arc;
use tracing::{error, info, warn};

use ledger_core::{NewTransferLine, DEFAULT_DESTINATION_WAREHOUSE, DESTINATION_WAREHOUSE_SETTING};

use crate::catalog::ItemResolver;
use crate::error::SyncResult;
use crate::store::LedgerStore;

/// Result of one materialization attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Set only when the header and every line were written.
    pub transfer_id: Option<String>,
    pub lines: usize,
    pub errors: Vec<String>,
}

impl TransferOutcome {
    pub fn is_complete(&self) -> bool {
        self.transfer_id.is_some() && self.errors.is_empty()
    }
}

/// Creates transfers through the ledger store.
pub struct TransferMaterializer {
    store: Arc<dyn LedgerStore>,
}

impl TransferMaterializer {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        TransferMaterializer { store }
    }

    /// Materializes a transfer for `invoice_id` out of `source_warehouse_id`.
    pub async fn materialize(
        &self,
        invoice_id: &str,
        source_warehouse_id: &str,
        items: &mut ItemResolver,
    ) -> TransferOutcome {
        match self.write(invoice_id, source_warehouse_id, items).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(invoice_id = %invoice_id, error = %e, "Transfer not materialized");
                TransferOutcome {
                    transfer_id: None,
                    lines: 0,
                    errors: vec![e.to_string()],
                }
            }
        }
    }

    async fn destination(&self) -> SyncResult<String> {
        Ok(self
            .store
            .setting(DESTINATION_WAREHOUSE_SETTING)
            .await?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DESTINATION_WAREHOUSE.to_string()))
    }

    async fn write(
        &self,
        invoice_id: &str,
        source_warehouse_id: &str,
        items: &mut ItemResolver,
    ) -> SyncResult<TransferOutcome> {
        let destination = self.destination().await?;
        let invoice_lines = self.store.invoice_items(invoice_id).await?;

        let mut lines = Vec::with_capacity(invoice_lines.len());
        for line in &invoice_lines {
            let item = items.resolve(&line.name, line.unit.as_deref()).await?;
            lines.push(NewTransferLine {
                line_no: line.line_no,
                catalog_item_id: item.resolved_id().to_string(),
                quantity: line.quantity,
                price_cents: line.price_cents,
            });
        }

        let header = self
            .store
            .create_transfer(invoice_id, source_warehouse_id, &destination)
            .await?;

        match self.store.insert_transfer_lines(&header.id, &lines).await {
            Ok(written) => {
                info!(
                    invoice_id = %invoice_id,
                    transfer_id = %header.id,
                    source = %source_warehouse_id,
                    dest = %destination,
                    lines = written.len(),
                    "Transfer materialized"
                );
                Ok(TransferOutcome {
                    transfer_id: Some(header.id),
                    lines: written.len(),
                    errors: Vec::new(),
                })
            }
            Err(e) => {
                warn!(
                    invoice_id = %invoice_id,
                    transfer_id = %header.id,
                    error = %e,
                    "Transfer lines failed, removing header"
                );

                let mut errors = vec![e.to_string()];
                if let Err(delete_err) = self.store.delete_transfer(&header.id).await {
                    error!(
                        transfer_id = %header.id,
                        error = %delete_err,
                        "Compensating delete failed; transfer header left without lines"
                    );
                    errors.push(format!("compensating delete failed: {}", delete_err));
                }

                Ok(TransferOutcome {
                    transfer_id: None,
                    lines: 0,
                    errors,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_db, stored_invoice};

    #[tokio::test]
    async fn test_lines_follow_parent_item() {
        let db = memory_db().await;
        stored_invoice(&db, "INV-1", &["Cement", "Sand"]).await;

        let canonical = db.catalog().insert("CEME-0001", "Portland cement", None).await.unwrap();
        let cement = db.catalog().insert("CEME-0002", "Cement", None).await.unwrap();
        db.catalog().set_parent(&cement.id, Some(&canonical.id)).await.unwrap();

        let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
        let mut items = ItemResolver::new(store.clone());
        let outcome = TransferMaterializer::new(store)
            .materialize("INV-1", "WH-SUPPLIER", &mut items)
            .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.lines, 2);

        let transfers = db.transfers().for_invoice("INV-1").await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].source_warehouse_id, "WH-SUPPLIER");
        assert_eq!(transfers[0].dest_warehouse_id, DEFAULT_DESTINATION_WAREHOUSE);

        let lines = db.transfers().lines(&transfers[0].id).await.unwrap();
        assert_eq!(lines[0].catalog_item_id, canonical.id);
        assert_ne!(lines[1].catalog_item_id, canonical.id);
    }

    #[tokio::test]
    async fn test_destination_from_settings() {
        let db = memory_db().await;
        stored_invoice(&db, "INV-1", &["Cement"]).await;
        db.settings()
            .set(DESTINATION_WAREHOUSE_SETTING, "WH-CENTRAL")
            .await
            .unwrap();

        let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
        let mut items = ItemResolver::new(store.clone());
        let outcome = TransferMaterializer::new(store)
            .materialize("INV-1", "WH-SUPPLIER", &mut items)
            .await;

        let transfer_id = outcome.transfer_id.unwrap();
        let transfers = db.transfers().for_invoice("INV-1").await.unwrap();
        assert_eq!(transfers[0].id, transfer_id);
        assert_eq!(transfers[0].dest_warehouse_id, "WH-CENTRAL");
    }

    #[tokio::test]
    async fn test_failed_lines_remove_header() {
        let db = memory_db().await;
        stored_invoice(&db, "INV-1", &["Cement", "Sand"]).await;

        sqlx::query(
            "CREATE TRIGGER reject_sand BEFORE INSERT ON transfer_lines \
             WHEN NEW.line_no = 2 BEGIN SELECT RAISE(ABORT, 'line rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
        let mut items = ItemResolver::new(store.clone());
        let outcome = TransferMaterializer::new(store)
            .materialize("INV-1", "WH-SUPPLIER", &mut items)
            .await;

        assert!(outcome.transfer_id.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("line rejected"));
        assert!(db.transfers().for_invoice("INV-1").await.unwrap().is_empty());
    }
}
