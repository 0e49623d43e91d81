//! # Invoice Reconciliation
//!
//! Brings one external invoice into the ledger.
//!
//! ## Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     reconcile(raw, tenant_id)                           │
//! │                                                                         │
//! │  doc type known? ──no──► UnknownDocumentType (nothing fetched)         │
//! │       │                                                                 │
//! │  look up local invoice by external id                                  │
//! │  fetch line detail                                                     │
//! │  validate every line ──bad──► MalformedLine (nothing written)          │
//! │       │                                                                 │
//! │  new invoice and supplier ≠ tenant                                     │
//! │       └─► ensure Partner(supplier TIN) ──fail──► invoice skipped       │
//! │       │                                                                 │
//! │  upsert invoice row (seen untouched)                                   │
//! │  resolve catalog items, replace invoice lines                          │
//! │       │                                                                 │
//! │  new + incoming + partner warehouse + ≥1 line                          │
//! │       └─► materialize transfer (errors reported, not raised)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The writes are sequential and not wrapped in one transaction. A failure
//! after the invoice upsert leaves the row in place; the next pass that sees
//! the invoice refreshes it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ledger_core::validation::{validate_item_name, validate_tin};
use ledger_core::{
    CoreError, InvoiceDirection, LocalInvoice, Money, NewInvoiceItem, NewPartner, Partner,
};

use crate::catalog::ItemResolver;
use crate::client::TaxService;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{DocType, InvoiceDetail, RawInvoice, RawLine};
use crate::store::LedgerStore;
use crate::transfer::{TransferMaterializer, TransferOutcome};

// =============================================================================
// Outcome
// =============================================================================

/// What reconciling one invoice did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub invoice_id: String,
    /// True when the invoice was not in the ledger before.
    pub created: bool,
    pub direction: InvoiceDirection,
    pub partner_id: Option<String>,
    pub lines: usize,
    /// Present when a transfer was attempted.
    pub transfer: Option<TransferOutcome>,
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct Reconciler {
    service: Arc<dyn TaxService>,
    store: Arc<dyn LedgerStore>,
    transfers: TransferMaterializer,
}

impl Reconciler {
    pub fn new(service: Arc<dyn TaxService>, store: Arc<dyn LedgerStore>) -> Self {
        Reconciler {
            transfers: TransferMaterializer::new(store.clone()),
            service,
            store,
        }
    }

    /// Reconciles a single invoice with a fresh item cache.
    pub async fn reconcile(&self, raw: &RawInvoice, tenant_id: &str) -> SyncResult<ReconcileOutcome> {
        let mut items = ItemResolver::new(self.store.clone());
        self.reconcile_with(raw, tenant_id, &mut items).await
    }

    /// Reconciles a single invoice, sharing `items` with the rest of the pass.
    pub async fn reconcile_with(
        &self,
        raw: &RawInvoice,
        tenant_id: &str,
        items: &mut ItemResolver,
    ) -> SyncResult<ReconcileOutcome> {
        let doc_type: DocType = raw.doc_type.parse()?;

        let existing = self.store.invoice_by_id(&raw.id).await?;
        let created = existing.is_none();

        let (lines, detail) = self
            .service
            .fetch_line_items(&raw.id, doc_type)
            .await?
            .into_parts();
        validate_lines(&raw.id, &lines)?;

        let direction = InvoiceDirection::for_tenant(tenant_id, &raw.buyer_tin);
        let partner = self
            .supplier_partner(raw, tenant_id, detail.as_ref(), created)
            .await?;

        let invoice = LocalInvoice {
            id: raw.id.clone(),
            tenant_id: tenant_id.to_string(),
            doc_type: doc_type.to_string(),
            direction,
            number: raw.number.clone(),
            doc_date: raw.doc_date.clone(),
            supplier_tin: raw.supplier_tin.clone(),
            supplier_name: raw.supplier_name.clone(),
            buyer_tin: raw.buyer_tin.clone(),
            buyer_name: raw.buyer_name.clone(),
            partner_id: partner.as_ref().map(|p| p.id.clone()),
            total_cents: cents(raw.total_sum),
            vat_cents: cents(raw.vat_sum),
            status: raw.status.clone(),
            external_created_at: raw.created_at,
            external_updated_at: raw.updated_at,
            raw_payload: raw.to_payload()?,
            seen: existing.as_ref().map(|e| e.seen).unwrap_or(false),
            synced_at: Utc::now(),
        };
        self.store.upsert_invoice(&invoice).await?;

        let mut new_items = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let name = line.name.as_deref().unwrap_or_default().trim();
            let item = items.resolve(name, line.unit.as_deref()).await?;
            new_items.push(invoice_item(idx, name, line, item.id));
        }
        let written = self.store.replace_invoice_items(&raw.id, &new_items).await?;

        let source_warehouse = partner.as_ref().and_then(|p| p.warehouse_id.as_deref());
        let transfer = match source_warehouse {
            Some(warehouse)
                if created && direction == InvoiceDirection::Incoming && !written.is_empty() =>
            {
                Some(self.transfers.materialize(&raw.id, warehouse, items).await)
            }
            _ => None,
        };

        info!(
            invoice_id = %raw.id,
            created,
            %direction,
            lines = written.len(),
            transfer = transfer.as_ref().and_then(|t| t.transfer_id.as_deref()).unwrap_or("-"),
            "Invoice reconciled"
        );

        Ok(ReconcileOutcome {
            invoice_id: raw.id.clone(),
            created,
            direction,
            partner_id: invoice.partner_id,
            lines: written.len(),
            transfer,
        })
    }

    /// Finds the supplier's partner, creating it for first-seen invoices.
    async fn supplier_partner(
        &self,
        raw: &RawInvoice,
        tenant_id: &str,
        detail: Option<&InvoiceDetail>,
        created: bool,
    ) -> SyncResult<Option<Partner>> {
        let tin = raw.supplier_tin.trim();
        if tin == tenant_id {
            return Ok(None);
        }

        if let Some(partner) = self.store.partner_by_tin(tin).await? {
            return Ok(Some(partner));
        }

        if !created {
            debug!(invoice_id = %raw.id, tin = %tin, "Known invoice without partner; not creating one");
            return Ok(None);
        }

        let draft = partner_draft(raw, detail);
        validate_tin(&draft.tin).map_err(|e| SyncError::PartnerCreationFailed {
            tin: draft.tin.clone(),
            reason: e.to_string(),
        })?;

        match self.store.create_partner(&draft).await {
            Ok(partner) => {
                info!(tin = %partner.tin, name = %partner.name, "Created partner");
                Ok(Some(partner))
            }
            Err(e) => {
                warn!(invoice_id = %raw.id, tin = %draft.tin, error = %e, "Partner creation failed");
                Err(SyncError::PartnerCreationFailed {
                    tin: draft.tin,
                    reason: e.to_string(),
                })
            }
        }
    }
}

// =============================================================================
// Mapping Helpers
// =============================================================================

fn validate_lines(invoice_id: &str, lines: &[RawLine]) -> Result<(), CoreError> {
    for (idx, line) in lines.iter().enumerate() {
        validate_item_name(line.name.as_deref().unwrap_or_default()).map_err(|source| {
            CoreError::MalformedLine {
                invoice_id: invoice_id.to_string(),
                line_no: idx + 1,
                source,
            }
        })?;
    }
    Ok(())
}

fn cents(amount: Option<f64>) -> i64 {
    Money::from_decimal(amount.unwrap_or(0.0)).cents()
}

fn invoice_item(idx: usize, name: &str, line: &RawLine, catalog_item_id: String) -> NewInvoiceItem {
    let quantity = line.quantity.unwrap_or(0.0);
    let price = line.price.unwrap_or(0.0);

    NewInvoiceItem {
        line_no: idx as i64 + 1,
        name: name.to_string(),
        catalog_item_id: Some(catalog_item_id),
        class_code: line.class_code.clone(),
        unit: line.unit.clone(),
        quantity,
        price_cents: cents(Some(price)),
        total_cents: cents(Some(line.total.unwrap_or(quantity * price))),
        vat_cents: cents(line.vat_sum),
    }
}

/// Partner fields: detail payload first, list row as fallback.
fn partner_draft(raw: &RawInvoice, detail: Option<&InvoiceDetail>) -> NewPartner {
    let party = detail.and_then(|d| d.supplier.clone()).unwrap_or_default();
    let tin = raw.supplier_tin.trim().to_string();

    NewPartner {
        name: party
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| raw.supplier_name.clone().filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| tin.clone()),
        tin,
        address: party.address,
        bank_account: party.bank_account,
        bank_code: party.bank_code,
        director: party.director,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LineDetailReply, PartyDetail};
    use crate::testing::{line, memory_db, raw_invoice, FakeTaxService};
    use ledger_db::Database;

    const TENANT: &str = "302563778";

    fn reconciler(db: &Database, service: FakeTaxService) -> (Reconciler, Arc<FakeTaxService>) {
        let service = Arc::new(service);
        (
            Reconciler::new(service.clone(), Arc::new(db.clone())),
            service,
        )
    }

    fn cement_lines() -> LineDetailReply {
        LineDetailReply::Degraded(vec![line("Cement", 2.0, 100.0), line("cement ", 1.0, 100.0)])
    }

    #[tokio::test]
    async fn test_new_incoming_invoice() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply(
            "INV-1",
            LineDetailReply::Success {
                items: vec![line("Cement", 2.0, 100.0), line("cement ", 1.0, 100.0)],
                detail: InvoiceDetail {
                    supplier: Some(PartyDetail {
                        name: Some("Stone Works LLC".into()),
                        bank_account: Some("20208000100".into()),
                        ..Default::default()
                    }),
                    buyer: None,
                },
            },
        );
        let (reconciler, _) = reconciler(&db, service);

        let outcome = reconciler
            .reconcile(&raw_invoice("INV-1", "111", TENANT), TENANT)
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.direction, InvoiceDirection::Incoming);
        assert_eq!(outcome.lines, 2);
        assert!(outcome.transfer.is_none());

        let partner = db.partners().get_by_tin("111").await.unwrap().unwrap();
        assert_eq!(partner.name, "Stone Works LLC");
        assert_eq!(partner.bank_account.as_deref(), Some("20208000100"));
        assert_eq!(outcome.partner_id.as_deref(), Some(partner.id.as_str()));

        assert_eq!(db.catalog().count().await.unwrap(), 1);
        let items = db.invoices().items("INV-1").await.unwrap();
        assert_eq!(items[0].catalog_item_id, items[1].catalog_item_id);
        assert_eq!(items[0].price_cents, 10_000);
        assert_eq!(items[0].total_cents, 20_000);

        let invoice = db.invoices().get_by_id("INV-1").await.unwrap().unwrap();
        assert_eq!(invoice.total_cents, 30_000);
        assert!(!invoice.seen);
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply("INV-1", cement_lines());
        let (reconciler, _) = reconciler(&db, service);
        let raw = raw_invoice("INV-1", "111", TENANT);

        let first = reconciler.reconcile(&raw, TENANT).await.unwrap();
        let before = db.invoices().items("INV-1").await.unwrap();
        db.invoices().mark_seen("INV-1", true).await.unwrap();

        let second = reconciler.reconcile(&raw, TENANT).await.unwrap();
        let after = db.invoices().items("INV-1").await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(db.invoices().count().await.unwrap(), 1);
        assert_eq!(db.partners().count().await.unwrap(), 1);
        assert_eq!(db.catalog().count().await.unwrap(), 1);

        let summarize = |items: &[ledger_core::LocalInvoiceItem]| {
            items
                .iter()
                .map(|i| (i.line_no, i.name.clone(), i.catalog_item_id.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summarize(&before), summarize(&after));

        let invoice = db.invoices().get_by_id("INV-1").await.unwrap().unwrap();
        assert!(invoice.seen);
    }

    #[tokio::test]
    async fn test_outgoing_invoice_creates_no_partner() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply("INV-2", cement_lines());
        let (reconciler, _) = reconciler(&db, service);

        let outcome = reconciler
            .reconcile(&raw_invoice("INV-2", TENANT, "222"), TENANT)
            .await
            .unwrap();

        assert_eq!(outcome.direction, InvoiceDirection::Outgoing);
        assert!(outcome.partner_id.is_none());
        assert_eq!(db.partners().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_writes_nothing() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply(
            "INV-3",
            LineDetailReply::Degraded(vec![line("Cement", 1.0, 1.0), line("  ", 1.0, 1.0)]),
        );
        let (reconciler, _) = reconciler(&db, service);

        let err = reconciler
            .reconcile(&raw_invoice("INV-3", "111", TENANT), TENANT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Domain(CoreError::MalformedLine { line_no: 2, .. })
        ));
        assert_eq!(db.invoices().count().await.unwrap(), 0);
        assert_eq!(db.partners().count().await.unwrap(), 0);
        assert_eq!(db.catalog().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_doc_type_fetches_nothing() {
        let db = memory_db().await;
        let (reconciler, service) = reconciler(&db, FakeTaxService::new());

        let mut raw = raw_invoice("INV-4", "111", TENANT);
        raw.doc_type = "barter".into();

        let err = reconciler.reconcile(&raw, TENANT).await.unwrap_err();
        assert!(matches!(err, SyncError::Domain(CoreError::UnknownDocumentType(_))));
        assert_eq!(service.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_partner_failure_skips_invoice() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply("INV-5", cement_lines());
        let (reconciler, _) = reconciler(&db, service);

        let err = reconciler
            .reconcile(&raw_invoice("INV-5", &"9".repeat(25), TENANT), TENANT)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::PartnerCreationFailed { .. }));
        assert_eq!(db.invoices().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transfer_only_for_first_sight() {
        let db = memory_db().await;
        let partner = db
            .partners()
            .create(&NewPartner {
                tin: "111".into(),
                name: "Stone Works".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.partners()
            .set_warehouse(&partner.id, Some("WH-111"))
            .await
            .unwrap();

        let service = FakeTaxService::new().with_reply("INV-6", cement_lines());
        let (reconciler, _) = reconciler(&db, service);
        let raw = raw_invoice("INV-6", "111", TENANT);

        let first = reconciler.reconcile(&raw, TENANT).await.unwrap();
        let transfer = first.transfer.unwrap();
        assert!(transfer.is_complete());
        assert_eq!(transfer.lines, 2);

        let second = reconciler.reconcile(&raw, TENANT).await.unwrap();
        assert!(second.transfer.is_none());
        assert_eq!(db.transfers().for_invoice("INV-6").await.unwrap().len(), 1);
    }

    #[test]
    fn test_partner_draft_fallbacks() {
        let mut raw = raw_invoice("INV-7", "111", TENANT);
        let draft = partner_draft(&raw, None);
        assert_eq!(draft.name, "Supplier 111");

        raw.supplier_name = None;
        let draft = partner_draft(&raw, Some(&InvoiceDetail::default()));
        assert_eq!(draft.name, "111");
    }

    #[test]
    fn test_blank_detail_name_falls_back_to_list_name() {
        let raw = raw_invoice("INV-8", "111", TENANT);
        let detail = InvoiceDetail {
            supplier: Some(PartyDetail {
                name: Some("  ".into()),
                ..Default::default()
            }),
            buyer: None,
        };

        let draft = partner_draft(&raw, Some(&detail));
        assert_eq!(draft.name, "Supplier 111");
    }

    #[tokio::test]
    async fn test_foreign_supplier_tin_is_accepted() {
        let db = memory_db().await;
        let service = FakeTaxService::new().with_reply("INV-9", cement_lines());
        let (reconciler, _) = reconciler(&db, service);

        let outcome = reconciler
            .reconcile(&raw_invoice("INV-9", "DE123456789", TENANT), TENANT)
            .await
            .unwrap();

        assert!(outcome.created);
        let partner = db.partners().get_by_tin("DE123456789").await.unwrap().unwrap();
        assert_eq!(outcome.partner_id.as_deref(), Some(partner.id.as_str()));
        assert!(db.invoices().get_by_id("INV-9").await.unwrap().is_some());
    }
}
