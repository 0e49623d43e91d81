//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ledger_core::{InvoiceDirection, LocalInvoice, NewInvoiceItem};
use ledger_db::{Database, DbConfig};

use crate::client::TaxService;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    DocType, LineDetailReply, ListedInvoice, RawInvoice, RawLine, SearchCondition,
};

/// Tax service answering line-detail calls from a map.
#[derive(Default)]
pub struct FakeTaxService {
    replies: Mutex<HashMap<String, LineDetailReply>>,
    detail_calls: AtomicUsize,
}

impl FakeTaxService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, invoice_id: &str, reply: LineDetailReply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(invoice_id.to_string(), reply);
        self
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxService for FakeTaxService {
    async fn fetch_count(&self, _condition: &SearchCondition) -> SyncResult<u64> {
        Ok(0)
    }

    async fn fetch_page(
        &self,
        _condition: &SearchCondition,
        _offset: u64,
        _limit: u64,
    ) -> SyncResult<Vec<ListedInvoice>> {
        Ok(Vec::new())
    }

    async fn fetch_line_items(
        &self,
        invoice_id: &str,
        _doc_type: DocType,
    ) -> SyncResult<LineDetailReply> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| SyncError::ServiceStatus {
                path: format!("/invoices/goods/{}", invoice_id),
                status: 404,
                body: String::new(),
            })
    }
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn raw_invoice(id: &str, supplier_tin: &str, buyer_tin: &str) -> RawInvoice {
    RawInvoice {
        id: id.to_string(),
        doc_type: "goods".to_string(),
        number: Some(format!("No-{}", id)),
        doc_date: Some("2024-01-05".to_string()),
        supplier_tin: supplier_tin.to_string(),
        supplier_name: Some(format!("Supplier {}", supplier_tin)),
        buyer_tin: buyer_tin.to_string(),
        buyer_name: Some(format!("Buyer {}", buyer_tin)),
        status: Some("accepted".to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap(),
        updated_at: None,
        total_sum: Some(300.0),
        vat_sum: Some(36.0),
        extra: Default::default(),
    }
}

pub fn line(name: &str, quantity: f64, price: f64) -> RawLine {
    RawLine {
        name: Some(name.to_string()),
        unit: Some("bag".to_string()),
        quantity: Some(quantity),
        price: Some(price),
        total: Some(quantity * price),
        vat_sum: Some(0.0),
        class_code: None,
    }
}

/// Inserts a bare invoice with the given line names.
pub async fn stored_invoice(db: &Database, id: &str, names: &[&str]) {
    db.invoices()
        .upsert(&LocalInvoice {
            id: id.to_string(),
            tenant_id: "302563778".to_string(),
            doc_type: "goods".to_string(),
            direction: InvoiceDirection::Incoming,
            number: None,
            doc_date: None,
            supplier_tin: "111".to_string(),
            supplier_name: None,
            buyer_tin: "302563778".to_string(),
            buyer_name: None,
            partner_id: None,
            total_cents: 0,
            vat_cents: 0,
            status: None,
            external_created_at: Utc::now(),
            external_updated_at: None,
            raw_payload: "{}".to_string(),
            seen: false,
            synced_at: Utc::now(),
        })
        .await
        .unwrap();

    let items: Vec<NewInvoiceItem> = names
        .iter()
        .enumerate()
        .map(|(i, name)| NewInvoiceItem {
            line_no: i as i64 + 1,
            name: name.to_string(),
            catalog_item_id: None,
            class_code: None,
            unit: None,
            quantity: 2.0,
            price_cents: 1000,
            total_cents: 2000,
            vat_cents: 0,
        })
        .collect();

    db.invoices().replace_items(id, &items).await.unwrap();
}
