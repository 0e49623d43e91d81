//! # Ledger Store
//!
//! The persistence operations the engine needs, behind one trait.
//! [`Database`] implements it on top of the ledger-db repositories.

use async_trait::async_trait;

use ledger_core::{
    CatalogItem, LocalInvoice, LocalInvoiceItem, NewInvoiceItem, NewPartner, NewTransferLine,
    Partner, SyncState, Transfer, TransferLine,
};
use ledger_db::Database;

use crate::error::SyncResult;

/// Keyed reads and writes on the ledger's entities.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // =========================================================================
    // Sync State
    // =========================================================================

    async fn load_sync_state(&self, tenant_id: &str) -> SyncResult<Option<SyncState>>;

    async fn save_sync_state(&self, state: &SyncState) -> SyncResult<()>;

    // =========================================================================
    // Partners
    // =========================================================================

    async fn partner_by_tin(&self, tin: &str) -> SyncResult<Option<Partner>>;

    async fn create_partner(&self, draft: &NewPartner) -> SyncResult<Partner>;

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Exact match on the normalized (trimmed, lower-cased) name.
    async fn catalog_item_by_name(&self, name: &str) -> SyncResult<Option<CatalogItem>>;

    async fn catalog_code_exists(&self, code: &str) -> SyncResult<bool>;

    async fn create_catalog_item(
        &self,
        code: &str,
        name: &str,
        unit: Option<&str>,
    ) -> SyncResult<CatalogItem>;

    // =========================================================================
    // Invoices
    // =========================================================================

    async fn invoice_by_id(&self, id: &str) -> SyncResult<Option<LocalInvoice>>;

    /// Inserts or fully updates the row; `seen` is never overwritten.
    async fn upsert_invoice(&self, invoice: &LocalInvoice) -> SyncResult<()>;

    /// Deletes all lines of the invoice and inserts `items`.
    async fn replace_invoice_items(
        &self,
        invoice_id: &str,
        items: &[NewInvoiceItem],
    ) -> SyncResult<Vec<LocalInvoiceItem>>;

    async fn invoice_items(&self, invoice_id: &str) -> SyncResult<Vec<LocalInvoiceItem>>;

    // =========================================================================
    // Transfers
    // =========================================================================

    async fn create_transfer(
        &self,
        invoice_id: &str,
        source_warehouse_id: &str,
        dest_warehouse_id: &str,
    ) -> SyncResult<Transfer>;

    /// Inserts every line or none.
    async fn insert_transfer_lines(
        &self,
        transfer_id: &str,
        lines: &[NewTransferLine],
    ) -> SyncResult<Vec<TransferLine>>;

    async fn delete_transfer(&self, transfer_id: &str) -> SyncResult<bool>;

    // =========================================================================
    // Settings
    // =========================================================================

    async fn setting(&self, key: &str) -> SyncResult<Option<String>>;
}

#[async_trait]
impl LedgerStore for Database {
    async fn load_sync_state(&self, tenant_id: &str) -> SyncResult<Option<SyncState>> {
        Ok(self.sync_state().get(tenant_id).await?)
    }

    async fn save_sync_state(&self, state: &SyncState) -> SyncResult<()> {
        Ok(self.sync_state().save(state).await?)
    }

    async fn partner_by_tin(&self, tin: &str) -> SyncResult<Option<Partner>> {
        Ok(self.partners().get_by_tin(tin).await?)
    }

    async fn create_partner(&self, draft: &NewPartner) -> SyncResult<Partner> {
        Ok(self.partners().create(draft).await?)
    }

    async fn catalog_item_by_name(&self, name: &str) -> SyncResult<Option<CatalogItem>> {
        Ok(self.catalog().find_by_name(name).await?)
    }

    async fn catalog_code_exists(&self, code: &str) -> SyncResult<bool> {
        Ok(self.catalog().code_exists(code).await?)
    }

    async fn create_catalog_item(
        &self,
        code: &str,
        name: &str,
        unit: Option<&str>,
    ) -> SyncResult<CatalogItem> {
        Ok(self.catalog().insert(code, name, unit).await?)
    }

    async fn invoice_by_id(&self, id: &str) -> SyncResult<Option<LocalInvoice>> {
        Ok(self.invoices().get_by_id(id).await?)
    }

    async fn upsert_invoice(&self, invoice: &LocalInvoice) -> SyncResult<()> {
        Ok(self.invoices().upsert(invoice).await?)
    }

    async fn replace_invoice_items(
        &self,
        invoice_id: &str,
        items: &[NewInvoiceItem],
    ) -> SyncResult<Vec<LocalInvoiceItem>> {
        Ok(self.invoices().replace_items(invoice_id, items).await?)
    }

    async fn invoice_items(&self, invoice_id: &str) -> SyncResult<Vec<LocalInvoiceItem>> {
        Ok(self.invoices().items(invoice_id).await?)
    }

    async fn create_transfer(
        &self,
        invoice_id: &str,
        source_warehouse_id: &str,
        dest_warehouse_id: &str,
    ) -> SyncResult<Transfer> {
        Ok(self
            .transfers()
            .create_header(invoice_id, source_warehouse_id, dest_warehouse_id)
            .await?)
    }

    async fn insert_transfer_lines(
        &self,
        transfer_id: &str,
        lines: &[NewTransferLine],
    ) -> SyncResult<Vec<TransferLine>> {
        Ok(self.transfers().insert_lines(transfer_id, lines).await?)
    }

    async fn delete_transfer(&self, transfer_id: &str) -> SyncResult<bool> {
        Ok(self.transfers().delete(transfer_id).await?)
    }

    async fn setting(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.settings().get(key).await?)
    }
}
