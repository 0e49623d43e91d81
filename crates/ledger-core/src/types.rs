//! # Domain Types
//!
//! Entities persisted by the ledger and touched by the sync engine.
//!
//! ## Entity Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Partner (tin) ──── warehouse_id? ─────────────┐                      │
//! │      ▲                                           │ source               │
//! │      │ partner_id?                               ▼                      │
//! │   LocalInvoice (external id) ──────────────► Transfer ──► dest         │
//! │      │                                           │                      │
//! │      ▼ 1..n                                      ▼ 1..n                 │
//! │   LocalInvoiceItem ── catalog_item_id? ──►  TransferLine               │
//! │                             │                    │                      │
//! │                             ▼                    ▼ (parent if any)      │
//! │                        CatalogItem ── parent_id? ──► CatalogItem        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Warehouses are referenced by opaque identifiers; the ledger owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Sync Principal
// =============================================================================

/// Credentials the engine uses against the tax service.
///
/// The tenant identifier is the tenant's own TIN. It is also what decides
/// whether an invoice is incoming (tenant is the buyer) or outgoing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPrincipal {
    pub tenant_id: String,
    pub username: String,
    pub secret: String,
}

impl SyncPrincipal {
    pub fn new(
        tenant_id: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        SyncPrincipal {
            tenant_id: tenant_id.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for SyncPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Sync State
// =============================================================================

/// Persisted progress marker for one tenant.
///
/// `watermark` is the end of the last successfully synced window.
/// `last_run_at` is `None` when the watermark was seeded but no pass has
/// completed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncState {
    pub tenant_id: String,
    pub watermark: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Partner
// =============================================================================

/// A counterparty known to the ledger, keyed by TIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Partner {
    pub id: String,
    pub tin: String,
    pub name: String,
    pub address: Option<String>,
    pub bank_account: Option<String>,
    pub bank_code: Option<String>,
    pub director: Option<String>,

    /// Warehouse stock is shipped from when goods are bought from this partner.
    pub warehouse_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a partner on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPartner {
    pub tin: String,
    pub name: String,
    pub address: Option<String>,
    pub bank_account: Option<String>,
    pub bank_code: Option<String>,
    pub director: Option<String>,
}

// =============================================================================
// Catalog Item
// =============================================================================

/// Item-master record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CatalogItem {
    pub id: String,

    /// Generated unique code, e.g. `CEME-0001`.
    pub code: String,

    pub name: String,

    /// Canonical item this one was merged into.
    pub parent_id: Option<String>,

    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Identifier stock movements should reference: the parent when merged.
    #[inline]
    pub fn resolved_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(&self.id)
    }
}

// =============================================================================
// Invoice Direction
// =============================================================================

/// Whether the tenant bought or sold on this invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum InvoiceDirection {
    /// Tenant is the buyer.
    Incoming,
    /// Tenant is the supplier.
    Outgoing,
}

impl InvoiceDirection {
    /// Derives the direction from the buyer TIN as seen by `tenant_id`.
    ///
    /// Surrounding whitespace on either side is ignored.
    pub fn for_tenant(tenant_id: &str, buyer_tin: &str) -> Self {
        if buyer_tin.trim() == tenant_id.trim() {
            InvoiceDirection::Incoming
        } else {
            InvoiceDirection::Outgoing
        }
    }
}

impl fmt::Display for InvoiceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceDirection::Incoming => write!(f, "incoming"),
            InvoiceDirection::Outgoing => write!(f, "outgoing"),
        }
    }
}

// =============================================================================
// Local Invoice
// =============================================================================

/// Persisted mirror of an external invoice, keyed by the external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LocalInvoice {
    pub id: String,
    pub tenant_id: String,
    pub doc_type: String,
    pub direction: InvoiceDirection,
    pub number: Option<String>,
    pub doc_date: Option<String>,
    pub supplier_tin: String,
    pub supplier_name: Option<String>,
    pub buyer_tin: String,
    pub buyer_name: Option<String>,
    pub partner_id: Option<String>,
    pub total_cents: i64,
    pub vat_cents: i64,
    pub status: Option<String>,
    pub external_created_at: DateTime<Utc>,
    pub external_updated_at: Option<DateTime<Utc>>,

    /// The list row exactly as received, JSON encoded.
    pub raw_payload: String,

    /// Set by the ledger once an operator has looked at the invoice.
    /// Sync never writes it.
    pub seen: bool,

    pub synced_at: DateTime<Utc>,
}

impl LocalInvoice {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn vat(&self) -> Money {
        Money::from_cents(self.vat_cents)
    }
}

/// One persisted invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LocalInvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub line_no: i64,
    pub name: String,
    pub catalog_item_id: Option<String>,
    pub class_code: Option<String>,
    pub unit: Option<String>,
    pub quantity: f64,
    pub price_cents: i64,
    pub total_cents: i64,
    pub vat_cents: i64,
}

/// Line to write under an invoice; ids are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub line_no: i64,
    pub name: String,
    pub catalog_item_id: Option<String>,
    pub class_code: Option<String>,
    pub unit: Option<String>,
    pub quantity: f64,
    pub price_cents: i64,
    pub total_cents: i64,
    pub vat_cents: i64,
}

// =============================================================================
// Transfer
// =============================================================================

/// Stock movement materialized from an incoming invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transfer {
    pub id: String,
    pub invoice_id: String,
    pub source_warehouse_id: String,
    pub dest_warehouse_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferLine {
    pub id: String,
    pub transfer_id: String,
    pub line_no: i64,
    pub catalog_item_id: String,
    pub quantity: f64,
    pub price_cents: i64,
}

/// Line to insert into a transfer; ids are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransferLine {
    pub line_no: i64,
    pub catalog_item_id: String,
    pub quantity: f64,
    pub price_cents: i64,
}

// =============================================================================
// Tests
// =============================================================================
