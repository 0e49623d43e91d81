//! # Tax Service Protocol
//!
//! Wire types for the tax service's JSON API.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  POST /auth/login        {tin, username, password}  → {token}          │
//! │  POST /invoices/count    {condition}                → {count}          │
//! │  POST /invoices/list     {condition, offset, limit, sort}              │
//! │                                                     → {items: [...]}   │
//! │  GET  /invoices/{kind}/{id}                         → line detail      │
//! │                                                                         │
//! │  condition = {role: buyer|supplier, tin, createdFrom, createdTo}       │
//! │  Every call after login carries  Authorization: Bearer <token>         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Line Detail Replies
//! The detail endpoint answers in one of three shapes:
//!
//! | Wire shape                        | Decoded as                        |
//! |-----------------------------------|-----------------------------------|
//! | `[ {line}, ... ]`                 | `LineDetailReply::Degraded`       |
//! | `{ok: true, items, detail}`       | `LineDetailReply::Success`        |
//! | `{ok: false, error}`              | `SyncError::ServiceRejected`      |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use ledger_core::{CoreError, SyncWindow};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Authentication
// =============================================================================

#[derive(Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub tin: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: String,
}

// =============================================================================
// Search Condition
// =============================================================================

/// Which side of the invoice the tenant is searched as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchRole {
    Buyer,
    Supplier,
}

impl fmt::Display for SearchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchRole::Buyer => write!(f, "buyer"),
            SearchRole::Supplier => write!(f, "supplier"),
        }
    }
}

/// Filter shared by the count and list calls.
///
/// Both bounds are inclusive on the service side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCondition {
    pub role: SearchRole,
    pub tin: String,
    pub created_from: DateTime<Utc>,
    pub created_to: DateTime<Utc>,
}

impl SearchCondition {
    pub fn new(role: SearchRole, tin: impl Into<String>, window: &SyncWindow) -> Self {
        SearchCondition {
            role,
            tin: tin.into(),
            created_from: window.start,
            created_to: window.end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountRequest<'a> {
    pub condition: &'a SearchCondition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: &'static str,
}

impl SortSpec {
    /// Oldest first, so pages are stable while new invoices arrive.
    pub const CREATED_ASC: SortSpec = SortSpec {
        column: "createdAt",
        direction: "asc",
    };
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRequest<'a> {
    pub condition: &'a SearchCondition,
    pub offset: u64,
    pub limit: u64,
    pub sort: SortSpec,
}

/// Rows stay undecoded here so one bad row cannot fail the page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

// =============================================================================
// Document Types
// =============================================================================

/// Invoice document type; selects the line-detail endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    Goods,
    Services,
    Excise,
    Leasing,
    VatReturn,
    ActCompletion,
    ActReconciliation,
    ActWriteOff,
}

impl DocType {
    /// Path segment under `/invoices/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            DocType::Goods => "goods",
            DocType::Services => "services",
            DocType::Excise => "excise",
            DocType::Leasing => "leasing",
            DocType::VatReturn => "vat-return",
            DocType::ActCompletion => "act-completion",
            DocType::ActReconciliation => "act-reconciliation",
            DocType::ActWriteOff => "act-writeoff",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for DocType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "goods" => Ok(DocType::Goods),
            "services" => Ok(DocType::Services),
            "excise" => Ok(DocType::Excise),
            "leasing" => Ok(DocType::Leasing),
            "vat-return" => Ok(DocType::VatReturn),
            "act-completion" => Ok(DocType::ActCompletion),
            "act-reconciliation" => Ok(DocType::ActReconciliation),
            "act-writeoff" | "act-write-off" => Ok(DocType::ActWriteOff),
            _ => Err(CoreError::UnknownDocumentType(s.to_string())),
        }
    }
}

// =============================================================================
// Raw Invoice
// =============================================================================

/// One row of the invoice list, as the service sends it.
///
/// Fields the engine does not interpret are kept in `extra` so the row can
/// be persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInvoice {
    pub id: String,
    pub doc_type: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub doc_date: Option<String>,
    pub supplier_tin: String,
    #[serde(default)]
    pub supplier_name: Option<String>,
    pub buyer_tin: String,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_sum: Option<f64>,
    #[serde(default)]
    pub vat_sum: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RawInvoice {
    /// The row re-encoded, unknown fields included.
    pub fn to_payload(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(|e| SyncError::SerializationFailed(e.to_string()))
    }
}

/// One list row after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ListedInvoice {
    Valid(RawInvoice),
    /// The row did not match the invoice shape; `id` is kept when readable.
    Malformed { id: Option<String>, reason: String },
}

impl ListedInvoice {
    pub fn from_row(row: serde_json::Value) -> Self {
        let id = row.get("id").and_then(|v| v.as_str()).map(str::to_string);
        match serde_json::from_value::<RawInvoice>(row) {
            Ok(raw) => ListedInvoice::Valid(raw),
            Err(e) => ListedInvoice::Malformed {
                id,
                reason: e.to_string(),
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ListedInvoice::Valid(raw) => Some(&raw.id),
            ListedInvoice::Malformed { id, .. } => id.as_deref(),
        }
    }
}

impl From<RawInvoice> for ListedInvoice {
    fn from(raw: RawInvoice) -> Self {
        ListedInvoice::Valid(raw)
    }
}

// =============================================================================
// Line Detail
// =============================================================================

/// One invoice line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLine {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub vat_sum: Option<f64>,
    #[serde(default)]
    pub class_code: Option<String>,
}

/// Party block of a detail payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDetail {
    #[serde(default)]
    pub tin: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub bank_account: Option<String>,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
}

/// Document header returned next to the lines on a full reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDetail {
    #[serde(default)]
    pub supplier: Option<PartyDetail>,
    #[serde(default)]
    pub buyer: Option<PartyDetail>,
}

/// Decoded line-detail reply.
#[derive(Debug, Clone, PartialEq)]
pub enum LineDetailReply {
    /// Bare array of lines; no document header.
    Degraded(Vec<RawLine>),
    /// Envelope with `ok: true`.
    Success {
        items: Vec<RawLine>,
        detail: InvoiceDetail,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LineDetailWire {
    Bare(Vec<RawLine>),
    Envelope {
        ok: bool,
        #[serde(default)]
        items: Vec<RawLine>,
        #[serde(default)]
        detail: Option<InvoiceDetail>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl LineDetailReply {
    /// Decodes any of the three wire shapes.
    pub fn from_json(value: serde_json::Value) -> SyncResult<Self> {
        let wire: LineDetailWire = serde_json::from_value(value)
            .map_err(|e| SyncError::DeserializationFailed(format!("line detail: {}", e)))?;

        match wire {
            LineDetailWire::Bare(items) => Ok(LineDetailReply::Degraded(items)),
            LineDetailWire::Envelope {
                ok: true,
                items,
                detail,
                ..
            } => Ok(LineDetailReply::Success {
                items,
                detail: detail.unwrap_or_default(),
            }),
            LineDetailWire::Envelope {
                ok: false, error, ..
            } => Err(SyncError::ServiceRejected(
                error.unwrap_or_else(|| "line detail request failed".into()),
            )),
        }
    }

    pub fn items(&self) -> &[RawLine] {
        match self {
            LineDetailReply::Degraded(items) => items,
            LineDetailReply::Success { items, .. } => items,
        }
    }

    pub fn detail(&self) -> Option<&InvoiceDetail> {
        match self {
            LineDetailReply::Degraded(_) => None,
            LineDetailReply::Success { detail, .. } => Some(detail),
        }
    }

    pub fn into_parts(self) -> (Vec<RawLine>, Option<InvoiceDetail>) {
        match self {
            LineDetailReply::Degraded(items) => (items, None),
            LineDetailReply::Success { items, detail } => (items, Some(detail)),
        }
    }
}
