//! # Error Types
//!
//! Domain-specific error types for ledger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   CoreError                                                            │
//! │   ├── MalformedLine        invoice line failed validation              │
//! │   ├── UnknownDocumentType  type tag without a detail endpoint          │
//! │   └── Validation(..)  ◄──  ValidationError                             │
//! │                            ├── Required                                 │
//! │                            ├── TooLong                                  │
//! │                            └── InvalidFormat                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations found while reconciling external records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invoice line cannot be persisted.
    ///
    /// ## When This Occurs
    /// - Line has no item name
    /// - Line name exceeds the catalog limit
    #[error("Invoice {invoice_id} line {line_no} is malformed: {source}")]
    MalformedLine {
        invoice_id: String,
        line_no: usize,
        #[source]
        source: ValidationError,
    },

    /// The document type tag has no known detail endpoint.
    #[error("Unknown document type '{0}'")]
    UnknownDocumentType(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}
