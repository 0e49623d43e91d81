//! # ledger-core: Pure Domain Logic for the Ledger Tax Sync
//!
//! This crate holds the entities mirrored from the e-invoicing service and
//! the small pieces of arithmetic the sync engine depends on. Nothing in
//! here touches the network, the disk or a clock it was not handed.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ledger-syncd (daemon)                                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ledger-sync  ── client, reconciliation, scheduler                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ledger-db    ── SQLite repositories                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ledger-core (THIS CRATE) ── types, money, codes, windows             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities (Partner, CatalogItem, LocalInvoice, Transfer, ...)
//! - [`money`] - Integer minor-unit money
//! - [`codes`] - Item name normalization and code synthesis
//! - [`window`] - Sync window and schedule delay arithmetic
//! - [`validation`] - Input checks applied before anything is written
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ledger_core::codes::{code_prefix, item_code};
//! use ledger_core::money::Money;
//!
//! assert_eq!(code_prefix("  cement m-400 "), "CEME");
//! assert_eq!(item_code("CEME", 7), "CEME-0007");
//!
//! let total = Money::from_decimal(1250.5);
//! assert_eq!(total.cents(), 125050);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codes;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;
pub mod window;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;
pub use window::SyncWindow;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Destination warehouse used for materialized transfers when the
/// `transfer.default_destination_warehouse` setting is absent.
pub const DEFAULT_DESTINATION_WAREHOUSE: &str = "WH-MAIN";

/// Settings key holding the destination warehouse for transfers.
pub const DESTINATION_WAREHOUSE_SETTING: &str = "transfer.default_destination_warehouse";
