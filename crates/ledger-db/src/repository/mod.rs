//! # Repository Module
//!
//! Database repository implementations for the ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reconciler / Orchestrator                                             │
//! │       │                                                                 │
//! │       │  db.partners().get_by_tin("302563778")                         │
//! │       ▼                                                                 │
//! │  PartnerRepository                                                     │
//! │  ├── get_by_tin(&self, tin)                                            │
//! │  ├── create(&self, draft)                                              │
//! │  └── set_warehouse(&self, id, warehouse)                               │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PartnerRepository`](partner::PartnerRepository) - Counterparties by TIN
//! - [`CatalogRepository`](catalog::CatalogRepository) - Item master and codes
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoice mirror and lines
//! - [`TransferRepository`](transfer::TransferRepository) - Stock transfers
//! - [`SyncStateRepository`](sync_state::SyncStateRepository) - Watermarks
//! - [`SettingsRepository`](settings::SettingsRepository) - Key/value settings

pub mod catalog;
pub mod invoice;
pub mod partner;
pub mod settings;
pub mod sync_state;
pub mod transfer;
