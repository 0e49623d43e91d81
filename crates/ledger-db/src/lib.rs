//! # ledger-db: Database Layer for the Ledger Tax Sync
//!
//! SQLite storage for everything the sync engine reads or writes: partners,
//! catalog items, the invoice mirror, stock transfers, watermarks and
//! settings. Queries go through sqlx at runtime; the schema ships as
//! embedded migrations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ledger-sync (Reconciler, Orchestrator, Scheduler)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ledger-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ partner, ...  │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let state = db.sync_state().get("302563778").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::partner::PartnerRepository;
pub use repository::settings::SettingsRepository;
pub use repository::sync_state::SyncStateRepository;
pub use repository::transfer::TransferRepository;
