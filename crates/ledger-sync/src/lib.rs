//! # ledger-sync: Tax-Service Sync Engine
//!
//! Pulls electronic invoices from the government tax service and reconciles
//! them into the local ledger: partners, catalog items, invoices and stock
//! transfers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  Scheduler (timer + status poll)                 │  │
//! │  │                                                                  │  │
//! │  │  Runs a pass every interval, or on trigger_now()                 │  │
//! │  │  At most one pass in flight                                      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              SyncOrchestrator (one pass per tenant)              │  │
//! │  │                                                                  │  │
//! │  │  window [watermark, now] ─► counts ─► pages ─► reconcile each    │  │
//! │  │  advances the watermark only when the pass completes             │  │
//! │  └──────────────┬──────────────────────────────┬────────────────────┘  │
//! │                 ▼                              ▼                        │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │ TaxServiceClient           │  │ Reconciler                     │    │
//! │  │                            │  │                                │    │
//! │  │ bearer token per tenant    │  │ partner lookup / create        │    │
//! │  │ one re-auth on 401/403     │  │ ItemResolver (catalog codes)   │    │
//! │  │ count / list / line detail │  │ invoice upsert + lines         │    │
//! │  └─────────────┬──────────────┘  │ TransferMaterializer           │    │
//! │                ▼                 └───────────────┬────────────────┘    │
//! │  ┌────────────────────────────┐                  ▼                      │
//! │  │ TokenStore                 │  ┌────────────────────────────────┐    │
//! │  │ in-memory, keyed by tenant │  │ LedgerStore (ledger-db SQLite) │    │
//! │  └────────────────────────────┘  └────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - Sync error types
//! - [`token_store`] - Session tokens and the login handshake guard
//! - [`protocol`] - Wire types for the tax service
//! - [`client`] - HTTP client and the `TaxService` trait
//! - [`store`] - `LedgerStore` trait over the database
//! - [`catalog`] - Catalog item resolution and code generation
//! - [`transfer`] - Transfer materialization with compensation
//! - [`reconcile`] - Per-invoice reconciliation
//! - [`orchestrator`] - A full sync pass
//! - [`scheduler`] - Recurring and manual execution
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledger_sync::{
//!     InMemoryTokenStore, Scheduler, SchedulerSettings, SyncConfig, SyncOrchestrator,
//!     TaxServiceClient,
//! };
//!
//! let config = SyncConfig::load(None)?;
//! let client = TaxServiceClient::new(
//!     &config.service,
//!     config.principal(),
//!     Arc::new(InMemoryTokenStore::new()),
//! )?;
//!
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(client),
//!     Arc::new(database),
//!     &config.principal(),
//!     (&config).into(),
//! );
//!
//! let scheduler = Scheduler::start(Arc::new(orchestrator), (&config.schedule).into());
//! let report = scheduler.trigger_now().await?;
//! println!("{}", report.summary());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod token_store;
pub mod transfer;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::ItemResolver;
pub use client::{TaxService, TaxServiceClient};
pub use config::{DatabaseSettings, PrincipalSettings, ScheduleSettings, ServiceSettings, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{
    OrchestratorOptions, RecordFailure, RunSummary, SyncOrchestrator, SyncReport,
};
pub use protocol::{
    DocType, LineDetailReply, ListedInvoice, RawInvoice, RawLine, SearchCondition, SearchRole,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerSettings, SyncJob, SyncStatus};
pub use store::LedgerStore;
pub use token_store::{InMemoryTokenStore, SessionToken, TokenManager, TokenStore};
pub use transfer::{TransferMaterializer, TransferOutcome};
