//! # Sync Orchestrator
//!
//! One full pass over the tax service for a tenant.
//!
//! ## Pass Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Start                                                                  │
//! │    │  load SyncState (or configured initial watermark)                 │
//! │    ▼                                                                    │
//! │  ComputeWindow      [watermark, now]  (now captured once)              │
//! │    ▼                                                                    │
//! │  CountBuyer ─► CountSupplier                                           │
//! │    ▼                                                                    │
//! │  PageBuyer*  ─► PageSupplier*     offset += page_size until count      │
//! │    ▼                              (an empty page also stops)           │
//! │  Reconcile each record ── failure ──► logged + reported, pass goes on  │
//! │    ▼                                                                    │
//! │  AdvanceWatermark   SyncState {watermark: window.end, last_run_at}     │
//! │    ▼                                                                    │
//! │  Done                                                                   │
//! │                                                                         │
//! │  Any error before AdvanceWatermark aborts the pass and leaves the      │
//! │  stored state as it was, so the same window is fetched again.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ledger_core::{SyncPrincipal, SyncState, SyncWindow};

use crate::catalog::ItemResolver;
use crate::client::TaxService;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ListedInvoice, SearchCondition, SearchRole};
use crate::reconcile::Reconciler;
use crate::store::LedgerStore;

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub page_size: u64,
    /// Window start when the tenant has no stored state.
    pub initial_watermark: Option<DateTime<Utc>>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        OrchestratorOptions {
            page_size: 100,
            initial_watermark: None,
        }
    }
}

impl From<&SyncConfig> for OrchestratorOptions {
    fn from(config: &SyncConfig) -> Self {
        OrchestratorOptions {
            page_size: config.service.page_size,
            initial_watermark: config.schedule.initial_watermark,
        }
    }
}

/// Reported for list rows that carry no usable id.
const UNKNOWN_INVOICE_ID: &str = "<unknown>";

// =============================================================================
// Report
// =============================================================================

/// An invoice that could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub invoice_id: String,
    pub error: String,
}

/// Counts shown to an operator after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {}, new {}, updated {}, failed {}",
            self.total, self.created, self.updated, self.failed
        )
    }
}

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub tenant_id: String,
    pub window: SyncWindow,
    /// Watermark persisted by this pass (the window end).
    pub anchor: DateTime<Utc>,
    pub record_count: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<RecordFailure>,
    pub transfers_created: usize,
    /// Transfers that were attempted and rolled back.
    pub transfer_failures: Vec<RecordFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.record_count,
            created: self.created,
            updated: self.updated,
            failed: self.failed.len(),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs sync passes for one principal.
pub struct SyncOrchestrator {
    service: Arc<dyn TaxService>,
    store: Arc<dyn LedgerStore>,
    reconciler: Reconciler,
    tenant_id: String,
    options: OrchestratorOptions,
}

impl SyncOrchestrator {
    /// `service` must be authenticated as `principal`.
    pub fn new(
        service: Arc<dyn TaxService>,
        store: Arc<dyn LedgerStore>,
        principal: &SyncPrincipal,
        options: OrchestratorOptions,
    ) -> Self {
        SyncOrchestrator {
            reconciler: Reconciler::new(service.clone(), store.clone()),
            service,
            store,
            tenant_id: principal.tenant_id.clone(),
            options,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Stored progress for the tenant.
    pub async fn sync_state(&self) -> SyncResult<Option<SyncState>> {
        self.store.load_sync_state(&self.tenant_id).await
    }

    /// Establishes the first watermark; the next pass starts there.
    pub async fn seed_watermark(&self, watermark: DateTime<Utc>) -> SyncResult<SyncState> {
        let state = SyncState {
            tenant_id: self.tenant_id.clone(),
            watermark,
            last_run_at: None,
        };
        self.store.save_sync_state(&state).await?;

        info!(tenant_id = %self.tenant_id, %watermark, "Watermark seeded");
        Ok(state)
    }

    /// Runs one full pass.
    pub async fn run_sync(&self) -> SyncResult<SyncReport> {
        let started_at = Utc::now();

        let watermark = match self.sync_state().await? {
            Some(state) => state.watermark,
            None => self
                .options
                .initial_watermark
                .ok_or_else(|| SyncError::NoWatermark {
                    tenant_id: self.tenant_id.clone(),
                })?,
        };
        let window = SyncWindow::open(watermark, started_at);

        info!(
            tenant_id = %self.tenant_id,
            from = %window.start,
            to = %window.end,
            "Sync pass starting"
        );

        let as_buyer = SearchCondition::new(SearchRole::Buyer, &self.tenant_id, &window);
        let as_supplier = SearchCondition::new(SearchRole::Supplier, &self.tenant_id, &window);

        let buyer_count = self.service.fetch_count(&as_buyer).await?;
        let supplier_count = self.service.fetch_count(&as_supplier).await?;
        debug!(buyer_count, supplier_count, "Counted invoices in window");

        let mut records = self.fetch_all(&as_buyer, buyer_count).await?;
        records.extend(self.fetch_all(&as_supplier, supplier_count).await?);

        let mut seen_ids = HashSet::new();
        records.retain(|row| row.id().map_or(true, |id| seen_ids.insert(id.to_string())));

        let mut report = SyncReport {
            tenant_id: self.tenant_id.clone(),
            window,
            anchor: window.next_watermark(),
            record_count: records.len(),
            created: 0,
            updated: 0,
            failed: Vec::new(),
            transfers_created: 0,
            transfer_failures: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        let mut items = ItemResolver::new(self.store.clone());
        for row in &records {
            let raw = match row {
                ListedInvoice::Valid(raw) => raw,
                ListedInvoice::Malformed { id, reason } => {
                    warn!(invoice_id = ?id, reason = %reason, "Skipping undecodable invoice row");
                    report.failed.push(RecordFailure {
                        invoice_id: id.clone().unwrap_or_else(|| UNKNOWN_INVOICE_ID.to_string()),
                        error: format!("malformed invoice row: {}", reason),
                    });
                    continue;
                }
            };

            match self
                .reconciler
                .reconcile_with(raw, &self.tenant_id, &mut items)
                .await
            {
                Ok(outcome) => {
                    if outcome.created {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }

                    if let Some(transfer) = outcome.transfer {
                        if transfer.transfer_id.is_some() {
                            report.transfers_created += 1;
                        } else {
                            report.transfer_failures.push(RecordFailure {
                                invoice_id: raw.id.clone(),
                                error: transfer.errors.join("; "),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(invoice_id = %raw.id, error = %e, "Invoice reconciliation failed");
                    report.failed.push(RecordFailure {
                        invoice_id: raw.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        self.store
            .save_sync_state(&SyncState {
                tenant_id: self.tenant_id.clone(),
                watermark: report.anchor,
                last_run_at: Some(finished_at),
            })
            .await?;
        report.finished_at = finished_at;

        info!(
            tenant_id = %self.tenant_id,
            anchor = %report.anchor,
            summary = %report.summary(),
            transfers = report.transfers_created,
            "Sync pass complete"
        );

        Ok(report)
    }

    /// Pages through `condition` until `count` records have been requested.
    async fn fetch_all(
        &self,
        condition: &SearchCondition,
        count: u64,
    ) -> SyncResult<Vec<ListedInvoice>> {
        let page_size = self.options.page_size.max(1);
        let mut records = Vec::with_capacity(count as usize);
        let mut offset = 0;

        while offset < count {
            let page = self
                .service
                .fetch_page(condition, offset, page_size)
                .await?;

            if page.is_empty() {
                warn!(
                    role = %condition.role,
                    offset,
                    count,
                    "Empty page before reaching count; stopping"
                );
                break;
            }

            records.extend(page);
            offset += page_size;
        }

        Ok(records)
    }
}
