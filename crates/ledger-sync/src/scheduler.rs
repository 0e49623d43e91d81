//! # Sync Scheduler
//!
//! Recurring execution of sync passes, plus a manual trigger.
//!
//! ## Tasks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │ Timer task                   │   │ Status poll task             │   │
//! │  │                              │   │                              │   │
//! │  │ delay = interval - elapsed   │   │ every status_poll:           │   │
//! │  │ sleep(delay) ─► run pass     │   │   reload SyncState           │   │
//! │  │ recompute after every run    │   │   into SyncStatus            │   │
//! │  │ no watermark → dormant       │   │ (skips while one is running) │   │
//! │  └──────────────┬───────────────┘   └──────────────────────────────┘   │
//! │                 │                                                       │
//! │   trigger_now() ┼──► in-flight flag ──busy──► AlreadyRunning           │
//! │                 │         │ free                                        │
//! │                 │         ▼                                             │
//! │                 │    run pass, then wake timer to re-arm               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timing is measured from the last successful run stored with the sync
//! state, so a restarted daemon keeps its cadence. A failed attempt also
//! pushes the next scheduled run a full interval out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ledger_core::window::next_run_delay;
use ledger_core::SyncState;

use crate::config::ScheduleSettings;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{RunSummary, SyncOrchestrator, SyncReport};

// =============================================================================
// Sync Job
// =============================================================================

/// A pass the scheduler can run.
#[async_trait]
pub trait SyncJob: Send + Sync + 'static {
    fn tenant_id(&self) -> &str;

    async fn run(&self) -> SyncResult<SyncReport>;

    async fn state(&self) -> SyncResult<Option<SyncState>>;
}

#[async_trait]
impl SyncJob for SyncOrchestrator {
    fn tenant_id(&self) -> &str {
        SyncOrchestrator::tenant_id(self)
    }

    async fn run(&self) -> SyncResult<SyncReport> {
        self.run_sync().await
    }

    async fn state(&self) -> SyncResult<Option<SyncState>> {
        self.sync_state().await
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observable scheduler state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// A pass is executing right now.
    pub running: bool,
    /// No watermark is stored; only a manual run can start syncing.
    pub dormant: bool,
    pub watermark: Option<DateTime<Utc>>,
    /// Last successful pass.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last pass started, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub status_poll: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            interval: Duration::from_secs(30 * 60),
            status_poll: Duration::from_secs(30),
        }
    }
}

impl From<&ScheduleSettings> for SchedulerSettings {
    fn from(settings: &ScheduleSettings) -> Self {
        SchedulerSettings {
            interval: settings.interval(),
            status_poll: settings.status_poll(),
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    job: Arc<dyn SyncJob>,
    settings: SchedulerSettings,
    in_flight: AtomicBool,
    refreshing: AtomicBool,
    stopped: AtomicBool,
    status: RwLock<SyncStatus>,
    rearm: Notify,
}

/// Clears a flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    /// Runs one pass unless another is in flight.
    async fn run_guarded(&self, trigger: Trigger) -> SyncResult<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _flight = FlagGuard(&self.in_flight);

        {
            let mut status = self.status.write().await;
            status.running = true;
            status.last_attempt_at = Some(Utc::now());
        }

        info!(tenant_id = %self.job.tenant_id(), %trigger, "Sync run starting");
        let result = self.job.run().await;

        let mut status = self.status.write().await;
        status.running = false;
        match &result {
            Ok(report) => {
                status.dormant = false;
                status.watermark = Some(report.anchor);
                status.last_run_at = Some(report.finished_at);
                status.last_summary = Some(report.summary());
                status.last_error = None;
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
            }
        }

        result
    }

    /// Computes the delay before the next scheduled run.
    ///
    /// `None` means dormant: wait for a manual trigger.
    async fn schedule_next(&self) -> Option<Duration> {
        let now = Utc::now();

        match self.job.state().await {
            Ok(Some(state)) => {
                let mut status = self.status.write().await;
                let reference = state.last_run_at.max(status.last_attempt_at);
                let delay = next_run_delay(self.settings.interval, reference, now);

                status.dormant = false;
                status.watermark = Some(state.watermark);
                status.last_run_at = state.last_run_at;
                status.next_run_at = chrono::Duration::from_std(delay).ok().map(|d| now + d);

                debug!(
                    tenant_id = %self.job.tenant_id(),
                    delay_secs = delay.as_secs(),
                    "Next sync scheduled"
                );
                Some(delay)
            }
            Ok(None) => {
                let mut status = self.status.write().await;
                status.dormant = true;
                status.next_run_at = None;

                info!(
                    tenant_id = %self.job.tenant_id(),
                    "No watermark stored; waiting for a manual run"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not load sync state; retrying after one interval");
                let mut status = self.status.write().await;
                status.next_run_at = chrono::Duration::from_std(self.settings.interval)
                    .ok()
                    .map(|d| now + d);
                Some(self.settings.interval)
            }
        }
    }

    /// Reloads the stored state into the status snapshot.
    async fn refresh_status(&self) {
        match self.job.state().await {
            Ok(state) => {
                let mut status = self.status.write().await;
                // A parked timer has no next run; wake it once state shows up
                let wake = state.is_some() && status.next_run_at.is_none();
                status.dormant = state.is_none();
                status.watermark = state.as_ref().map(|s| s.watermark);
                status.last_run_at = state.and_then(|s| s.last_run_at);
                drop(status);

                if wake {
                    debug!(tenant_id = %self.job.tenant_id(), "Sync state appeared; waking timer");
                    self.rearm.notify_one();
                }
            }
            Err(e) => debug!(error = %e, "Status refresh failed"),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Starts the scheduler tasks.
pub struct Scheduler;

impl Scheduler {
    /// Spawns the timer and status-poll tasks and returns their handle.
    pub fn start(job: Arc<dyn SyncJob>, settings: SchedulerSettings) -> SchedulerHandle {
        let shared = Arc::new(Shared {
            job,
            settings,
            in_flight: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::default()),
            rearm: Notify::new(),
        });

        let (timer_shutdown_tx, timer_shutdown_rx) = mpsc::channel(1);
        let (poll_shutdown_tx, poll_shutdown_rx) = mpsc::channel(1);

        let timer = tokio::spawn(run_timer(shared.clone(), timer_shutdown_rx));
        let poll = tokio::spawn(run_status_poll(shared.clone(), poll_shutdown_rx));

        SchedulerHandle {
            shared,
            shutdown_txs: vec![timer_shutdown_tx, poll_shutdown_tx],
            tasks: Arc::new(Mutex::new(vec![timer, poll])),
        }
    }
}

async fn run_timer(shared: Arc<Shared>, mut shutdown_rx: mpsc::Receiver<()>) {
    info!(
        tenant_id = %shared.job.tenant_id(),
        interval_secs = shared.settings.interval.as_secs(),
        "Sync scheduler starting"
    );

    loop {
        let delay = shared.schedule_next().await;
        let timer = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = timer => {
                match shared.run_guarded(Trigger::Scheduled).await {
                    Ok(report) => {
                        info!(summary = %report.summary(), "Scheduled sync finished");
                    }
                    Err(SyncError::AlreadyRunning) => {
                        debug!("Manual sync in progress; scheduled run skipped");
                    }
                    Err(e) => {
                        error!(error = %e, retryable = e.is_retryable(), "Scheduled sync failed");
                    }
                }
            }

            _ = shared.rearm.notified() => {
                debug!("Re-arming timer");
            }

            _ = shutdown_rx.recv() => {
                info!("Sync scheduler shutting down");
                break;
            }
        }
    }

    info!("Sync scheduler stopped");
}

async fn run_status_poll(shared: Arc<Shared>, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut interval = tokio::time::interval(shared.settings.status_poll);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if shared
                    .refreshing
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    debug!("Previous status refresh still running");
                    continue;
                }

                let shared = shared.clone();
                tokio::spawn(async move {
                    let _refresh = FlagGuard(&shared.refreshing);
                    shared.refresh_status().await;
                });
            }

            _ = shutdown_rx.recv() => {
                debug!("Status poll shutting down");
                break;
            }
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for triggering runs, reading status and stopping the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    shutdown_txs: Vec<mpsc::Sender<()>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    /// Runs a pass now and re-arms the timer from its completion.
    ///
    /// ## Errors
    /// `SyncError::AlreadyRunning` if a pass is in flight; otherwise the
    /// error of the pass itself.
    pub async fn trigger_now(&self) -> SyncResult<SyncReport> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(SyncError::ShuttingDown);
        }

        let result = self.shared.run_guarded(Trigger::Manual).await;
        if !matches!(result, Err(SyncError::AlreadyRunning)) {
            self.shared.rearm.notify_one();
        }
        result
    }

    /// Current status snapshot.
    pub async fn status(&self) -> SyncStatus {
        self.shared.status.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Stops both tasks and waits for them to finish.
    ///
    /// A pass already in flight is allowed to complete.
    pub async fn shutdown(&self) -> SyncResult<()> {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for tx in &self.shutdown_txs {
            tx.send(())
                .await
                .map_err(|_| SyncError::ChannelError("Scheduler shutdown channel closed".into()))?;
        }

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }

        Ok(())
    }
}
