//! Shared runtime state for licsync-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The store and the
//! scheduler are shared with the background schedule spawned in `main.rs`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use licsync_reconcile::{LicenseStore, Reconciler, RunReport};

use crate::scheduler::Scheduler;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of daemon state, returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "postgres" | "memory"
    pub storage: String,
    pub sync_interval_secs: u64,
    pub sync_running: bool,
    pub sync_runs_completed: u64,
    pub sync_ticks_skipped: u64,
    pub sources: Vec<String>,
    pub last_run: Option<RunReport>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub build: BuildInfo,
    pub store: Arc<dyn LicenseStore>,
    pub scheduler: Arc<Scheduler>,
    pub storage: &'static str,
    pub sync_interval_secs: u64,
    pub sources: Vec<String>,
}

impl AppState {
    /// Wire a reconciler into a fresh scheduler. The reconciler must share
    /// `store` so manual and scheduled runs see the records the CRUD routes
    /// write.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        reconciler: Reconciler,
        storage: &'static str,
        sync_interval_secs: u64,
    ) -> Self {
        let sources = reconciler
            .source_labels()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            build: BuildInfo {
                service: "licsync-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            store,
            scheduler: Arc::new(Scheduler::new(Arc::new(reconciler))),
            storage,
            sync_interval_secs,
            sources,
        }
    }

    pub async fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            storage: self.storage.to_string(),
            sync_interval_secs: self.sync_interval_secs,
            sync_running: self.scheduler.is_running(),
            sync_runs_completed: self.scheduler.runs_completed(),
            sync_ticks_skipped: self.scheduler.ticks_skipped(),
            sources: self.sources.clone(),
            last_run: self.scheduler.last_report().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
