//! Interval scheduler for reconciliation runs.
//!
//! One gate guards every run, scheduled or manual. A trigger that finds the
//! gate taken returns [`TriggerOutcome::AlreadyRunning`] immediately; it never
//! waits and is never queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use licsync_reconcile::{Reconciler, RunReport};

/// The unit of work the scheduler drives.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run_once(&self) -> RunReport;
}

#[async_trait]
impl SyncJob for Reconciler {
    async fn run_once(&self) -> RunReport {
        self.run().await
    }
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Completed(RunReport),
    AlreadyRunning,
}

pub struct Scheduler {
    job: Arc<dyn SyncJob>,
    gate: Mutex<()>,
    last_report: RwLock<Option<RunReport>>,
    runs_completed: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl Scheduler {
    pub fn new(job: Arc<dyn SyncJob>) -> Self {
        Self {
            job,
            gate: Mutex::new(()),
            last_report: RwLock::new(None),
            runs_completed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
        }
    }

    /// Run the job now unless a run is already in flight.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Ok(_guard) = self.gate.try_lock() else {
            return TriggerOutcome::AlreadyRunning;
        };

        let report = self.job.run_once().await;
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
        *self.last_report.write().await = Some(report.clone());
        TriggerOutcome::Completed(report)
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::SeqCst)
    }

    /// Scheduled ticks dropped because a run was in flight.
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::SeqCst)
    }

    /// Spawn the interval loop. With `run_immediately` the first run starts
    /// right away, otherwise after one full interval.
    pub fn start(
        self: &Arc<Self>,
        interval: Duration,
        run_immediately: bool,
    ) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sched = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !run_immediately {
                // The first tick of a tokio interval completes immediately.
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let TriggerOutcome::AlreadyRunning = sched.trigger().await {
                            sched.ticks_skipped.fetch_add(1, Ordering::SeqCst);
                            debug!("sync tick skipped: run already in progress");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("sync scheduler stopped");
        });

        info!(interval_secs = interval.as_secs(), "sync scheduler started");
        SchedulerHandle { stop_tx, task }
    }
}

/// Owner of a running schedule.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// End the schedule. A run the loop itself started finishes first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct CountingJob {
        runs: AtomicU64,
    }

    #[async_trait]
    impl SyncJob for CountingJob {
        async fn run_once(&self) -> RunReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            RunReport::empty(Utc::now())
        }
    }

    #[tokio::test]
    async fn trigger_records_last_report() {
        let job = Arc::new(CountingJob {
            runs: AtomicU64::new(0),
        });
        let sched = Scheduler::new(job.clone());
        assert!(sched.last_report().await.is_none());

        assert!(matches!(sched.trigger().await, TriggerOutcome::Completed(_)));
        assert!(sched.last_report().await.is_some());
        assert_eq!(sched.runs_completed(), 1);
        assert!(!sched.is_running());
    }

    #[tokio::test]
    async fn start_runs_immediately_then_on_interval() {
        let job = Arc::new(CountingJob {
            runs: AtomicU64::new(0),
        });
        let sched = Arc::new(Scheduler::new(job.clone()));

        let handle = sched.start(Duration::from_millis(20), true);
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.stop().await;

        let runs = job.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected several runs, got {runs}");

        // Stopped: no further runs.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn start_without_immediate_run_waits_one_interval() {
        let job = Arc::new(CountingJob {
            runs: AtomicU64::new(0),
        });
        let sched = Arc::new(Scheduler::new(job.clone()));

        let handle = sched.start(Duration::from_secs(3600), false);
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
