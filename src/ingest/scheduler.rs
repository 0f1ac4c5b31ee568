use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Coordinator, IngestError, RunReport};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Single-flight wrapper around the ingestion [`Coordinator`].
///
/// At most one run executes at any moment, no matter how many callers hold
/// clones of the scheduler. The periodic timer and any manual trigger share
/// the same gate, so a manual refresh landing mid-run coalesces into the run
/// already in flight instead of queueing a second one.
#[derive(Clone)]
pub struct Scheduler {
    coordinator: Arc<Coordinator>,
    gate: Arc<Mutex<()>>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            gate: Arc::new(Mutex::new(())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Request a run now.
    ///
    /// Returns `None` when a run is already in flight; the caller's request
    /// is considered satisfied by that run. Otherwise executes a full run and
    /// returns its outcome.
    pub async fn trigger(&self) -> Option<Result<RunReport, IngestError>> {
        let Ok(_guard) = self.gate.try_lock() else {
            info!("ingestion already in flight, coalescing trigger");
            return None;
        };

        self.running.store(true, Ordering::SeqCst);
        let result = self.coordinator.run().await;
        self.running.store(false, Ordering::SeqCst);

        Some(result)
    }

    /// Spawn the periodic loop: wait `startup_delay`, run, then run every
    /// `period`. A zero `period` performs the warm-up run and stops, which
    /// keeps one-shot invocations out of the timer path.
    pub fn spawn(&self, startup_delay: Duration, period: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;

            loop {
                match scheduler.trigger().await {
                    Some(Ok(report)) => {
                        info!(sources = report.results.len(), "scheduled run finished");
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "scheduled run aborted");
                    }
                    None => {
                        warn!("scheduled run skipped, previous run still in flight");
                    }
                }

                if period.is_zero() {
                    return;
                }
                tokio::time::sleep(period).await;
            }
        })
    }
}
