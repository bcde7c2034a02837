use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::config::ToolchainConfig;
use crate::dashboard::{RenderSession, StatusRenderer};
use crate::error::CaseError;
use crate::test_case::TestCase;
use crate::types::{CaseSnapshot, TestStatus};
use crate::worker;

// --- Public types ---

/// Result of a scheduler run, returned to the caller for summary display.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ok: usize,
    pub failed: usize,
    pub errored: usize,
    /// Cases never admitted: claimed elsewhere, or left behind by an interrupt.
    pub not_run: usize,
    pub halt_reason: HaltReason,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum HaltReason {
    #[default]
    AllFinished,
    ShutdownRequested,
}

/// Floor for `RunParams::refresh_interval`; a zero period would never yield.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Parameters for running the scheduler.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub max_concurrent: usize,
    /// Redraw interval while workers are active, so elapsed times keep moving.
    pub refresh_interval: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            refresh_interval: Duration::from_millis(100),
        }
    }
}

// --- Running workers ---

/// Admission queue plus the registry of active workers.
///
/// The queue preserves discovery order; workers leave the registry in
/// whatever order they finish.
struct WorkerPool {
    queue: VecDeque<Arc<TestCase>>,
    active: JoinSet<TestStatus>,
    limit: usize,
    not_run: usize,
}

impl WorkerPool {
    fn new(cases: &[Arc<TestCase>], limit: usize) -> Self {
        Self {
            queue: cases.iter().cloned().collect(),
            active: JoinSet::new(),
            limit: limit.max(1),
            not_run: 0,
        }
    }

    /// Start workers until the limit is reached or the queue is empty.
    fn admit(&mut self, backend: &Arc<impl Backend + 'static>, toolchain: &Arc<ToolchainConfig>) {
        while self.active.len() < self.limit {
            let Some(case) = self.queue.pop_front() else {
                break;
            };

            let Ok(writer) = case.claim() else {
                self.not_run += 1;
                continue;
            };

            let backend = Arc::clone(backend);
            let toolchain = Arc::clone(toolchain);
            self.active.spawn(async move {
                worker::run_case(writer, backend.as_ref(), &toolchain).await
            });
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty()
    }
}

// --- Main loop ---

/// Run every case under bounded concurrency while redrawing the dashboard.
///
/// The loop:
/// 1. Admit queued cases (FIFO) until `max_concurrent` workers are active
/// 2. Render the current snapshot
/// 3. Block until a worker finishes, the refresh tick fires, or shutdown
/// 4. Loop until the queue is empty and no workers remain
///
/// There is no per-test timeout: a hung compile or executable holds its slot
/// until it exits. Only `cancel` (a user interrupt) stops the run early, by
/// aborting every worker.
pub async fn run_scheduler<R: StatusRenderer>(
    cases: &[Arc<TestCase>],
    backend: Arc<impl Backend + 'static>,
    toolchain: Arc<ToolchainConfig>,
    params: RunParams,
    renderer: &mut R,
    cancel: CancellationToken,
) -> Result<RunSummary, String> {
    let mut session = RenderSession::acquire(renderer)
        .map_err(|e| format!("Failed to acquire terminal: {}", e))?;

    let mut pool = WorkerPool::new(cases, params.max_concurrent);
    let mut ticker = tokio::time::interval(params.refresh_interval.max(MIN_REFRESH_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut halt_reason = HaltReason::AllFinished;

    loop {
        pool.admit(&backend, &toolchain);

        // Dashboard output is advisory; a failed redraw never stops the run.
        let _ = session.render(&snapshot_all(cases));

        if pool.is_idle() {
            break;
        }

        tokio::select! {
            Some(_) = pool.active.join_next() => {
                // A panicked worker needs no handling here: dropping its
                // claim already settled the case at ERROR.
            }
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                pool.active.abort_all();
                while pool.active.join_next().await.is_some() {}
                pool.not_run += pool.queue.len();
                pool.queue.clear();
                halt_reason = HaltReason::ShutdownRequested;
                break;
            }
        }
    }

    let snapshot = snapshot_all(cases);
    let _ = session.finish(&snapshot);

    Ok(build_summary(&snapshot, pool.not_run, halt_reason))
}

/// Clean every case synchronously, without workers or a dashboard.
///
/// Returns the cases that could not be cleaned, with the reason.
pub fn clean_all(cases: &[Arc<TestCase>]) -> Vec<(String, CaseError)> {
    cases
        .iter()
        .filter_map(|case| case.clean().err().map(|e| (case.dir_name().to_string(), e)))
        .collect()
}

pub fn snapshot_all(cases: &[Arc<TestCase>]) -> Vec<CaseSnapshot> {
    cases.iter().map(|case| case.snapshot()).collect()
}

fn build_summary(snapshot: &[CaseSnapshot], not_run: usize, halt_reason: HaltReason) -> RunSummary {
    let mut summary = RunSummary {
        not_run,
        halt_reason,
        ..RunSummary::default()
    };
    for case in snapshot {
        match case.status {
            TestStatus::Ok => summary.ok += 1,
            TestStatus::Fail => summary.failed += 1,
            TestStatus::Error => summary.errored += 1,
            _ => {}
        }
    }
    summary
}
