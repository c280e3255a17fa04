use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::constants::{INTERRUPTED_EXIT_CODE, RENDER_INTERVAL};
use crate::core::domain::{BatchConfig, TestCase};
use crate::core::pipeline::run::Run;
use crate::core::pipeline::scoreboard::Scoreboard;
use crate::core::traits::checker::Checker;
use crate::core::traits::sampler::UsageSampler;

/// Exit statuses above this collide with shell conventions.
const MAX_FAILURE_EXIT_CODE: usize = 125;

type RunQueue = Arc<Mutex<VecDeque<Arc<Run>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed { failures: usize },
    Interrupted,
}

impl BatchOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchOutcome::Completed { failures } => (*failures).min(MAX_FAILURE_EXIT_CODE) as i32,
            BatchOutcome::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("worker failed: {0}")]
    Worker(#[from] JoinError),
    #[error("no worker left to finish {0}")]
    Abandoned(String),
    #[error("failed to write results: {0}")]
    Output(#[from] io::Error),
}

/// Runs a batch of test cases over a fixed pool of workers.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<BatchConfig>,
    sampler: Arc<dyn UsageSampler>,
    checker: Arc<dyn Checker>,
}

impl Orchestrator {
    pub fn new(
        config: BatchConfig,
        sampler: Arc<dyn UsageSampler>,
        checker: Arc<dyn Checker>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sampler,
            checker,
        }
    }

    /// Creates every run up front and starts the workers; they pull runs
    /// from a shared queue in submission order.
    pub fn submit_all(&self, cases: Vec<TestCase>) -> Batch {
        let runs: Vec<Arc<Run>> = cases.into_iter().map(|case| Arc::new(Run::new(case))).collect();
        let queue: RunQueue = Arc::new(Mutex::new(runs.iter().cloned().collect()));

        let mut workers = JoinSet::new();
        let pool_size = self.config.budget.parallelism.max(1).min(runs.len());
        for worker in 0..pool_size {
            workers.spawn(work(
                worker,
                queue.clone(),
                self.config.clone(),
                self.sampler.clone(),
                self.checker.clone(),
            ));
        }
        tracing::info!("Submitted {} runs to {} workers", runs.len(), pool_size);

        Batch {
            runs,
            workers,
            presentation_error_is_failure: self.config.presentation_error_is_failure,
        }
    }
}

#[tracing::instrument(skip(queue, config, sampler, checker))]
async fn work(
    worker: usize,
    queue: RunQueue,
    config: Arc<BatchConfig>,
    sampler: Arc<dyn UsageSampler>,
    checker: Arc<dyn Checker>,
) {
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(run) = next else {
            break;
        };
        if run.is_aborted() {
            continue;
        }
        let result = run
            .execute(&config, sampler.clone(), checker.clone())
            .await;
        tracing::debug!("{} finished: {:?}", run.case().input_file, result);
    }
}

/// A submitted batch. Reporting walks the runs in submission order no
/// matter in which order they complete.
#[derive(Debug)]
pub struct Batch {
    runs: Vec<Arc<Run>>,
    workers: JoinSet<()>,
    presentation_error_is_failure: bool,
}

impl Batch {
    #[cfg(test)]
    pub fn runs(&self) -> &[Arc<Run>] {
        &self.runs
    }

    /// Blocks on each run in turn, redrawing its row every
    /// `RENDER_INTERVAL` while it is pending and committing it as soon as it
    /// is done.
    ///
    /// When `interrupt` resolves, every unfinished run is aborted and the
    /// pool is drained before returning.
    pub async fn report<W: Write>(
        mut self,
        board: &mut Scoreboard<W>,
        interrupt: impl Future<Output = ()>,
    ) -> Result<BatchOutcome, BatchError> {
        tokio::pin!(interrupt);
        let runs = self.runs.clone();
        let mut failures = 0;

        for run in &runs {
            let mut states = run.subscribe();
            // The first tick fires at once, so a pending row shows up immediately.
            let mut redraw = tokio::time::interval(RENDER_INTERVAL);
            redraw.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let state = run.snapshot();
                if let Some(result) = state.status.result() {
                    board.commit(run.case(), &state)?;
                    if result.is_failure(self.presentation_error_is_failure) {
                        failures += 1;
                    }
                    break;
                }

                tokio::select! {
                    _ = &mut interrupt => {
                        return self.cancel(board, run).await;
                    }
                    Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                        joined?;
                    }
                    _ = states.wait_for(|state| state.status.is_done()) => {}
                    _ = redraw.tick() => {
                        board.update(run.case(), &run.snapshot())?;
                    }
                }

                if self.workers.is_empty() && !run.snapshot().status.is_done() {
                    return Err(BatchError::Abandoned(run.case().input_file.clone()));
                }
            }
        }

        self.drain().await?;
        Ok(BatchOutcome::Completed { failures })
    }

    async fn cancel<W: Write>(
        &mut self,
        board: &mut Scoreboard<W>,
        current: &Run,
    ) -> Result<BatchOutcome, BatchError> {
        tracing::info!("Interrupted, aborting unfinished runs");
        // Waiting runs first, so no worker picks one up in between.
        for run in self.runs.iter().rev() {
            if !run.snapshot().status.is_done() {
                run.abort();
            }
        }
        self.drain().await?;
        board.commit(current.case(), &current.snapshot())?;
        Ok(BatchOutcome::Interrupted)
    }

    async fn drain(&mut self) -> Result<(), BatchError> {
        while let Some(joined) = self.workers.join_next().await {
            joined?;
        }
        Ok(())
    }
}
