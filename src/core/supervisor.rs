use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::constants::POLL_INTERVAL;
use crate::core::domain::{ExecutionBudget, RunMetrics};
use crate::core::traits::sampler::{Launch, SpawnError, UsageSampler};

/// Cooperative cancellation request shared between a supervisor and
/// whoever wants it to stop.
#[derive(Debug, Default)]
pub struct AbortSignal {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        // Stores a permit when nobody is sleeping yet.
        self.notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless an abort arrives first.
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }
}

/// Runs one child process to completion or until it breaks its budget,
/// enforcing limits by polling a [`UsageSampler`].
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    sampler: Arc<dyn UsageSampler>,
    abort: Arc<AbortSignal>,
}

impl ProcessSupervisor {
    pub fn new(sampler: Arc<dyn UsageSampler>, abort: Arc<AbortSignal>) -> Self {
        Self { sampler, abort }
    }

    /// Safe to call from any task; `run` notices it within one poll.
    #[cfg(test)]
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Limit violations are reported through the returned metrics, only a
    /// failed spawn is an error. `on_sample` sees the metrics after every
    /// sample, for live display.
    pub async fn run<F>(
        &self,
        launch: Launch,
        budget: &ExecutionBudget,
        mut on_sample: F,
    ) -> Result<RunMetrics, SpawnError>
    where
        F: FnMut(&RunMetrics) + Send,
    {
        let mut handle = self.sampler.start(launch)?;
        let pid = handle.pid();
        let mut metrics = RunMetrics::default();

        loop {
            let sample = self.sampler.sample(&mut handle);
            metrics.record(sample.cpu_seconds, sample.peak_memory_bytes);
            metrics.evaluate(budget);
            on_sample(&metrics);

            if sample.has_exited || metrics.limit_exceeded() || self.abort.is_aborted() {
                break;
            }
            self.abort.sleep(POLL_INTERVAL).await;
        }

        if metrics.limit_exceeded() {
            tracing::debug!(
                pid,
                cpu_seconds = metrics.cpu_seconds,
                peak_memory_bytes = metrics.peak_memory_bytes,
                timed_out = metrics.timed_out,
                mem_exceeded = metrics.mem_exceeded,
                "limit exceeded, killing child"
            );
        } else if self.abort.is_aborted() {
            tracing::debug!(pid, "aborted, killing child");
        }

        self.sampler.terminate(&mut handle);
        metrics.exit_code = self.sampler.wait(&mut handle).await;

        let last = self.sampler.sample(&mut handle);
        metrics.record(last.cpu_seconds, last.peak_memory_bytes);
        metrics.evaluate(budget);
        on_sample(&metrics);

        tracing::debug!(pid, ?metrics, "child reaped");
        Ok(metrics)
    }
}
