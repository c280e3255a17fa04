use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::traits::sampler::{
    Launch, ProcessHandle, SamplerError, SpawnError, Usage, UsageSampler,
};

/// Replays a fixed sequence of readings, repeating the last one forever.
/// The child process itself is real.
#[derive(Debug)]
pub struct SamplerStub {
    readings: Mutex<Vec<Usage>>,
    calls: AtomicUsize,
}

impl SamplerStub {
    pub fn new(readings: Vec<Usage>) -> Self {
        assert!(!readings.is_empty());
        Self {
            readings: Mutex::new(readings),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(cpu_seconds: f64, memory_bytes: u64) -> Self {
        Self::new(vec![Usage {
            cpu_seconds,
            memory_bytes,
        }])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UsageSampler for SamplerStub {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn read_usage(&self, _handle: &ProcessHandle) -> Result<Usage, SamplerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let readings = self.readings.lock().unwrap();
        Ok(readings[call.min(readings.len() - 1)])
    }
}

/// Wraps another sampler and tracks how many children are alive at once.
#[derive(Debug)]
pub struct CountingSampler<S> {
    inner: S,
    live: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl<S: UsageSampler> CountingSampler<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<S: UsageSampler> UsageSampler for CountingSampler<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn read_usage(&self, handle: &ProcessHandle) -> Result<Usage, SamplerError> {
        self.inner.read_usage(handle)
    }

    fn start(&self, launch: Launch) -> Result<ProcessHandle, SpawnError> {
        let handle = self.inner.start(launch)?;
        self.started.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(handle)
    }

    async fn wait(&self, handle: &mut ProcessHandle) -> Option<i32> {
        let code = self.inner.wait(handle).await;
        self.live.fetch_sub(1, Ordering::SeqCst);
        code
    }
}
