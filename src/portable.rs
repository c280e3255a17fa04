use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::core::traits::sampler::{ProcessHandle, SamplerError, Usage, UsageSampler};

/// Cross-platform probe backed by `sysinfo`.
#[derive(Debug)]
pub struct PortableSampler {
    system: Mutex<System>,
}

impl PortableSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for PortableSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UsageSampler for PortableSampler {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn read_usage(&self, handle: &ProcessHandle) -> Result<Usage, SamplerError> {
        let pid = Pid::from_u32(handle.pid());
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = system
            .process(pid)
            .ok_or(SamplerError::ProcessGone(handle.pid()))?;

        // Virtual size is garbage on macOS, resident size is used there.
        let memory_bytes = if cfg!(target_os = "macos") {
            process.memory()
        } else {
            process.virtual_memory()
        };

        Ok(Usage {
            cpu_seconds: process.accumulated_cpu_time() as f64 / 1000.0,
            memory_bytes,
        })
    }
}
