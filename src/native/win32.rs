use std::mem;

use windows_sys::Win32::Foundation::FILETIME;
use windows_sys::Win32::System::ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS};
use windows_sys::Win32::System::Threading::GetProcessTimes;

use crate::core::traits::sampler::{ProcessHandle, SamplerError, Usage, UsageSampler};

/// FILETIME counts 100 ns intervals.
const FILETIME_TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Queries `GetProcessTimes` and `GetProcessMemoryInfo` on the child's
/// process handle.
#[derive(Debug, Clone, Default)]
pub struct Win32Sampler;

#[async_trait::async_trait]
impl UsageSampler for Win32Sampler {
    fn name(&self) -> &'static str {
        "win32"
    }

    fn read_usage(&self, handle: &ProcessHandle) -> Result<Usage, SamplerError> {
        let pid = handle.pid();
        let raw = handle.raw_handle().ok_or(SamplerError::ProcessGone(pid))?;

        let mut creation = empty_filetime();
        let mut exit = empty_filetime();
        let mut kernel = empty_filetime();
        let mut user = empty_filetime();
        // SAFETY: `raw` stays valid while the tokio child is not reaped, and
        // every out pointer refers to a live local.
        let ok = unsafe {
            GetProcessTimes(raw as _, &mut creation, &mut exit, &mut kernel, &mut user)
        };
        if ok == 0 {
            return Err(SamplerError::Os {
                pid,
                call: "GetProcessTimes",
            });
        }

        // SAFETY: PROCESS_MEMORY_COUNTERS is plain data; all-zero is valid.
        let mut counters: PROCESS_MEMORY_COUNTERS = unsafe { mem::zeroed() };
        counters.cb = mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        // SAFETY: as above; `cb` matches the buffer size.
        let ok = unsafe { GetProcessMemoryInfo(raw as _, &mut counters, counters.cb) };
        if ok == 0 {
            return Err(SamplerError::Os {
                pid,
                call: "GetProcessMemoryInfo",
            });
        }

        Ok(Usage {
            cpu_seconds: (filetime_ticks(&kernel) + filetime_ticks(&user)) as f64
                / FILETIME_TICKS_PER_SECOND,
            memory_bytes: counters.PeakWorkingSetSize as u64,
        })
    }
}

fn empty_filetime() -> FILETIME {
    FILETIME {
        dwLowDateTime: 0,
        dwHighDateTime: 0,
    }
}

fn filetime_ticks(time: &FILETIME) -> u64 {
    (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
}
