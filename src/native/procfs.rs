use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::traits::sampler::{ProcessHandle, SamplerError, Usage, UsageSampler};

const DEFAULT_TICKS_PER_SECOND: f64 = 100.0;

/// Reads `/proc/<pid>/stat` for CPU ticks and `/proc/<pid>/status` for
/// `VmPeak`.
#[derive(Debug, Clone)]
pub struct ProcfsSampler {
    root: PathBuf,
    ticks_per_second: f64,
}

impl ProcfsSampler {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().into(),
            ticks_per_second: clock_ticks(),
        }
    }

    fn read(&self, pid: u32, file: &str) -> Result<String, SamplerError> {
        fs::read_to_string(self.root.join(pid.to_string()).join(file)).map_err(|e| {
            match e.kind() {
                io::ErrorKind::NotFound => SamplerError::ProcessGone(pid),
                _ => SamplerError::Io(e),
            }
        })
    }
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UsageSampler for ProcfsSampler {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn read_usage(&self, handle: &ProcessHandle) -> Result<Usage, SamplerError> {
        let pid = handle.pid();
        let ticks = parse_cpu_ticks(&self.read(pid, "stat")?)
            .ok_or(SamplerError::Malformed { pid, what: "stat" })?;
        // Zombies have no Vm* lines left.
        let vm_peak = parse_vm_peak(&self.read(pid, "status")?).unwrap_or(0);

        Ok(Usage {
            cpu_seconds: ticks as f64 / self.ticks_per_second,
            memory_bytes: vm_peak,
        })
    }
}

fn clock_ticks() -> f64 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => DEFAULT_TICKS_PER_SECOND,
    }
}

/// utime + stime. The command name may contain spaces and parentheses, so
/// fields are counted from the last `)`.
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

fn parse_vm_peak(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmPeak:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
