use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::constants::MEMORY_SANITY_CEILING;

/// Everything needed to launch the program under test once.
#[derive(Debug, Default)]
pub struct Launch {
    pub program: PathBuf,
    /// Attached to the child's stdin; `None` means an empty stdin.
    pub stdin: Option<File>,
    /// Receives the child's stdout; `None` discards it.
    pub stdout: Option<File>,
    pub cwd: Option<PathBuf>,
}

/// A spawned child process. Samplers observe it, they do not own its
/// lifecycle.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    pub fn spawn(launch: Launch) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&launch.program);
        cmd.stdin(launch.stdin.map_or_else(Stdio::null, Stdio::from))
            .stdout(launch.stdout.map_or_else(Stdio::null, Stdio::from))
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        raise_stack_limit(&mut cmd);

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&launch.program, e))?;
        let pid = child.id().ok_or_else(|| SpawnError::Io {
            path: launch.program.clone(),
            source: io::Error::other("child exited before its pid was read"),
        })?;
        tracing::debug!(pid, program = %launch.program.display(), "spawned child");

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(windows)]
    pub fn raw_handle(&self) -> Option<std::os::windows::io::RawHandle> {
        self.child.raw_handle()
    }

    /// Non-blocking; reaps the child if it has already exited.
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::trace!(pid = self.pid, "kill ignored: {}", e);
        }
    }

    pub async fn reap(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => Some(exit_code(status)),
            Err(e) => {
                tracing::warn!(pid = self.pid, "failed to wait for child: {}", e);
                None
            }
        }
    }
}

/// Signal deaths map to the negated signal number.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn raise_stack_limit(cmd: &mut Command) {
    use nix::sys::resource::{Resource, getrlimit, setrlimit};

    // SAFETY: only async-signal-safe syscalls run between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            let (_, hard) = getrlimit(Resource::RLIMIT_STACK)?;
            setrlimit(Resource::RLIMIT_STACK, hard, hard)?;
            Ok(())
        });
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    pub cpu_seconds: f64,
    pub memory_bytes: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    pub cpu_seconds: f64,
    pub peak_memory_bytes: u64,
    pub has_exited: bool,
}

/// Probe for the CPU time and memory of a running child.
///
/// Variants only differ in [`UsageSampler::read_usage`]; spawning, sampling
/// policy, termination and reaping are shared so that every variant behaves
/// the same towards the supervisor.
#[async_trait::async_trait]
pub trait UsageSampler: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Cumulative user + system CPU time and current (or peak) memory size.
    fn read_usage(&self, handle: &ProcessHandle) -> Result<Usage, SamplerError>;

    fn start(&self, launch: Launch) -> Result<ProcessHandle, SpawnError> {
        ProcessHandle::spawn(launch)
    }

    fn sample(&self, handle: &mut ProcessHandle) -> Sample {
        let usage = self.read_usage(handle);
        let has_exited = handle.has_exited();
        match usage {
            Ok(usage) => Sample {
                cpu_seconds: usage.cpu_seconds,
                peak_memory_bytes: sanitize_memory(usage.memory_bytes),
                has_exited,
            },
            Err(e) => {
                tracing::trace!(pid = handle.pid(), sampler = self.name(), "sample failed: {}", e);
                Sample {
                    has_exited: true,
                    ..Sample::default()
                }
            }
        }
    }

    fn terminate(&self, handle: &mut ProcessHandle) {
        handle.kill();
    }

    async fn wait(&self, handle: &mut ProcessHandle) -> Option<i32> {
        handle.reap().await
    }
}

fn sanitize_memory(bytes: u64) -> u64 {
    if bytes > MEMORY_SANITY_CEILING { 0 } else { bytes }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("executable not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to launch {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SpawnError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => SpawnError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied(path.to_path_buf()),
            _ => SpawnError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("process {0} is gone")]
    ProcessGone(u32),
    #[error("malformed {what} for process {pid}")]
    Malformed { pid: u32, what: &'static str },
    #[cfg(windows)]
    #[error("{call} failed for process {pid}")]
    Os { pid: u32, call: &'static str },
    #[error(transparent)]
    Io(#[from] io::Error),
}
