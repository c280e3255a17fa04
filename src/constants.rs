use std::time::Duration;

/// Delay between two usage samples of a supervised process.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often the scoreboard redraws a pending row on a terminal.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(100);

/// Memory readings above this are distrusted and reported as zero.
/// Address-sanitized binaries reserve terabytes of virtual memory.
pub const MEMORY_SANITY_CEILING: u64 = 1 << 40;

pub const DEFAULT_MEMORY_LIMIT: u64 = 1 << 30;

#[cfg(unix)]
pub const SIGINT: i32 = nix::sys::signal::Signal::SIGINT as i32;
#[cfg(not(unix))]
pub const SIGINT: i32 = 2;

/// Exit code of a batch cancelled from the keyboard.
pub const INTERRUPTED_EXIT_CODE: i32 = 128 + SIGINT;

pub const STATUS_COLUMN_WIDTH: usize = 13;

pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
