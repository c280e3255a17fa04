//! Usage samplers that talk to the operating system's own process
//! accounting instead of going through the portable probe.
#[cfg(target_os = "linux")]
pub mod procfs;
#[cfg(windows)]
pub mod win32;
