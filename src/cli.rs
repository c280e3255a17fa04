use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::checkers::cmp::CmpChecker;
use crate::checkers::diff::DiffChecker;
use crate::constants::{DEFAULT_MEMORY_LIMIT, GIB, MIB};
use crate::core::domain::{BatchConfig, ExecutionBudget, IoMode};
use crate::core::traits::checker::Checker;
use crate::samplers::SamplerChoice;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grades an executable against its test data", long_about = None)]
pub struct Cli {
    /// Path to the executable under test
    pub executable: PathBuf,
    /// Directory searched recursively for test data
    #[arg(short = 'D', long, value_name = "DIR", default_value = ".")]
    pub test_data_dir: PathBuf,
    /// Memory limit, e.g. 256M or 0.25G
    #[arg(short, long, value_name = "MEM", value_parser = parse_memory_limit)]
    pub memory_limit: Option<u64>,
    /// CPU time limit in seconds
    #[arg(short, long, value_name = "SECONDS", value_parser = parse_time_limit)]
    pub time_limit: Option<f64>,
    /// Consider only example filename patterns for test data
    #[arg(short = 'x', long)]
    pub examples_only: bool,
    /// Task name used to search for test data (default: inferred from the
    /// executable name and the current directory)
    #[arg(long)]
    pub task: Option<String>,
    /// Number of test cases run in parallel (default: physical cores)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub threads: Option<u64>,
    /// USACO-style I/O through files named TASK.in and TASK.out
    #[arg(long)]
    pub usaco: bool,
    /// Output informational messages
    #[arg(long)]
    pub verbose: bool,
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
    /// Count presentation errors as failures in the exit code
    #[arg(long)]
    pub strict_presentation: bool,
    #[arg(long, value_enum, default_value_t = SamplerChoice::Auto)]
    pub sampler: SamplerChoice,
    #[arg(long, value_enum, default_value_t = CheckerChoice::Diff)]
    pub checker: CheckerChoice,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    #[value(alias = "none")]
    Never,
}

impl ColorChoice {
    pub fn enabled(self, is_terminal: bool) -> bool {
        match self {
            ColorChoice::Auto => is_terminal,
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CheckerChoice {
    /// Compare in-process
    #[default]
    Diff,
    /// Use the external cmp tool for exact comparison
    Cmp,
}

impl CheckerChoice {
    pub fn build(self) -> Arc<dyn Checker> {
        match self {
            CheckerChoice::Diff => Arc::new(DiffChecker),
            CheckerChoice::Cmp => Arc::new(CmpChecker::default()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid memory limit '{0}', expected a number followed by M or G")]
    InvalidMemoryLimit(String),
    #[error("invalid time limit '{0}', expected a non-negative number of seconds")]
    InvalidTimeLimit(String),
}

impl Cli {
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            executable: self.executable.clone(),
            io_mode: if self.usaco {
                IoMode::File
            } else {
                IoMode::Stream
            },
            budget: ExecutionBudget {
                time_limit_seconds: self.time_limit.unwrap_or(f64::INFINITY),
                memory_limit_bytes: self.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT),
                parallelism: self
                    .threads
                    .map_or_else(default_parallelism, |threads| threads as usize),
            },
            presentation_error_is_failure: self.strict_presentation,
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "info" } else { "warn" }
    }
}

/// Accepts `256M`, `0.25G`, `512mb` and the like.
pub fn parse_memory_limit(value: &str) -> Result<u64, CliError> {
    let invalid = || CliError::InvalidMemoryLimit(value.to_string());
    let lower = value.trim().to_ascii_lowercase();
    let number = lower.strip_suffix('b').unwrap_or(&lower);
    let (number, unit) = if let Some(number) = number.strip_suffix('g') {
        (number, GIB)
    } else if let Some(number) = number.strip_suffix('m') {
        (number, MIB)
    } else {
        return Err(invalid());
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }
    let number: f64 = number.parse().map_err(|_| invalid())?;
    Ok((number * unit as f64) as u64)
}

pub fn parse_time_limit(value: &str) -> Result<f64, CliError> {
    match value.trim().parse::<f64>() {
        Ok(seconds) if seconds >= 0.0 && !seconds.is_nan() => Ok(seconds),
        _ => Err(CliError::InvalidTimeLimit(value.to_string())),
    }
}

/// Physical cores, falling back to the logical count.
pub fn default_parallelism() -> usize {
    #[cfg(feature = "portable")]
    if let Some(cores) = sysinfo::System::physical_core_count() {
        return cores.max(1);
    }
    std::thread::available_parallelism().map_or(1, |n| n.get())
}
