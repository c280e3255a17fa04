use std::io::{self, Write};

use crate::constants::{MIB, STATUS_COLUMN_WIDTH};
use crate::core::domain::{RunResult, RunStatus, TestCase};
use crate::core::pipeline::run::RunState;

#[derive(Clone, Copy)]
enum Color {
    Green,
    Yellow,
    Red,
    Cyan,
    Magenta,
}

impl Color {
    fn code(self) -> &'static str {
        match self {
            Color::Green => "32",
            Color::Yellow => "33",
            Color::Red => "31",
            Color::Cyan => "36",
            Color::Magenta => "35",
        }
    }
}

/// Renders one row per run. Only the ordered consumer writes to it.
///
/// In live mode a pending row is redrawn in place with `\r` until it is
/// committed; otherwise only committed rows are printed.
pub struct Scoreboard<W: Write> {
    out: W,
    live: bool,
    color: bool,
    name_width: usize,
}

impl<W: Write> Scoreboard<W> {
    /// The name column is sized from the whole batch up front, so rows
    /// line up before any run has started.
    pub fn new(out: W, cases: &[TestCase], live: bool, color: bool) -> Self {
        let name_width = cases
            .iter()
            .map(|case| case.input_file.chars().count())
            .max()
            .unwrap_or(0);
        Self {
            out,
            live,
            color,
            name_width,
        }
    }

    pub fn update(&mut self, case: &TestCase, state: &RunState) -> io::Result<()> {
        if !self.live {
            return Ok(());
        }
        let row = self.row(case, state);
        write!(self.out, "\r{}", row)?;
        self.out.flush()
    }

    pub fn commit(&mut self, case: &TestCase, state: &RunState) -> io::Result<()> {
        let row = self.row(case, state);
        if self.live {
            write!(self.out, "\r")?;
        }
        writeln!(self.out, "{}", row)?;
        if let Some(diagnostic) = &state.diagnostic {
            writeln!(self.out, "    {}", diagnostic)?;
        }
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn row(&self, case: &TestCase, state: &RunState) -> String {
        let (text, color) = status_text(state.status);
        let status = format!("{:<width$}", text, width = STATUS_COLUMN_WIDTH);
        let status = match color {
            Some(color) if self.color => format!("\x1b[{}m{}\x1b[0m", color.code(), status),
            _ => status,
        };
        let memory = match state.metrics.peak_memory_bytes / MIB {
            0 => " ".repeat(5),
            mib => format!("{:4}M", mib),
        };
        format!(
            "{:<width$} | {} | {:5.2} | {}",
            case.input_file,
            status,
            state.metrics.cpu_seconds,
            memory,
            width = self.name_width
        )
    }
}

fn status_text(status: RunStatus) -> (&'static str, Option<Color>) {
    match status {
        RunStatus::Waiting => ("Waiting", None),
        RunStatus::Running => ("Running", None),
        RunStatus::Checking => ("Checking", None),
        RunStatus::Done(RunResult::Passed) => ("Passed", Some(Color::Green)),
        RunStatus::Done(RunResult::PresentationError) => ("Passed (PE)", Some(Color::Yellow)),
        RunStatus::Done(RunResult::WrongAnswer) => ("Wrong answer", Some(Color::Red)),
        RunStatus::Done(RunResult::TimeLimit) => ("Time limit", Some(Color::Cyan)),
        RunStatus::Done(RunResult::MemoryLimit) => ("Memory limit", Some(Color::Cyan)),
        RunStatus::Done(RunResult::RuntimeError) => ("Runtime error", Some(Color::Magenta)),
    }
}
