use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::checkers::diff::loosely_equal;
use crate::core::traits::checker::{Checker, CheckerError, Verdict};

/// Delegates the exact comparison to the external `cmp` tool, which avoids
/// loading large outputs into memory when they match.
#[derive(Debug, Clone)]
pub struct CmpChecker {
    program: PathBuf,
}

impl CmpChecker {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().into(),
        }
    }
}

impl Default for CmpChecker {
    fn default() -> Self {
        Self::new("cmp")
    }
}

impl Checker for CmpChecker {
    fn check(
        &self,
        _input: &Path,
        output: &Path,
        reference: &Path,
    ) -> Result<Verdict, CheckerError> {
        let status = Command::new(&self.program)
            .arg("-s")
            .arg(output)
            .arg(reference)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    CheckerError::ToolUnavailable(self.program.display().to_string())
                }
                _ => CheckerError::Io(e),
            })?;

        match status.code() {
            Some(0) => Ok(Verdict::Correct),
            // 1 means the files differ; anything else is trouble reading them
            Some(1) => Ok(loosely_equal(&fs::read(output)?, &fs::read(reference)?)),
            _ => Err(CheckerError::Io(io::Error::other(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )))),
        }
    }
}
