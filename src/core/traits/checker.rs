use std::io;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    PresentationError,
    WrongAnswer,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("comparison tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Compares the produced output of one run with the reference output.
/// Files may hold arbitrary bytes.
#[mockall::automock]
pub trait Checker: std::fmt::Debug + Send + Sync {
    fn check(&self, input: &Path, output: &Path, reference: &Path)
    -> Result<Verdict, CheckerError>;
}
