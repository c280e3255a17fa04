use std::fs;
use std::path::Path;

use crate::core::traits::checker::{Checker, CheckerError, Verdict};

/// In-process comparison: exact bytes first, then modulo trailing
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct DiffChecker;

impl Checker for DiffChecker {
    fn check(
        &self,
        _input: &Path,
        output: &Path,
        reference: &Path,
    ) -> Result<Verdict, CheckerError> {
        let output = fs::read(output)?;
        let reference = fs::read(reference)?;
        Ok(compare(&output, &reference))
    }
}

pub fn compare(output: &[u8], reference: &[u8]) -> Verdict {
    if output == reference {
        Verdict::Correct
    } else {
        loosely_equal(output, reference)
    }
}

/// Only meaningful once exact equality is ruled out.
pub fn loosely_equal(output: &[u8], reference: &[u8]) -> Verdict {
    if trimmed_lines(output) == trimmed_lines(reference) {
        Verdict::PresentationError
    } else {
        Verdict::WrongAnswer
    }
}

fn trimmed_lines(text: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = text.split(|b| *b == b'\n').map(trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

fn trim_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r'))
        .map_or(0, |i| i + 1);
    &line[..end]
}
