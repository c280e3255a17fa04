use std::path::Path;
use std::time::Duration;

use crate::core::traits::checker::{Checker, CheckerError, Verdict};

/// Returns the same verdict for every comparison, optionally after a delay.
#[derive(Debug, Clone)]
pub struct CheckerStub {
    verdict: Verdict,
    delay: Duration,
}

impl CheckerStub {
    pub fn new(verdict: Verdict, delay: Duration) -> Self {
        Self { verdict, delay }
    }
}

impl Checker for CheckerStub {
    fn check(
        &self,
        input: &Path,
        output: &Path,
        reference: &Path,
    ) -> Result<Verdict, CheckerError> {
        tracing::debug!(
            "Check: input={:?}, output={:?}, reference={:?}",
            input,
            output,
            reference
        );
        std::thread::sleep(self.delay);
        Ok(self.verdict)
    }
}
