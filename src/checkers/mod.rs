//! Output comparison.
pub mod cmp;
pub mod diff;

use std::fs;
use std::io;
use std::path::Path;

use crate::core::traits::checker::Verdict;

/// Last-resort comparison used when a checker cannot do its job.
pub fn byte_equality(output: &Path, reference: &Path) -> io::Result<Verdict> {
    Ok(if fs::read(output)? == fs::read(reference)? {
        Verdict::Correct
    } else {
        Verdict::WrongAnswer
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_equality() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"8\n")?;
        fs::write(&b, b"8\n")?;
        fs::write(&c, b"8 \n")?;

        assert_eq!(byte_equality(&a, &b)?, Verdict::Correct);
        assert_eq!(byte_equality(&a, &c)?, Verdict::WrongAnswer);
        assert!(byte_equality(&a, &dir.path().join("missing")).is_err());
        Ok(())
    }
}
