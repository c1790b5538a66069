//! Audible confirmation of accepted scans
//!
//! Feedback is best effort. The session logs and ignores failures.

use crate::error::Result;
use std::io::Write;

/// Something that signals a successful scan to the user
pub trait Feedback: Send + Sync {
    /// Play the confirmation
    fn confirm(&self) -> Result<()>;
}

/// No feedback at all
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Feedback for Silent {
    fn confirm(&self) -> Result<()> {
        Ok(())
    }
}

/// Rings the terminal bell on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl Feedback for TerminalBell {
    fn confirm(&self) -> Result<()> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}
