//! Outcome of best-effort restoration
//!
//! Release and close keep going when a secondary step fails. The failures are
//! collected here instead of being dropped so callers and tests can see them.

use protocol::UsbError;
use std::fmt;

/// Which restoration step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupStep {
    /// Releasing a claimed interface
    Release,
    /// Handing an interface back to its kernel driver
    Reattach,
}

/// A secondary failure during cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupWarning {
    pub interface: u8,
    pub step: CleanupStep,
    pub error: UsbError,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self.step {
            CleanupStep::Release => "release",
            CleanupStep::Reattach => "reattach kernel driver to",
        };
        write!(f, "failed to {} interface {}: {}", step, self.interface, self.error)
    }
}

/// Secondary warnings collected while restoring a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[CleanupWarning] {
        &self.warnings
    }

    pub(crate) fn push(&mut self, interface: u8, step: CleanupStep, error: UsbError) {
        self.warnings.push(CleanupWarning {
            interface,
            step,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_warnings() {
        let mut report = CleanupReport::default();
        assert!(report.is_clean());

        report.push(2, CleanupStep::Reattach, UsbError::Busy);
        assert!(!report.is_clean());
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(
            report.warnings()[0].to_string(),
            "failed to reattach kernel driver to interface 2: busy"
        );
    }
}
