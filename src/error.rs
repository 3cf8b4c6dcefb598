//! Failure taxonomy for an export run.
//!
//! Every failure carries a fixed exit code. Callers decide on retries and report
//! causes from the code alone, never from the message text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes, one per failure cause. `0` is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCode {
    MissingExecutable,
    MissingStudy,
    MissingAutomationExecutable,
    MissingAutomationScript,
    DestinationNotWritable,
    LaunchFailed,
    AutomationFailed,
    ExportValidationFailed,
}

impl FailureCode {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureCode::MissingExecutable => 10,
            FailureCode::MissingStudy => 11,
            FailureCode::MissingAutomationExecutable => 12,
            FailureCode::MissingAutomationScript => 13,
            FailureCode::DestinationNotWritable => 14,
            FailureCode::LaunchFailed => 15,
            FailureCode::AutomationFailed => 16,
            FailureCode::ExportValidationFailed => 17,
        }
    }
}

/// How a failure affects the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad inputs or environment. Never retried.
    Configuration,
    /// An expected window or dialog never showed up in time. Retried with a fresh process.
    AutomationTimeout,
    /// Output absent, undersized or never settled. Retried while budget remains.
    Validation,
    /// Anything else that must abort the run immediately.
    Fatal,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("application executable not found: {0}")]
    MissingExecutable(PathBuf),

    #[error("input study not found: {0}")]
    MissingStudy(PathBuf),

    #[error("automation executable not found: {0}")]
    MissingAutomationExecutable(PathBuf),

    #[error("automation script not found: {0}")]
    MissingAutomationScript(PathBuf),

    #[error("destination not writable: {path}: {source}")]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {path}: {source}")]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out in {stage}: {detail}")]
    AutomationTimeout { stage: &'static str, detail: String },

    #[error("study could not be opened after {attempts} attempts")]
    StudyOpenFailed { attempts: u32 },

    #[error("export validation failed: {0}")]
    Validation(String),

    #[error("failed to place {from} at {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub fn code(&self) -> FailureCode {
        match self {
            ExportError::MissingExecutable(_) => FailureCode::MissingExecutable,
            ExportError::MissingStudy(_) => FailureCode::MissingStudy,
            ExportError::MissingAutomationExecutable(_) => FailureCode::MissingAutomationExecutable,
            ExportError::MissingAutomationScript(_) => FailureCode::MissingAutomationScript,
            ExportError::DestinationNotWritable { .. } | ExportError::Relocate { .. } => {
                FailureCode::DestinationNotWritable
            }
            ExportError::LaunchFailed { .. } => FailureCode::LaunchFailed,
            ExportError::AutomationTimeout { .. } | ExportError::StudyOpenFailed { .. } => {
                FailureCode::AutomationFailed
            }
            ExportError::Validation(_) => FailureCode::ExportValidationFailed,
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            ExportError::MissingExecutable(_)
            | ExportError::MissingStudy(_)
            | ExportError::MissingAutomationExecutable(_)
            | ExportError::MissingAutomationScript(_)
            | ExportError::DestinationNotWritable { .. } => FailureClass::Configuration,
            ExportError::AutomationTimeout { .. } => FailureClass::AutomationTimeout,
            ExportError::Validation(_) => FailureClass::Validation,
            ExportError::LaunchFailed { .. }
            | ExportError::StudyOpenFailed { .. }
            | ExportError::Relocate { .. } => FailureClass::Fatal,
        }
    }

    /// Whether a fresh attempt (new process) may fix this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.class(),
            FailureClass::AutomationTimeout | FailureClass::Validation
        )
    }

    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let codes = [
            FailureCode::MissingExecutable,
            FailureCode::MissingStudy,
            FailureCode::MissingAutomationExecutable,
            FailureCode::MissingAutomationScript,
            FailureCode::DestinationNotWritable,
            FailureCode::LaunchFailed,
            FailureCode::AutomationFailed,
            FailureCode::ExportValidationFailed,
        ];
        let mut seen: Vec<i32> = codes.iter().map(|c| c.exit_code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
        assert!(seen.iter().all(|c| *c != 0 && *c != 1 && *c != 2));
    }

    #[test]
    fn only_timeouts_and_validation_are_recoverable() {
        let timeout = ExportError::AutomationTimeout {
            stage: "main window",
            detail: "no window".into(),
        };
        assert!(timeout.is_recoverable());
        assert!(ExportError::Validation("empty".into()).is_recoverable());
        assert!(!ExportError::MissingStudy(PathBuf::from("x.nesstar")).is_recoverable());
        assert!(!ExportError::StudyOpenFailed { attempts: 3 }.is_recoverable());
        assert_eq!(
            ExportError::StudyOpenFailed { attempts: 3 }.code(),
            FailureCode::AutomationFailed
        );
    }
}
