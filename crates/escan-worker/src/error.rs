//! Typed errors for the partition runner.

use escan_core::ScanError;
use thiserror::Error;

/// Errors reported for a unit (or a whole run) by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The unit's last attempt failed.
    #[error("partition {partition_index} failed after {attempts} attempt(s): {source}")]
    UnitFailed {
        partition_index: usize,
        attempts: usize,
        #[source]
        source: ScanError,
    },

    /// The task executing the unit panicked or was cancelled.
    #[error("partition {partition_index} task aborted: {reason}")]
    TaskAborted {
        partition_index: usize,
        reason: String,
    },

    /// Units cannot be assigned without at least one node.
    #[error("no execution nodes available")]
    NoNodes,
}

impl RunnerError {
    /// The scan error behind a failed unit, if any.
    pub fn scan_error(&self) -> Option<&ScanError> {
        match self {
            RunnerError::UnitFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
