//! Typed errors for planning and executing scans.

use thiserror::Error;

use crate::model::SliceDescriptor;

/// Errors surfaced by the planner, the generated units and the search engine
/// implementations behind them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The search engine could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The target index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// Credentials were rejected by the engine.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A scroll context expired, a cursor was invalid, or a batch could not
    /// be read while draining a slice.
    #[error("scroll failed{}: {reason}", describe_slice(.slice))]
    Scroll {
        slice: Option<SliceDescriptor>,
        reason: String,
    },

    /// The scan parameters were rejected before any request was made.
    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    /// The engine answered with a body that does not match its protocol.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other non-success answer from the engine.
    #[error("search engine error ({status}): {reason}")]
    Engine { status: u16, reason: String },
}

fn describe_slice(slice: &Option<SliceDescriptor>) -> String {
    match slice {
        Some(slice) => format!(" on {}", slice),
        None => String::new(),
    }
}

impl ScanError {
    /// A scroll failure not yet attributed to a slice.
    pub fn scroll(reason: impl Into<String>) -> Self {
        ScanError::Scroll {
            slice: None,
            reason: reason.into(),
        }
    }

    /// Convert a failure that happened while draining `slice` into a
    /// [`ScanError::Scroll`]. Authentication failures pass through unchanged.
    pub fn into_scroll(self, slice: SliceDescriptor) -> Self {
        match self {
            ScanError::Authentication(_) => self,
            ScanError::Scroll { reason, .. } => ScanError::Scroll {
                slice: Some(slice),
                reason,
            },
            other => ScanError::Scroll {
                slice: Some(slice),
                reason: other.to_string(),
            },
        }
    }

    /// Returns `true` for [`ScanError::Scroll`].
    pub fn is_scroll(&self) -> bool {
        matches!(self, ScanError::Scroll { .. })
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::MalformedResponse(e.to_string())
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
