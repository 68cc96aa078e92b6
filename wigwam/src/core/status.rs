//! Stage outcome status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome status of one stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced its artifact.
    Built,
    /// Stage failed to build.
    Failed,
    /// Stage was interrupted by cancellation.
    Cancelled,
    /// Stage was not attempted because an earlier stage failed.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built => write!(f, "built"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the stage left an artifact behind.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Built)
    }
}
