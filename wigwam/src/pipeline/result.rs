//! Per-stage outcomes and run reports.

use super::StageInvocation;
use crate::core::StageStatus;
use crate::errors::{BuildFailure, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Progress of one pipeline run.
///
/// `Pending -> Running(n) -> Completed | Failed(n)`, where `n` is the
/// one-based position of the current invocation: the first stage is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "position")]
pub enum RunState {
    /// Nothing has been attempted.
    Pending,
    /// The invocation at this position is building.
    Running(usize),
    /// Every invocation built.
    Completed,
    /// The invocation at this position failed; later ones were not attempted.
    Failed(usize),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(n) => write!(f, "running({n})"),
            Self::Completed => write!(f, "completed"),
            Self::Failed(n) => write!(f, "failed({n})"),
        }
    }
}

/// Outcome of attempting one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// One-based position in the pipeline.
    pub position: usize,
    /// Stage kind name.
    pub stage: String,
    /// Rendered tag of the artifact.
    pub tag: String,
    /// Outcome status.
    pub status: StageStatus,
    /// When the build started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the build ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the artifact was not produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<BuildFailure>,
}

impl StageResult {
    /// Creates a result for a stage that produced its artifact.
    #[must_use]
    pub fn built(position: usize, invocation: &StageInvocation, started_at: DateTime<Utc>) -> Self {
        Self {
            position,
            stage: invocation.kind_name().to_string(),
            tag: invocation.tag.render(),
            status: StageStatus::Built,
            started_at: Some(started_at),
            ended_at: Some(Utc::now()),
            failure: None,
        }
    }

    /// Creates a result for a stage that failed or was cancelled.
    #[must_use]
    pub fn failed(
        position: usize,
        invocation: &StageInvocation,
        started_at: DateTime<Utc>,
        failure: BuildFailure,
    ) -> Self {
        let status = match failure.kind {
            FailureKind::Cancelled => StageStatus::Cancelled,
            _ => StageStatus::Failed,
        };
        Self {
            position,
            stage: invocation.kind_name().to_string(),
            tag: invocation.tag.render(),
            status,
            started_at: Some(started_at),
            ended_at: Some(Utc::now()),
            failure: Some(failure.at_position(position)),
        }
    }

    /// Creates a result for a stage that was never attempted.
    #[must_use]
    pub fn skipped(position: usize, invocation: &StageInvocation) -> Self {
        Self {
            position,
            stage: invocation.kind_name().to_string(),
            tag: invocation.tag.render(),
            status: StageStatus::Skipped,
            started_at: None,
            ended_at: None,
            failure: None,
        }
    }

    /// Returns the build duration in milliseconds, if the stage ran.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_ms(&self) -> Option<f64> {
        Some((self.ended_at? - self.started_at?).num_milliseconds() as f64)
    }

    /// Returns true if the stage produced its artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Final state.
    pub state: RunState,
    /// One result per invocation, in pipeline order.
    pub results: Vec<StageResult>,
    /// Wall-clock duration of the run.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if every stage built.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Returns the tag produced by the last stage, on success.
    #[must_use]
    pub fn final_tag(&self) -> Option<&str> {
        if self.is_success() {
            self.results.last().map(|r| r.tag.as_str())
        } else {
            None
        }
    }

    /// Returns every tag that was built, in order.
    #[must_use]
    pub fn built_tags(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.tag.as_str())
            .collect()
    }

    /// Returns the failure that halted the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&BuildFailure> {
        self.results.iter().find_map(|r| r.failure.as_ref())
    }
}
