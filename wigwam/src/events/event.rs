//! Typed events emitted by pipeline runs and removals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Every event the crate emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A pipeline run began.
    #[serde(rename = "pipeline.started")]
    PipelineStarted,
    /// Every stage of a pipeline built.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// A pipeline halted at a failing stage.
    #[serde(rename = "pipeline.failed")]
    PipelineFailed,
    /// A stage was handed to the engine.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage produced its artifact.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage did not produce its artifact.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// An artifact was deleted.
    #[serde(rename = "artifact.removed")]
    ArtifactRemoved,
    /// The engine refused or failed to delete an artifact.
    #[serde(rename = "artifact.removal_failed")]
    ArtifactRemovalFailed,
}

impl EventType {
    /// Returns the dotted event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineFailed => "pipeline.failed",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::ArtifactRemoved => "artifact.removed",
            Self::ArtifactRemovalFailed => "artifact.removal_failed",
        }
    }

    /// Returns true for failure events.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::PipelineFailed | Self::StageFailed | Self::ArtifactRemovalFailed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub event_type: EventType,
    /// The run the event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Structured payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            run_id: None,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attaches the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::StageFailed.to_string(), "stage.failed");
        assert_eq!(
            serde_json::to_string(&EventType::ArtifactRemovalFailed).unwrap(),
            r#""artifact.removal_failed""#
        );
        assert!(EventType::PipelineFailed.is_failure());
        assert!(!EventType::StageCompleted.is_failure());
    }

    #[test]
    fn test_event_builder() {
        let run_id = Uuid::new_v4();
        let event = Event::new(EventType::StageStarted)
            .with_run_id(run_id)
            .with_data(serde_json::json!({"stage": "init"}));

        assert_eq!(event.run_id, Some(run_id));
        assert_eq!(event.data["stage"], "init");
    }
}
