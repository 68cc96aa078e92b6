//! Pattern-based bulk removal of artifacts.

use crate::core::{CompiledPattern, RemovalPattern, TagPrefix};
use crate::engine::BuildEngine;
use crate::errors::{DeletionFailure, WigwamError};
use crate::events::{Event, EventSink, EventType, NoOpEventSink};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one removal batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    /// Every artifact that matched at least one pattern, in engine order.
    pub matched: Vec<String>,
    /// Artifacts the engine deleted.
    pub removed: Vec<String>,
    /// Artifacts the engine refused or failed to delete.
    pub failures: Vec<DeletionFailure>,
    /// Patterns that matched nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_patterns: Vec<String>,
}

impl RemovalReport {
    /// Returns true if every matched artifact was deleted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deletes system-managed artifacts selected by glob patterns.
///
/// The engine's artifact list is read fresh for every call. An artifact is
/// selected if it matches any pattern. Deletions run concurrently and a
/// failed deletion never stops the others.
#[derive(Clone)]
pub struct RemovalEngine {
    engine: Arc<dyn BuildEngine>,
    prefix: TagPrefix,
    sink: Arc<dyn EventSink>,
}

impl RemovalEngine {
    /// Creates a removal engine for the given prefix.
    #[must_use]
    pub fn new(engine: Arc<dyn BuildEngine>, prefix: TagPrefix) -> Self {
        Self {
            engine,
            prefix,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    fn compile(&self, patterns: &[RemovalPattern]) -> Result<Vec<CompiledPattern>, WigwamError> {
        Ok(patterns
            .iter()
            .map(|p| p.compile(&self.prefix))
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns every system-managed artifact matching any pattern.
    ///
    /// With no patterns, every artifact carrying the prefix is returned.
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid pattern, or an engine error if
    /// the artifact list cannot be read.
    pub async fn list_managed(&self, patterns: &[RemovalPattern]) -> Result<Vec<String>, WigwamError> {
        let compiled = if patterns.is_empty() {
            self.compile(&[RemovalPattern::new("*")])?
        } else {
            self.compile(patterns)?
        };
        Ok(self
            .engine
            .list()
            .await?
            .into_iter()
            .filter(|artifact| compiled.iter().any(|p| p.is_match(artifact)))
            .collect())
    }

    /// Removes every artifact matching any of `patterns`.
    ///
    /// `force` is passed to the engine to override refusals such as an
    /// artifact being in use. It does not widen what the patterns select.
    ///
    /// # Errors
    ///
    /// Fails before deleting anything if a pattern is invalid or the engine
    /// cannot list its artifacts. Per-artifact failures are reported in the
    /// [`RemovalReport`] instead.
    pub async fn remove(&self, patterns: &[RemovalPattern], force: bool) -> Result<RemovalReport, WigwamError> {
        let compiled = self.compile(patterns)?;
        let existing = self.engine.list().await?;

        let mut report = RemovalReport::default();
        let mut used = vec![false; compiled.len()];
        for artifact in existing {
            let mut hit = false;
            for (i, pattern) in compiled.iter().enumerate() {
                if pattern.is_match(&artifact) {
                    used[i] = true;
                    hit = true;
                }
            }
            if hit {
                report.matched.push(artifact);
            }
        }
        report.unmatched_patterns = compiled
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(p, _)| p.glob().to_string())
            .collect();

        if report.matched.is_empty() {
            info!(patterns = ?report.unmatched_patterns, "No artifacts matched");
            return Ok(report);
        }
        debug!(count = report.matched.len(), force, "Removing artifacts");

        let outcomes = join_all(report.matched.iter().map(|artifact| async move {
            (artifact.clone(), self.engine.delete(artifact, force).await)
        }))
        .await;

        for (artifact, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    info!(artifact = %artifact, "Removed");
                    self.sink
                        .emit(Event::new(EventType::ArtifactRemoved).with_data(json!({ "artifact": artifact })))
                        .await;
                    report.removed.push(artifact);
                }
                Err(e) => {
                    warn!(artifact = %artifact, error = %e, "Removal failed");
                    let failure = DeletionFailure::new(artifact, e.to_string());
                    self.sink
                        .emit(Event::new(EventType::ArtifactRemovalFailed).with_data(json!({
                            "artifact": failure.artifact,
                            "reason": failure.reason,
                        })))
                        .await;
                    report.failures.push(failure);
                }
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for RemovalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalEngine")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
