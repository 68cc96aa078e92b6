//! Sequential pipeline execution with failure containment.

use super::{PipelineSpec, RunReport, RunState, StageResult};
use crate::cancellation::CancellationToken;
use crate::engine::BuildExecutor;
use crate::events::{Event, EventSink, EventType, LoggingEventSink};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives a [`PipelineSpec`] through a [`BuildExecutor`].
///
/// Invocations run strictly one after another: each needs the previous
/// stage's artifact as its base. The first failure halts the run. Artifacts
/// built before the failure are left in place so a later run can resume from
/// the last good stage.
#[derive(Clone)]
pub struct RunController {
    executor: BuildExecutor,
    sink: Arc<dyn EventSink>,
}

impl RunController {
    /// Creates a controller that logs events through `tracing`.
    #[must_use]
    pub fn new(executor: BuildExecutor) -> Self {
        Self {
            executor,
            sink: Arc::new(LoggingEventSink),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs every invocation in order and reports per-stage outcomes.
    ///
    /// Stages are reported by one-based position. Base pre-flight checks run
    /// for the first invocation (later bases were just built by this run) and
    /// for any invocation with a secondary base. Cancellation is treated as a
    /// failure at the current position.
    pub async fn run(&self, spec: &PipelineSpec, token: &CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let mut state = RunState::Pending;
        let mut results: Vec<StageResult> = Vec::with_capacity(spec.len());

        info!(run_id = %run_id, pipeline = %spec.name, stages = spec.len(), "Starting pipeline");
        self.emit(
            run_id,
            EventType::PipelineStarted,
            json!({
                "pipeline": spec.name,
                "stages": spec.len(),
                "tags": spec.tags().iter().map(|t| t.render()).collect::<Vec<_>>(),
            }),
        )
        .await;

        for (position, invocation) in (1..).zip(spec.invocations()) {
            if let RunState::Failed(_) = state {
                results.push(StageResult::skipped(position, invocation));
                continue;
            }

            state = transition(state, RunState::Running(position));
            self.emit(
                run_id,
                EventType::StageStarted,
                json!({
                    "stage": invocation.kind_name(),
                    "position": position,
                    "tag": invocation.tag.render(),
                    "base": invocation.bases.primary.as_ref().map(ToString::to_string),
                    "source": invocation.bases.secondary.as_ref().map(ToString::to_string),
                }),
            )
            .await;

            let started_at = Utc::now();
            match self.executor.execute(invocation, position == 1, token).await {
                Ok(tag) => {
                    let result = StageResult::built(position, invocation, started_at);
                    info!(stage = %invocation.kind_name(), position, tag = %tag, "Stage built");
                    self.emit(
                        run_id,
                        EventType::StageCompleted,
                        json!({
                            "stage": invocation.kind_name(),
                            "position": position,
                            "tag": tag.render(),
                            "duration_ms": result.duration_ms(),
                        }),
                    )
                    .await;
                    results.push(result);
                }
                Err(failure) => {
                    let result = StageResult::failed(position, invocation, started_at, failure);
                    if let Some(failure) = &result.failure {
                        warn!(stage = %failure.stage, position, tag = %failure.tag, kind = %failure.kind, "{failure}");
                        self.emit(
                            run_id,
                            EventType::StageFailed,
                            json!({
                                "stage": failure.stage,
                                "position": position,
                                "tag": failure.tag,
                                "kind": failure.kind,
                                "reason": failure.reason,
                            }),
                        )
                        .await;
                    }
                    results.push(result);
                    state = transition(state, RunState::Failed(position));
                }
            }
        }

        if !matches!(state, RunState::Failed(_)) {
            state = transition(state, RunState::Completed);
        }

        let report = RunReport {
            run_id,
            pipeline: spec.name.clone(),
            state,
            results,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        match report.state {
            RunState::Completed => {
                self.emit(
                    run_id,
                    EventType::PipelineCompleted,
                    json!({
                        "pipeline": report.pipeline,
                        "final_tag": report.final_tag(),
                        "duration_ms": report.duration_ms,
                    }),
                )
                .await;
            }
            _ => {
                self.emit(
                    run_id,
                    EventType::PipelineFailed,
                    json!({
                        "pipeline": report.pipeline,
                        "state": report.state,
                        "built": report.built_tags(),
                        "failure": report.failure(),
                    }),
                )
                .await;
            }
        }

        report
    }

    async fn emit(&self, run_id: Uuid, event_type: EventType, data: serde_json::Value) {
        self.sink
            .emit(Event::new(event_type).with_run_id(run_id).with_data(data))
            .await;
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    debug!(from = %from, to = %to, "Run state transition");
    to
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
