//! The boundary to the external container build engine.
//!
//! This module provides:
//! - The [`BuildEngine`] trait (build, delete, list)
//! - [`BuildRequest`], the engine-facing view of a stage invocation
//! - [`DockerEngine`], the production adapter
//! - [`BuildExecutor`], which adds base pre-flight checks and cancellation

mod docker;
mod executor;

pub use docker::DockerEngine;
pub use executor::BuildExecutor;

use crate::errors::EngineError;
use crate::pipeline::StageInvocation;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Everything the engine needs to produce one artifact.
///
/// The option payload is passed through untouched; the engine decides what
/// each option means for its build templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    /// Stage kind name; selects the build template.
    pub kind: String,
    /// Tag to produce.
    pub tag: String,
    /// Primary base artifact.
    pub base: Option<String>,
    /// Secondary artifact to copy from.
    pub source: Option<String>,
    /// Option payload, in name order.
    pub options: Vec<(String, String)>,
    /// Build context directory, when the kind derives one from its options.
    pub context: Option<PathBuf>,
    /// Bypass the layer cache.
    pub no_cache: bool,
}

impl From<&StageInvocation> for BuildRequest {
    fn from(invocation: &StageInvocation) -> Self {
        Self {
            kind: invocation.kind.name.clone(),
            tag: invocation.tag.render(),
            base: invocation.bases.primary.as_ref().map(ToString::to_string),
            source: invocation.bases.secondary.as_ref().map(ToString::to_string),
            options: invocation
                .config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            context: invocation.config.context_dir(&invocation.kind),
            no_cache: invocation.no_cache,
        }
    }
}

/// An engine that builds, deletes and lists tagged artifacts.
///
/// Implementations must treat base artifacts as read-only and create or
/// overwrite only the artifact named by the request's tag.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Builds one artifact and returns the produced reference.
    async fn build(&self, request: &BuildRequest) -> Result<String, EngineError>;

    /// Deletes one artifact. `force` overrides engine-level refusals.
    async fn delete(&self, artifact: &str, force: bool) -> Result<(), EngineError>;

    /// Lists every artifact reference the engine currently holds.
    async fn list(&self) -> Result<Vec<String>, EngineError>;
}
