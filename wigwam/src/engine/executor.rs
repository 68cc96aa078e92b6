//! Cancellable execution of single stage invocations.

use super::{BuildEngine, BuildRequest};
use crate::cancellation::CancellationToken;
use crate::core::Tag;
use crate::errors::BuildFailure;
use crate::pipeline::StageInvocation;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs one invocation against a [`BuildEngine`].
///
/// Adds two behaviours on top of the raw engine call: an optional pre-flight
/// check that system-managed bases exist, and propagation of cancellation to
/// the in-flight build.
#[derive(Clone)]
pub struct BuildExecutor {
    engine: Arc<dyn BuildEngine>,
}

impl BuildExecutor {
    /// Creates an executor over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self { engine }
    }

    /// Returns the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn BuildEngine> {
        &self.engine
    }

    /// Verifies that every system-managed base of the invocation exists.
    ///
    /// External bases (such as the init stage's OS image) are left to the
    /// engine to pull.
    ///
    /// # Errors
    ///
    /// Returns a `MissingBase` failure naming the first absent base, or an
    /// engine failure if the artifact list could not be read.
    pub async fn preflight(&self, invocation: &StageInvocation) -> Result<(), BuildFailure> {
        let managed: Vec<&Tag> = invocation.bases.iter().filter(|t| t.is_system_managed()).collect();
        if managed.is_empty() {
            return Ok(());
        }

        let existing: HashSet<String> = self
            .engine
            .list()
            .await
            .map_err(|e| BuildFailure::engine(invocation.kind_name(), invocation.tag.render(), e.to_string()))?
            .into_iter()
            .collect();

        for base in managed {
            let base = base.render();
            if !existing.contains(&base) {
                return Err(BuildFailure::missing_base(invocation.kind_name(), invocation.tag.render(), &base));
            }
        }
        Ok(())
    }

    /// Builds one invocation.
    ///
    /// When `check_bases` is set, or the invocation carries a secondary base,
    /// [`preflight`](Self::preflight) runs first. Cancellation observed before
    /// or during the build yields a `Cancelled` failure; the in-flight engine
    /// future is dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildFailure`] describing why the artifact was not produced.
    pub async fn execute(
        &self,
        invocation: &StageInvocation,
        check_bases: bool,
        token: &CancellationToken,
    ) -> Result<Tag, BuildFailure> {
        let stage = invocation.kind_name();
        let tag = invocation.tag.render();
        let cancelled = || {
            BuildFailure::cancelled(
                stage,
                &tag,
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            )
        };

        if token.is_cancelled() {
            return Err(cancelled());
        }

        if check_bases || invocation.bases.secondary.is_some() {
            self.preflight(invocation).await?;
        }

        let request = BuildRequest::from(invocation);
        debug!(stage = %stage, tag = %tag, fingerprint = %invocation.fingerprint(), "Dispatching build");

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => return Err(cancelled()),
            outcome = self.engine.build(&request) => outcome,
        };

        match outcome {
            Ok(produced) => {
                if produced != tag {
                    warn!(expected = %tag, produced = %produced, "Engine reported a different reference");
                }
                Ok(invocation.tag.clone())
            }
            Err(e) => Err(BuildFailure::engine(stage, &tag, e.to_string())),
        }
    }
}

impl std::fmt::Debug for BuildExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildExecutor").finish_non_exhaustive()
    }
}
