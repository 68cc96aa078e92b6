//! In-memory stand-ins for the external engines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

use crate::data::{ArtifactCache, FetchRequest};
use crate::engine::{BuildEngine, BuildRequest};
use crate::errors::EngineError;

#[derive(Debug, Default)]
struct EngineState {
    artifacts: Vec<String>,
    builds: Vec<BuildRequest>,
    deletes: Vec<(String, bool)>,
    list_calls: usize,
}

/// A build engine backed by an in-memory artifact namespace.
///
/// Builds insert their tag, deletions remove it. Failures, refusals and
/// slow builds can be scripted per tag.
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<EngineState>,
    failing: HashSet<String>,
    refusing: HashSet<String>,
    build_delay: Option<Duration>,
    list_error: Option<String>,
}

impl MockEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds existing artifacts, in list order.
    #[must_use]
    pub fn with_artifacts<I, S>(self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .artifacts
            .extend(artifacts.into_iter().map(Into::into));
        self
    }

    /// Makes builds of `tag` fail.
    #[must_use]
    pub fn failing_on(mut self, tag: impl Into<String>) -> Self {
        self.failing.insert(tag.into());
        self
    }

    /// Makes unforced deletions of `artifact` fail as refused.
    #[must_use]
    pub fn refusing(mut self, artifact: impl Into<String>) -> Self {
        self.refusing.insert(artifact.into());
        self
    }

    /// Delays every build.
    #[must_use]
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Makes `list` fail.
    #[must_use]
    pub fn with_list_error(mut self, reason: impl Into<String>) -> Self {
        self.list_error = Some(reason.into());
        self
    }

    /// Returns how many builds were attempted.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.state.lock().builds.len()
    }

    /// Returns every build request received, in order.
    #[must_use]
    pub fn builds(&self) -> Vec<BuildRequest> {
        self.state.lock().builds.clone()
    }

    /// Returns how many deletions were attempted.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.state.lock().deletes.len()
    }

    /// Returns how many times the artifact list was read.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Returns true if the namespace holds the artifact.
    #[must_use]
    pub fn contains(&self, artifact: &str) -> bool {
        self.state.lock().artifacts.iter().any(|a| a == artifact)
    }

    /// Returns the current namespace.
    #[must_use]
    pub fn artifacts(&self) -> Vec<String> {
        self.state.lock().artifacts.clone()
    }
}

#[async_trait]
impl BuildEngine for MockEngine {
    async fn build(&self, request: &BuildRequest) -> Result<String, EngineError> {
        self.state.lock().builds.push(request.clone());

        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&request.tag) {
            return Err(EngineError::CommandFailed {
                command: format!("build {}", request.tag),
                code: Some(1),
                stderr: format!("scripted failure for {}", request.tag),
            });
        }

        let mut state = self.state.lock();
        if !state.artifacts.contains(&request.tag) {
            state.artifacts.push(request.tag.clone());
        }
        Ok(request.tag.clone())
    }

    async fn delete(&self, artifact: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.deletes.push((artifact.to_string(), force));

        if !force && self.refusing.contains(artifact) {
            return Err(EngineError::Refused {
                artifact: artifact.to_string(),
                reason: "image is being used by a running container".to_string(),
            });
        }

        let before = state.artifacts.len();
        state.artifacts.retain(|a| a != artifact);
        if state.artifacts.len() == before {
            return Err(EngineError::CommandFailed {
                command: format!("rmi {artifact}"),
                code: Some(1),
                stderr: format!("No such image: {artifact}"),
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(reason) = &self.list_error {
            return Err(EngineError::Unavailable {
                program: "mock".to_string(),
                reason: reason.clone(),
            });
        }
        Ok(state.artifacts.clone())
    }
}

/// An artifact cache that records requests and fails scripted names.
#[derive(Debug, Default)]
pub struct MockCache {
    requests: Mutex<Vec<FetchRequest>>,
    failing: HashSet<String>,
}

impl MockCache {
    /// Creates a cache where every fetch succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes fetches of `name` fail.
    #[must_use]
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Returns the names requested so far.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.name.clone()).collect()
    }
}

#[async_trait]
impl ArtifactCache for MockCache {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), EngineError> {
        self.requests.lock().push(request.clone());
        if self.failing.contains(&request.name) {
            return Err(EngineError::CommandFailed {
                command: format!("fetch {}", request.name),
                code: Some(1),
                stderr: "download failed".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tag: &str) -> BuildRequest {
        BuildRequest {
            kind: "compile".to_string(),
            tag: tag.to_string(),
            base: None,
            source: None,
            options: Vec::new(),
            context: None,
            no_cache: false,
        }
    }

    #[tokio::test]
    async fn test_mock_engine_namespace() {
        let engine = MockEngine::new().with_artifacts(["a"]).failing_on("bad");

        assert_eq!(engine.build(&request("b")).await.unwrap(), "b");
        assert!(engine.build(&request("bad")).await.is_err());
        assert_eq!(engine.list().await.unwrap(), vec!["a", "b"]);
        assert_eq!(engine.build_count(), 2);

        engine.delete("a", false).await.unwrap();
        assert!(!engine.contains("a"));
        assert!(engine.delete("a", false).await.is_err());
        assert_eq!(engine.delete_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_engine_refusal() {
        let engine = MockEngine::new().with_artifacts(["a"]).refusing("a");
        assert!(matches!(
            engine.delete("a", false).await,
            Err(EngineError::Refused { .. })
        ));
        engine.delete("a", true).await.unwrap();
        assert!(engine.artifacts().is_empty());
    }
}
