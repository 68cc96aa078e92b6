//! Downloading data records into a local cache.

use super::{DataCatalog, DataQuery, DataRecord, WorkflowTest};
use crate::errors::{EngineError, WigwamError};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One repository to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Repository name; also the subdirectory created in the cache.
    pub name: String,
    /// Download location.
    pub url: String,
    /// File name to expected hash.
    pub files: BTreeMap<String, String>,
    /// Host cache directory.
    pub target_dir: PathBuf,
    /// Re-download even if the cache already holds the files.
    #[serde(default)]
    pub no_cache: bool,
}

impl FetchRequest {
    /// Creates a request for one catalog record.
    #[must_use]
    pub fn for_record(record: &DataRecord, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            files: record.files.clone(),
            target_dir: target_dir.into(),
            no_cache: false,
        }
    }

    /// Sets whether the cache is bypassed.
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// A repository that could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Failed to fetch '{name}': {reason}")]
pub struct FetchFailure {
    /// Repository name.
    pub name: String,
    /// Reason forwarded from the cache tool.
    pub reason: String,
}

/// Outcome of a batch of fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Repositories now present in the cache.
    pub fetched: Vec<String>,
    /// Repositories that failed.
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    /// Returns true if every request succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The external tool that downloads repositories into a cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Downloads one repository.
    async fn fetch(&self, request: &FetchRequest) -> Result<(), EngineError>;
}

/// Builds one request per distinct repository named by the query or needed
/// by the given tests, in first-seen order.
///
/// # Errors
///
/// Returns a config error for an invalid query, or a data error if a test
/// input has no catalog record.
pub fn plan_fetch(
    catalog: &DataCatalog,
    query: &DataQuery,
    tests: &[&WorkflowTest],
    target_dir: impl Into<PathBuf>,
    no_cache: bool,
) -> Result<Vec<FetchRequest>, WigwamError> {
    let target_dir = target_dir.into();
    let mut names: Vec<&str> = catalog.names(query)?;
    for test in tests {
        for repo in test.inputs.repositories() {
            if !names.contains(&repo) {
                names.push(repo);
            }
        }
    }

    names
        .into_iter()
        .map(|name| -> Result<FetchRequest, WigwamError> {
            let record = catalog.get(name)?;
            Ok(FetchRequest::for_record(record, target_dir.clone()).with_no_cache(no_cache))
        })
        .collect()
}

/// Runs every request concurrently and collects the outcomes.
pub async fn fetch_all(cache: &dyn ArtifactCache, requests: &[FetchRequest]) -> FetchReport {
    let outcomes = join_all(requests.iter().map(|request| async move {
        (request.name.clone(), cache.fetch(request).await)
    }))
    .await;

    let mut report = FetchReport::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                info!(repository = %name, "Fetched");
                report.fetched.push(name);
            }
            Err(e) => {
                warn!(repository = %name, error = %e, "Fetch failed");
                report.failures.push(FetchFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Runs the Rover download tool in a container, with the cache bind-mounted.
#[derive(Debug, Clone)]
pub struct RoverCache {
    program: String,
    image: String,
    mount_point: String,
}

impl Default for RoverCache {
    fn default() -> Self {
        Self::new("docker", "rover")
    }
}

impl RoverCache {
    /// Creates a cache driver for the given engine executable and image.
    #[must_use]
    pub fn new(program: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            image: image.into(),
            mount_point: "/mnt/cache".to_string(),
        }
    }

    /// Sets where the cache is mounted inside the container.
    #[must_use]
    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }

    /// Assembles the `docker run` argument list for a request.
    #[must_use]
    pub fn run_args(&self, request: &FetchRequest) -> Vec<String> {
        let host = if request.target_dir.is_absolute() {
            request.target_dir.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&request.target_dir))
                .unwrap_or_else(|_| request.target_dir.clone())
        };
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}:rw", host.display(), self.mount_point),
            "-w".to_string(),
            self.mount_point.clone(),
            self.image.clone(),
            "python".to_string(),
            "-m".to_string(),
            "rover".to_string(),
            "fetch".to_string(),
            "--repo".to_string(),
            request.name.clone(),
            "--url".to_string(),
            request.url.clone(),
        ];
        if request.no_cache {
            args.push("--no-cache".to_string());
        }
        if !request.files.is_empty() {
            args.push("-f".to_string());
            args.extend(request.files.iter().map(|(file, hash)| format!("{file}:{hash}")));
        }
        args
    }
}

#[async_trait]
impl ArtifactCache for RoverCache {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), EngineError> {
        let args = self.run_args(request);
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "Running fetch");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Unavailable {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
