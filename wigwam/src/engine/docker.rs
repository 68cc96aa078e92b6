//! Docker CLI adapter.

use super::{BuildEngine, BuildRequest};
use crate::errors::EngineError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of build stderr kept for the failure reason.
const STDERR_TAIL: usize = 20;

/// Drives the `docker` command-line client.
///
/// Each stage kind maps to `<dockerfile_dir>/<kind>.Dockerfile`; the
/// templates themselves are maintained outside this crate.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    program: String,
    dockerfile_dir: PathBuf,
}

impl DockerEngine {
    /// Creates an adapter for the given executable and template directory.
    #[must_use]
    pub fn new(program: impl Into<String>, dockerfile_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dockerfile_dir: dockerfile_dir.into(),
        }
    }

    /// Returns the template used for a stage kind.
    #[must_use]
    pub fn dockerfile_for(&self, kind: &str) -> PathBuf {
        self.dockerfile_dir.join(format!("{kind}.Dockerfile"))
    }

    /// Assembles the `docker build` argument list for a request.
    #[must_use]
    pub fn build_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            self.dockerfile_for(&request.kind).to_string_lossy().into_owned(),
            "-t".to_string(),
            request.tag.clone(),
        ];

        let mut build_arg = |name: &str, value: &str| {
            args.push("--build-arg".to_string());
            args.push(format!("{name}={value}"));
        };
        if let Some(base) = &request.base {
            build_arg("BASE", base);
        }
        if let Some(source) = &request.source {
            build_arg("SOURCE", source);
        }
        for (option, value) in &request.options {
            build_arg(&option.to_uppercase(), value);
        }

        if request.no_cache {
            args.push("--no-cache".to_string());
        }

        let context = request.context.as_deref().unwrap_or(self.dockerfile_dir.as_path());
        args.push(context.to_string_lossy().into_owned());
        args
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn unavailable(&self, err: &std::io::Error) -> EngineError {
        EngineError::Unavailable {
            program: self.program.clone(),
            reason: err.to_string(),
        }
    }

    async fn captured(&self, args: &[String]) -> Result<String, EngineError> {
        debug!(command = %self.command_line(args), "Running engine command");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(&e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(EngineError::CommandFailed {
                command: self.command_line(args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Logs each engine stderr line and returns the last `STDERR_TAIL` of them.
async fn log_stderr<R>(tag: &str, stderr: R) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(tag = %tag, "{line}");
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new("docker", Path::new("dockerfiles"))
    }
}

#[async_trait]
impl BuildEngine for DockerEngine {
    async fn build(&self, request: &BuildRequest) -> Result<String, EngineError> {
        let args = self.build_args(request);
        info!(tag = %request.tag, command = %self.command_line(&args), "Building image");

        // Build progress streams to the terminal; stderr goes through the
        // log and its tail is kept so a failure can say why.
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(&e))?;

        let tail = match child.stderr.take() {
            Some(stderr) => log_stderr(&request.tag, stderr).await,
            None => VecDeque::new(),
        };

        let status = child.wait().await.map_err(|e| self.unavailable(&e))?;
        if status.success() {
            Ok(request.tag.clone())
        } else {
            Err(EngineError::CommandFailed {
                command: self.command_line(&args),
                code: status.code(),
                stderr: Vec::from(tail).join("\n"),
            })
        }
    }

    async fn delete(&self, artifact: &str, force: bool) -> Result<(), EngineError> {
        let mut args = vec!["rmi".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(artifact.to_string());

        match self.captured(&args).await {
            Ok(_) => Ok(()),
            Err(EngineError::CommandFailed { stderr, .. }) if stderr.contains("conflict") => {
                Err(EngineError::Refused {
                    artifact: artifact.to_string(),
                    reason: stderr,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let args = ["images", "--format", "{{.Repository}}:{{.Tag}}"].map(String::from);
        let stdout = self.captured(&args).await?;
        Ok(parse_image_list(&stdout))
    }
}

/// Normalizes `repository:tag` lines, dropping dangling images.
fn parse_image_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("<none>"))
        .map(|line| line.strip_suffix(":latest").unwrap_or(line).to_string())
        .collect()
}
