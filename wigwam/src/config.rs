//! Process-wide configuration.
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! file, then `WIGWAM_*` environment variables.

use crate::core::{TagPrefix, DEFAULT_PREFIX};
use crate::errors::{ConfigError, DataError, WigwamError};
use crate::stages::StageDefaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`WigwamConfig::prefix`].
pub const ENV_PREFIX: &str = "WIGWAM_PREFIX";
/// Environment variable overriding [`WigwamConfig::docker`].
pub const ENV_DOCKER: &str = "WIGWAM_DOCKER";
/// Environment variable overriding [`WigwamConfig::dockerfile_dir`].
pub const ENV_DOCKERFILE_DIR: &str = "WIGWAM_DOCKERFILE_DIR";

/// Configuration for the CLI and the engines it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WigwamConfig {
    /// System tag prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Container engine executable.
    #[serde(default = "default_docker")]
    pub docker: String,
    /// Directory holding `<kind>.Dockerfile` templates.
    #[serde(default = "default_dockerfile_dir")]
    pub dockerfile_dir: PathBuf,
    /// OS image the init stage builds on.
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Default CUDA `MAJOR.MINOR` version.
    #[serde(default = "default_cuda_version")]
    pub cuda_version: String,
    /// Default CUDA package repository.
    #[serde(default = "default_cuda_repo")]
    pub cuda_repo: String,
    /// Environment spec for the runtime environment layer.
    #[serde(default = "default_runtime_env_file")]
    pub runtime_env_file: String,
    /// Environment spec for the dev environment layer.
    #[serde(default = "default_dev_env_file")]
    pub dev_env_file: String,
    /// Default repository for the clone stage.
    #[serde(default = "default_repo")]
    pub repo: String,
    /// Default setup-all label.
    #[serde(default = "default_setup_label")]
    pub setup_label: String,
    /// Default full-compile label.
    #[serde(default = "default_build_label")]
    pub build_label: String,
    /// Default distributable tag.
    #[serde(default = "default_distrib_label")]
    pub distrib_label: String,
    /// Data record catalog.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Workflow test catalog.
    #[serde(default = "default_test_file")]
    pub test_file: PathBuf,
    /// Download target and fallback input cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Image running the download tool.
    #[serde(default = "default_rover_image")]
    pub rover_image: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_docker() -> String {
    "docker".to_string()
}

fn default_dockerfile_dir() -> PathBuf {
    PathBuf::from("dockerfiles")
}

fn default_base_image() -> String {
    "oraclelinux:8.4".to_string()
}

fn default_cuda_version() -> String {
    "11.4".to_string()
}

fn default_cuda_repo() -> String {
    "rhel8".to_string()
}

fn default_runtime_env_file() -> String {
    "env_files/lock-runtime.txt".to_string()
}

fn default_dev_env_file() -> String {
    "env_files/lock-dev.txt".to_string()
}

fn default_repo() -> String {
    "isce-framework/isce3".to_string()
}

fn default_setup_label() -> String {
    "setup".to_string()
}

fn default_build_label() -> String {
    "build".to_string()
}

fn default_distrib_label() -> String {
    "isce3".to_string()
}

fn default_data_file() -> PathBuf {
    PathBuf::from("workflowdata.json")
}

fn default_test_file() -> PathBuf {
    PathBuf::from("workflowtests.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(crate::data::DEFAULT_CACHE_DIR)
}

fn default_rover_image() -> String {
    "rover".to_string()
}

impl Default for WigwamConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            docker: default_docker(),
            dockerfile_dir: default_dockerfile_dir(),
            base_image: default_base_image(),
            cuda_version: default_cuda_version(),
            cuda_repo: default_cuda_repo(),
            runtime_env_file: default_runtime_env_file(),
            dev_env_file: default_dev_env_file(),
            repo: default_repo(),
            setup_label: default_setup_label(),
            build_label: default_build_label(),
            distrib_label: default_distrib_label(),
            data_file: default_data_file(),
            test_file: default_test_file(),
            cache_dir: default_cache_dir(),
            rover_image: default_rover_image(),
        }
    }
}

impl WigwamConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, WigwamError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        config.with_env(&env)
    }

    /// Reads a JSON configuration file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, WigwamError> {
        let content = std::fs::read_to_string(path).map_err(|e| DataError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DataError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Applies `WIGWAM_*` overrides from `env` and validates the result.
    pub fn with_env(mut self, env: &HashMap<String, String>) -> Result<Self, WigwamError> {
        if let Some(prefix) = env.get(ENV_PREFIX) {
            self.prefix.clone_from(prefix);
        }
        if let Some(docker) = env.get(ENV_DOCKER) {
            self.docker.clone_from(docker);
        }
        if let Some(dir) = env.get(ENV_DOCKERFILE_DIR) {
            self.dockerfile_dir = PathBuf::from(dir);
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks values that would otherwise fail late.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tag_prefix()?;
        if self.docker.trim().is_empty() {
            return Err(ConfigError::conflicting("the engine executable cannot be empty"));
        }
        Ok(())
    }

    /// Returns the validated tag prefix.
    pub fn tag_prefix(&self) -> Result<TagPrefix, ConfigError> {
        TagPrefix::new(self.prefix.clone())
    }

    /// Returns the option defaults for the standard stage catalog.
    #[must_use]
    pub fn stage_defaults(&self) -> StageDefaults {
        StageDefaults {
            cuda_version: self.cuda_version.clone(),
            cuda_repo: self.cuda_repo.clone(),
            repo: self.repo.clone(),
            ..StageDefaults::default()
        }
    }
}
