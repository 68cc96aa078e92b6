//! The stage kind catalog.

use super::{OptionSpec, OptionValue, StageConfig, StageKind};
use crate::core::render_suffix;
use crate::errors::{ConfigError, UnknownStageKindError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Accepted values of the `build_type` option.
pub const BUILD_TYPES: [&str; 4] = ["Release", "Debug", "RelWithDebInfo", "MinSizeRel"];

/// Option defaults baked into the standard catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefaults {
    /// Default CUDA `MAJOR.MINOR` version.
    pub cuda_version: String,
    /// Default CUDA package repository.
    pub cuda_repo: String,
    /// Default CUDA architecture.
    pub arch: String,
    /// Default repository for the clone stage.
    pub repo: String,
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self {
            cuda_version: "11.4".to_string(),
            cuda_repo: "rhel8".to_string(),
            arch: "x86_64".to_string(),
            repo: "isce-framework/isce3".to_string(),
        }
    }
}

/// Maps kind names to descriptors.
///
/// Populate once at startup; lookups afterwards are read-only and may be
/// shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    kinds: BTreeMap<String, Arc<StageKind>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard eleven-kind catalog with built-in defaults.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_defaults(&StageDefaults::default())
    }

    /// Creates the standard catalog with the given option defaults.
    #[must_use]
    pub fn with_defaults(defaults: &StageDefaults) -> Self {
        let cuda_version = || {
            OptionSpec::new("cuda_version", OptionValue::Version).with_default(&defaults.cuda_version)
        };
        let env_file = || OptionSpec::new("env_file", OptionValue::Path).required();
        let build_types = BUILD_TYPES.iter().map(|s| (*s).to_string()).collect();

        let mut registry = Self::new();
        for kind in [
            StageKind::new("init").with_suffix("init"),
            StageKind::new("runtime-cuda")
                .after("init")
                .with_suffix("cuda-{cuda_version_major}-{cuda_version_minor}-runtime")
                .with_default_label("cuda-runtime")
                .with_option(cuda_version())
                .with_option(OptionSpec::new("cuda_repo", OptionValue::Text).with_default(&defaults.cuda_repo))
                .with_option(OptionSpec::new("arch", OptionValue::Text).with_default(&defaults.arch)),
            StageKind::new("runtime-env")
                .after("runtime-cuda")
                .with_suffix("mamba-runtime")
                .with_default_label("conda-runtime")
                .with_option(env_file())
                .with_context_option("env_file"),
            StageKind::new("dev-cuda")
                .after("runtime-env")
                .with_suffix("cuda-{cuda_version_major}-{cuda_version_minor}-dev")
                .with_default_label("cuda-dev")
                .with_option(cuda_version()),
            StageKind::new("dev-env")
                .after("dev-cuda")
                .with_suffix("mamba-dev")
                .with_default_label("conda-dev")
                .with_option(env_file())
                .with_context_option("env_file"),
            StageKind::new("clone")
                .after("dev-env")
                .with_suffix("git-repo")
                .with_default_label("repo")
                .with_option(OptionSpec::new("repo", OptionValue::RepoSlug).with_default(&defaults.repo))
                .with_option(OptionSpec::new("branch", OptionValue::Text)),
            StageKind::new("insert")
                .after("dev-env")
                .with_suffix("file-{path_dir}")
                .with_default_label("inserted")
                .with_option(OptionSpec::new("path", OptionValue::Path).required())
                .with_context_option("path"),
            StageKind::new("configure")
                .after("clone")
                .after("insert")
                .with_suffix("configured")
                .with_default_label("configured")
                .with_option(OptionSpec::new("build_type", OptionValue::Choice(build_types)).required())
                .with_option(OptionSpec::new("no_cuda", OptionValue::Flag)),
            StageKind::new("compile")
                .after("configure")
                .with_suffix("built")
                .with_default_label("compiled"),
            StageKind::new("install")
                .after("compile")
                .with_suffix("installed")
                .with_default_label("installed"),
            StageKind::new("distributable")
                .after("runtime-env")
                .with_secondary("install")
                .with_default_label("isce3")
                .unmanaged()
                .uncached(),
        ] {
            registry.register(kind);
        }
        registry
    }

    /// Adds or replaces a kind.
    pub fn register(&mut self, kind: StageKind) -> &mut Self {
        debug!(kind = %kind.name, "Registering stage kind");
        self.kinds.insert(kind.name.clone(), Arc::new(kind));
        self
    }

    /// Looks up a kind by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageKindError` if no kind has that name.
    pub fn lookup(&self, name: &str) -> Result<Arc<StageKind>, UnknownStageKindError> {
        self.kinds
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownStageKindError::new(name))
    }

    /// Returns all registered kind names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Renders the kind's suffix template against a resolved payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSuffix` if the template needs a parameter the payload
    /// does not provide.
    pub fn default_suffix(&self, kind: &StageKind, config: &StageConfig) -> Result<Option<String>, ConfigError> {
        kind.suffix
            .as_deref()
            .map(|template| render_suffix(template, &config.suffix_params(kind)))
            .transpose()
    }

    /// Applies option defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unrecognized options, missing required
    /// options or values outside an option's accepted shape.
    pub fn resolve(&self, kind: &StageKind, config: &StageConfig) -> Result<StageConfig, ConfigError> {
        let mut resolved = config.clone();
        for spec in &kind.options {
            if let (false, Some(default)) = (resolved.contains(&spec.name), &spec.default) {
                resolved.insert(spec.name.clone(), default.clone());
            }
        }
        self.validate(kind, &resolved)?;
        Ok(resolved)
    }

    /// Checks a payload against the kind's recognized options.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first violation.
    pub fn validate(&self, kind: &StageKind, config: &StageConfig) -> Result<(), ConfigError> {
        if let Some((name, _)) = config.iter().find(|(name, _)| kind.option(name).is_none()) {
            return Err(ConfigError::unrecognized_option(&kind.name, name));
        }

        for spec in &kind.options {
            match config.get(&spec.name) {
                None if spec.required => {
                    return Err(ConfigError::missing_option(&kind.name, &spec.name));
                }
                None => {}
                Some(value) if !accepts(&spec.value, value) => {
                    return Err(ConfigError::invalid_option(
                        &kind.name,
                        &spec.name,
                        value,
                        spec.value.to_string(),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

fn accepts(shape: &OptionValue, value: &str) -> bool {
    let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let is_slug_part = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    match shape {
        OptionValue::Text | OptionValue::Path => !value.trim().is_empty(),
        OptionValue::Choice(choices) => choices.iter().any(|c| c == value),
        OptionValue::Version => value
            .split_once('.')
            .is_some_and(|(major, minor)| is_number(major) && is_number(minor)),
        OptionValue::RepoSlug => value
            .split_once('/')
            .is_some_and(|(user, repo)| is_slug_part(user) && is_slug_part(repo)),
        OptionValue::Flag => matches!(value, "true" | "false"),
    }
}
