//! Pipeline composition: single stages and macro-pipelines.
//!
//! All validation happens here, before anything reaches the build engine.

use super::{BaseRefs, PipelineSpec, StageInvocation};
use crate::core::{Tag, TagPrefix};
use crate::errors::{BaseRole, ConfigError, MissingBaseError, WigwamError};
use crate::stages::{StageConfig, StageKind, StageRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Kinds the setup-all macro expands to, in order.
pub const SETUP_ALL_KINDS: [&str; 5] = ["init", "runtime-cuda", "runtime-env", "dev-cuda", "dev-env"];

/// A request to build one stage on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingleStage {
    /// The stage kind name.
    pub kind: String,
    /// Label for the produced tag; the kind's default label when absent.
    pub label: Option<String>,
    /// The primary base reference.
    pub base: Option<String>,
    /// The secondary base reference, for kinds that copy from one.
    pub secondary: Option<String>,
    /// Option payload.
    pub config: StageConfig,
    /// Bypass the engine's layer cache.
    pub no_cache: bool,
}

impl SingleStage {
    /// Creates a request for the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the primary base.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the secondary base.
    #[must_use]
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    /// Sets the option payload.
    #[must_use]
    pub fn with_config(mut self, config: StageConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets whether the layer cache is bypassed.
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// The setup-all macro: init through dev environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupAll {
    /// Pipeline-wide label.
    pub label: String,
    /// External image the init stage builds on.
    pub base_image: Option<String>,
    /// CUDA `MAJOR.MINOR` version; registry default when absent.
    pub cuda_version: Option<String>,
    /// CUDA package repository; registry default when absent.
    pub cuda_repo: Option<String>,
    /// Environment spec for the runtime environment layer.
    pub runtime_env_file: String,
    /// Environment spec for the dev environment layer.
    pub dev_env_file: String,
    /// Bypass the engine's layer cache.
    pub no_cache: bool,
}

impl Default for SetupAll {
    fn default() -> Self {
        Self {
            label: "setup".to_string(),
            base_image: None,
            cuda_version: None,
            cuda_repo: None,
            runtime_env_file: "env_files/lock-runtime.txt".to_string(),
            dev_env_file: "env_files/lock-dev.txt".to_string(),
            no_cache: false,
        }
    }
}

impl SetupAll {
    /// Sets the pipeline-wide label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the external base image.
    #[must_use]
    pub fn with_base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = Some(image.into());
        self
    }

    /// Sets the CUDA version.
    #[must_use]
    pub fn with_cuda_version(mut self, version: impl Into<String>) -> Self {
        self.cuda_version = Some(version.into());
        self
    }
}

/// Where the full-compile macro obtains the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum RepoSource {
    /// Clone a GitHub repository.
    Clone {
        /// `USER/REPO`; registry default when absent.
        repo: Option<String>,
        /// Branch to check out.
        branch: Option<String>,
    },
    /// Copy a local path.
    Insert {
        /// The path to copy.
        path: String,
    },
}

impl Default for RepoSource {
    fn default() -> Self {
        Self::Clone {
            repo: None,
            branch: None,
        }
    }
}

/// The full-compile macro: acquire sources, configure, compile, install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullCompile {
    /// Pipeline-wide label.
    pub label: String,
    /// Base reference; `<setup label>-mamba-dev` when absent.
    pub base: Option<String>,
    /// Source acquisition.
    pub source: RepoSource,
    /// CMake build type.
    pub build_type: Option<String>,
    /// Configure without CUDA.
    pub no_cuda: bool,
    /// Bypass the engine's layer cache.
    pub no_cache: bool,
}

impl Default for FullCompile {
    fn default() -> Self {
        Self {
            label: "build".to_string(),
            base: None,
            source: RepoSource::default(),
            build_type: None,
            no_cuda: false,
            no_cache: false,
        }
    }
}

impl FullCompile {
    /// Sets the source acquisition.
    #[must_use]
    pub fn with_source(mut self, source: RepoSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the build type.
    #[must_use]
    pub fn with_build_type(mut self, build_type: impl Into<String>) -> Self {
        self.build_type = Some(build_type.into());
        self
    }

    /// Sets the base reference.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }
}

/// The distributable macro: runtime image plus the installed tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distributable {
    /// Complete (unprefixed) tag of the produced image.
    pub tag: Option<String>,
    /// Runtime base; `<setup label>-mamba-runtime` when absent.
    pub base: Option<String>,
    /// Installed artifact to copy from; `<build label>-installed` when absent.
    pub source: Option<String>,
}

/// A named, fixed composition of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "macro")]
pub enum MacroCommand {
    /// init → runtime-cuda → runtime-env → dev-cuda → dev-env.
    SetupAll(SetupAll),
    /// clone|insert → configure → compile → install.
    FullCompile(FullCompile),
    /// The two-base distributable stage.
    Distributable(Distributable),
}

impl MacroCommand {
    /// Returns the macro name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetupAll(_) => "setup-all",
            Self::FullCompile(_) => "full-compile",
            Self::Distributable(_) => "distributable",
        }
    }
}

/// Expands requests into validated pipeline specifications.
#[derive(Debug, Clone)]
pub struct PipelineComposer {
    registry: Arc<StageRegistry>,
    prefix: TagPrefix,
    setup_label: String,
    build_label: String,
    distrib_label: String,
}

impl PipelineComposer {
    /// Creates a composer over the given registry and prefix.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>, prefix: TagPrefix) -> Self {
        Self {
            registry,
            prefix,
            setup_label: "setup".to_string(),
            build_label: "build".to_string(),
            distrib_label: "isce3".to_string(),
        }
    }

    /// Sets the setup label used to derive default bases.
    #[must_use]
    pub fn with_setup_label(mut self, label: impl Into<String>) -> Self {
        self.setup_label = label.into();
        self
    }

    /// Sets the build label used to derive the default copy source.
    #[must_use]
    pub fn with_build_label(mut self, label: impl Into<String>) -> Self {
        self.build_label = label.into();
        self
    }

    /// Sets the default distributable tag.
    #[must_use]
    pub fn with_distrib_label(mut self, label: impl Into<String>) -> Self {
        self.distrib_label = label.into();
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the tag prefix.
    #[must_use]
    pub fn prefix(&self) -> &TagPrefix {
        &self.prefix
    }

    /// Wraps one stage request into a one-element pipeline.
    ///
    /// # Errors
    ///
    /// Fails with `UnknownStageKind`, `ConfigError` or `MissingBase` before any
    /// build is attempted.
    pub fn single(&self, request: &SingleStage) -> Result<PipelineSpec, WigwamError> {
        let kind = self.registry.lookup(&request.kind)?;
        let config = self.registry.resolve(&kind, &request.config)?;
        let label = request.label.as_deref().unwrap_or(&kind.default_label);

        let tag = if kind.system_managed {
            Tag::derive(&self.prefix, label, None, &config.suffix_params(&kind))?
        } else if self.prefix.marks(label) {
            return Err(ConfigError::InvalidLabel {
                label: label.to_string(),
                reason: format!("'{}' artifacts carry the '{}-' prefix", kind.name, self.prefix),
            }
            .into());
        } else {
            Tag::unprefixed(label)?
        };

        let primary = match &request.base {
            Some(base) => Some(self.base_ref(&kind, base)?),
            None => None,
        };
        let bases = self.require_bases(&kind, &tag, primary, request.secondary.as_deref())?;

        let invocation = StageInvocation::new(kind, tag, bases, config).with_no_cache(request.no_cache);
        Ok(PipelineSpec::new(request.kind.clone(), vec![invocation])?)
    }

    /// Expands a macro into its fixed sub-stage chain.
    ///
    /// # Errors
    ///
    /// Fails before any build if an option is invalid or a base cannot be
    /// resolved.
    pub fn compose(&self, command: &MacroCommand) -> Result<PipelineSpec, WigwamError> {
        let spec = match command {
            MacroCommand::SetupAll(request) => self.setup_all(request),
            MacroCommand::FullCompile(request) => self.full_compile(request),
            MacroCommand::Distributable(request) => self.distributable(request),
        }?;

        debug!(
            pipeline = %spec.name,
            stages = spec.len(),
            final_tag = ?spec.final_tag().map(Tag::render),
            "Composed pipeline"
        );
        Ok(spec)
    }

    fn setup_all(&self, request: &SetupAll) -> Result<PipelineSpec, WigwamError> {
        let cuda = StageConfig::new()
            .with_opt("cuda_version", request.cuda_version.clone())
            .with_opt("cuda_repo", request.cuda_repo.clone());
        let dev_cuda = StageConfig::new().with_opt("cuda_version", request.cuda_version.clone());

        let configs = [
            StageConfig::new(),
            cuda,
            StageConfig::new().with("env_file", &request.runtime_env_file),
            dev_cuda,
            StageConfig::new().with("env_file", &request.dev_env_file),
        ];
        let steps = SETUP_ALL_KINDS.into_iter().zip(configs).collect();

        self.chain(
            "setup-all",
            &request.label,
            request.base_image.as_deref(),
            steps,
            request.no_cache,
        )
    }

    fn full_compile(&self, request: &FullCompile) -> Result<PipelineSpec, WigwamError> {
        let acquire = match &request.source {
            RepoSource::Clone { repo, branch } => (
                "clone",
                StageConfig::new()
                    .with_opt("repo", repo.clone())
                    .with_opt("branch", branch.clone()),
            ),
            RepoSource::Insert { path } => ("insert", StageConfig::new().with("path", path)),
        };

        let configure = StageConfig::new()
            .with_opt("build_type", request.build_type.clone())
            .with_flag("no_cuda", request.no_cuda);

        let base = request
            .base
            .clone()
            .unwrap_or_else(|| format!("{}-mamba-dev", self.setup_label));

        self.chain(
            "full-compile",
            &request.label,
            Some(&base),
            vec![
                acquire,
                ("configure", configure),
                ("compile", StageConfig::new()),
                ("install", StageConfig::new()),
            ],
            request.no_cache,
        )
    }

    fn distributable(&self, request: &Distributable) -> Result<PipelineSpec, WigwamError> {
        let base = request
            .base
            .clone()
            .unwrap_or_else(|| format!("{}-mamba-runtime", self.setup_label));
        let source = request
            .source
            .clone()
            .unwrap_or_else(|| format!("{}-installed", self.build_label));

        self.single(&SingleStage {
            kind: "distributable".to_string(),
            label: Some(request.tag.clone().unwrap_or_else(|| self.distrib_label.clone())),
            base: Some(base),
            secondary: Some(source),
            config: StageConfig::new(),
            no_cache: true,
        })
    }

    /// Builds a linear chain, threading each produced tag into the next base.
    fn chain(
        &self,
        name: &str,
        label: &str,
        first_base: Option<&str>,
        steps: Vec<(&str, StageConfig)>,
        no_cache: bool,
    ) -> Result<PipelineSpec, WigwamError> {
        let mut invocations: Vec<StageInvocation> = Vec::with_capacity(steps.len());

        for (kind_name, config) in steps {
            let kind = self.registry.lookup(kind_name)?;
            let config = self.registry.resolve(&kind, &config)?;
            let tag = Tag::derive(&self.prefix, label, kind.suffix.as_deref(), &config.suffix_params(&kind))?;

            let primary = match invocations.last() {
                Some(previous) => Some(previous.tag.clone()),
                None => first_base.map(|base| self.base_ref(&kind, base)).transpose()?,
            };
            let bases = self.require_bases(&kind, &tag, primary, None)?;

            invocations.push(StageInvocation::new(kind, tag, bases, config).with_no_cache(no_cache));
        }

        Ok(PipelineSpec::new(name, invocations)?)
    }

    /// Root stages build on external images; everything else on system artifacts.
    fn base_ref(&self, kind: &StageKind, reference: &str) -> Result<Tag, ConfigError> {
        if kind.is_root() {
            Tag::external(reference)
        } else {
            Tag::reference(&self.prefix, reference)
        }
    }

    fn require_bases(
        &self,
        kind: &StageKind,
        tag: &Tag,
        primary: Option<Tag>,
        secondary: Option<&str>,
    ) -> Result<BaseRefs, WigwamError> {
        let Some(primary) = primary else {
            return Err(MissingBaseError::new(&kind.name, tag.render(), BaseRole::Primary).into());
        };
        let mut bases = BaseRefs::primary(primary);

        if kind.secondary.is_some() {
            let Some(secondary) = secondary else {
                return Err(MissingBaseError::new(&kind.name, tag.render(), BaseRole::Secondary).into());
            };
            bases = bases.with_secondary(Tag::reference(&self.prefix, secondary)?);
        } else if let Some(secondary) = secondary {
            return Err(ConfigError::conflicting(format!(
                "stage '{}' does not take a secondary base, got '{secondary}'",
                kind.name
            ))
            .into());
        }

        Ok(bases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn composer() -> PipelineComposer {
        PipelineComposer::new(Arc::new(StageRegistry::standard()), TagPrefix::default())
    }

    fn rendered(spec: &PipelineSpec) -> Vec<String> {
        spec.tags().into_iter().map(Tag::render).collect()
    }

    #[test]
    fn test_setup_all_expansion() {
        let request = SetupAll::default().with_base_image("oraclelinux:8.4");
        let spec = composer().compose(&MacroCommand::SetupAll(request)).unwrap();

        assert_eq!(spec.len(), 5);
        assert_eq!(
            rendered(&spec),
            vec![
                "wigwam-setup-init",
                "wigwam-setup-cuda-11-4-runtime",
                "wigwam-setup-mamba-runtime",
                "wigwam-setup-cuda-11-4-dev",
                "wigwam-setup-mamba-dev",
            ]
        );

        let invocations = spec.invocations();
        assert_eq!(
            invocations[0].bases.primary.as_ref().map(Tag::render).as_deref(),
            Some("oraclelinux:8.4")
        );
        for pair in invocations.windows(2) {
            assert_eq!(pair[1].bases.primary.as_ref(), Some(&pair[0].tag));
        }
        assert_eq!(spec.final_tag().and_then(Tag::suffix), Some("mamba-dev"));
    }

    #[test]
    fn test_setup_all_without_base_image() {
        let err = composer()
            .compose(&MacroCommand::SetupAll(SetupAll::default()))
            .unwrap_err();
        match err {
            WigwamError::MissingBase(e) => {
                assert_eq!(e.stage, "init");
                assert_eq!(e.role, BaseRole::Primary);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_setup_all_invalid_cuda_version() {
        let request = SetupAll::default()
            .with_base_image("oraclelinux:8.4")
            .with_cuda_version("eleven");
        let err = composer().compose(&MacroCommand::SetupAll(request)).unwrap_err();
        assert!(matches!(err, WigwamError::Config(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn test_full_compile_clone() {
        let request = FullCompile::default().with_build_type("Release");
        let spec = composer().compose(&MacroCommand::FullCompile(request)).unwrap();

        assert_eq!(
            rendered(&spec),
            vec![
                "wigwam-build-git-repo",
                "wigwam-build-configured",
                "wigwam-build-built",
                "wigwam-build-installed",
            ]
        );
        assert_eq!(
            spec.invocations()[0].bases.primary.as_ref().map(Tag::render).as_deref(),
            Some("wigwam-setup-mamba-dev")
        );
        assert_eq!(spec.invocations()[0].config.get("repo"), Some("isce-framework/isce3"));
    }

    #[test]
    fn test_full_compile_insert() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("isce3-src");
        std::fs::create_dir(&src).unwrap();

        let request = FullCompile::default()
            .with_build_type("Debug")
            .with_source(RepoSource::Insert {
                path: src.to_string_lossy().into_owned(),
            });
        let spec = composer().compose(&MacroCommand::FullCompile(request)).unwrap();

        assert_eq!(spec.invocations()[0].kind_name(), "insert");
        assert_eq!(spec.invocations()[0].tag.render(), "wigwam-build-file-isce3-src");
    }

    #[test]
    fn test_full_compile_requires_build_type() {
        let err = composer()
            .compose(&MacroCommand::FullCompile(FullCompile::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            WigwamError::Config(ConfigError::MissingOption { ref option, .. }) if option == "build_type"
        ));
    }

    #[test]
    fn test_full_compile_bad_repo() {
        let request = FullCompile::default()
            .with_build_type("Release")
            .with_source(RepoSource::Clone {
                repo: Some("not a repo".to_string()),
                branch: None,
            });
        assert!(composer().compose(&MacroCommand::FullCompile(request)).is_err());
    }

    #[test]
    fn test_distributable_two_bases() {
        let spec = composer()
            .compose(&MacroCommand::Distributable(Distributable::default()))
            .unwrap();

        let invocation = &spec.invocations()[0];
        assert_eq!(invocation.tag.render(), "isce3");
        assert!(!invocation.tag.is_system_managed());
        assert_eq!(
            invocation.bases.primary.as_ref().map(Tag::render).as_deref(),
            Some("wigwam-setup-mamba-runtime")
        );
        assert_eq!(
            invocation.bases.secondary.as_ref().map(Tag::render).as_deref(),
            Some("wigwam-build-installed")
        );
        assert!(invocation.no_cache);
    }

    #[test]
    fn test_distributable_rejects_prefixed_tag() {
        let request = Distributable {
            tag: Some("wigwam-foo".to_string()),
            ..Distributable::default()
        };
        let err = composer().compose(&MacroCommand::Distributable(request)).unwrap_err();
        assert!(matches!(
            err,
            WigwamError::Config(ConfigError::InvalidLabel { ref label, .. }) if label == "wigwam-foo"
        ));

        let request = Distributable {
            tag: Some("wigwamish".to_string()),
            ..Distributable::default()
        };
        assert!(composer().compose(&MacroCommand::Distributable(request)).is_ok());
    }

    #[test]
    fn test_single_stage() {
        let request = SingleStage::new("configure")
            .with_base("build-git-repo")
            .with_config(StageConfig::new().with("build_type", "Release"));
        let spec = composer().single(&request).unwrap();

        assert_eq!(spec.len(), 1);
        assert_eq!(spec.invocations()[0].tag.render(), "wigwam-configured");
        assert_eq!(
            spec.invocations()[0].bases.primary.as_ref().map(Tag::render).as_deref(),
            Some("wigwam-build-git-repo")
        );
    }

    #[test]
    fn test_single_stage_missing_base() {
        let err = composer().single(&SingleStage::new("compile")).unwrap_err();
        assert!(matches!(err, WigwamError::MissingBase(_)));
    }

    #[test]
    fn test_single_stage_distributable_needs_secondary() {
        let request = SingleStage::new("distributable").with_base("setup-mamba-runtime");
        let err = composer().single(&request).unwrap_err();
        assert!(matches!(err, WigwamError::MissingBase(ref e) if e.role == BaseRole::Secondary));
    }

    #[test]
    fn test_single_stage_unknown_kind() {
        let err = composer().single(&SingleStage::new("package")).unwrap_err();
        assert!(matches!(err, WigwamError::UnknownStageKind(_)));
    }

    #[test]
    fn test_single_stage_rejects_unneeded_secondary() {
        let request = SingleStage::new("compile")
            .with_base("build-configured")
            .with_secondary("build-installed");
        assert!(matches!(
            composer().single(&request).unwrap_err(),
            WigwamError::Config(ConfigError::ConflictingOptions { .. })
        ));
    }

    #[test]
    fn test_recomposition_is_deterministic() {
        let request = SingleStage::new("init").with_base("oraclelinux:8.4").with_label("setup-init");
        let first = composer().single(&request).unwrap();
        let second = composer().single(&request).unwrap();
        assert_eq!(first.invocations()[0].fingerprint(), second.invocations()[0].fingerprint());
        assert_eq!(rendered(&first), rendered(&second));
    }
}
