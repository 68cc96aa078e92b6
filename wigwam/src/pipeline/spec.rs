//! Stage invocations and pipeline specifications.

use crate::core::Tag;
use crate::errors::{ErrorInfo, PipelineValidationError};
use crate::stages::{StageConfig, StageKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// The upstream artifacts a stage reads from.
///
/// Most stages have only a primary base. The distributable stage also copies
/// from a secondary artifact, carried here explicitly rather than inferred
/// from chain position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaseRefs {
    /// The image the stage builds on top of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<Tag>,
    /// An additional artifact the stage copies from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Tag>,
}

impl BaseRefs {
    /// Creates refs with only a primary base.
    #[must_use]
    pub fn primary(tag: Tag) -> Self {
        Self {
            primary: Some(tag),
            secondary: None,
        }
    }

    /// Adds a secondary base.
    #[must_use]
    pub fn with_secondary(mut self, tag: Tag) -> Self {
        self.secondary = Some(tag);
        self
    }

    /// Iterates over the bases that are present.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.primary.iter().chain(self.secondary.iter())
    }
}

/// One concrete request to build one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct StageInvocation {
    /// The stage kind.
    pub kind: Arc<StageKind>,
    /// The tag to produce.
    pub tag: Tag,
    /// Upstream artifacts.
    pub bases: BaseRefs,
    /// Opaque build payload.
    pub config: StageConfig,
    /// Bypass the engine's layer cache.
    pub no_cache: bool,
}

impl StageInvocation {
    /// Creates a new invocation.
    #[must_use]
    pub fn new(kind: Arc<StageKind>, tag: Tag, bases: BaseRefs, config: StageConfig) -> Self {
        let no_cache = kind.always_no_cache;
        Self {
            kind,
            tag,
            bases,
            config,
            no_cache,
        }
    }

    /// Requests that the engine's layer cache be bypassed.
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = self.kind.always_no_cache || no_cache;
        self
    }

    /// Returns the kind name.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        &self.kind.name
    }

    /// Returns a stable hash of everything that determines the build.
    ///
    /// Two invocations with equal fingerprints ask the engine for the same
    /// artifact.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "kind": self.kind.name,
            "tag": self.tag.render(),
            "primary": self.bases.primary.as_ref().map(Tag::render),
            "secondary": self.bases.secondary.as_ref().map(Tag::render),
            "config": self.config,
            "no_cache": self.no_cache,
        });

        let json = serde_json::to_string(&payload).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

/// An ordered, linear sequence of stage invocations.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSpec {
    /// The pipeline name (macro or kind name).
    pub name: String,
    invocations: Vec<StageInvocation>,
}

impl PipelineSpec {
    /// Creates a validated pipeline specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, there are no invocations, or an
    /// invocation after the first does not build on the previous one's tag.
    pub fn new(
        name: impl Into<String>,
        invocations: Vec<StageInvocation>,
    ) -> Result<Self, PipelineValidationError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }

        if invocations.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{name}' has no stages"
            ))
            .with_error_info(ErrorInfo::new(
                "WIGWAM-PIPELINE-EMPTY",
                "A pipeline needs at least one stage",
            )));
        }

        for (position, pair) in (2_usize..).zip(invocations.windows(2)) {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.bases.primary.as_ref() != Some(&previous.tag) {
                let found = current
                    .bases
                    .primary
                    .as_ref()
                    .map_or_else(|| "nothing".to_string(), Tag::render);
                return Err(PipelineValidationError::new(format!(
                    "Stage {} '{}' must build on '{}' but builds on {}",
                    position,
                    current.kind_name(),
                    previous.tag,
                    found
                ))
                .with_stages(vec![previous.kind.name.clone(), current.kind.name.clone()])
                .with_error_info(
                    ErrorInfo::new("WIGWAM-PIPELINE-BROKEN_CHAIN", "Pipeline is not a linear chain")
                        .with_context_entry("position", position.to_string()),
                ));
            }
        }

        Ok(Self { name, invocations })
    }

    /// Returns the invocations in build order.
    #[must_use]
    pub fn invocations(&self) -> &[StageInvocation] {
        &self.invocations
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    /// Always false; a spec holds at least one stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// Returns the tag the final stage produces.
    #[must_use]
    pub fn final_tag(&self) -> Option<&Tag> {
        self.invocations.last().map(|i| &i.tag)
    }

    /// Returns every tag the pipeline produces, in order.
    #[must_use]
    pub fn tags(&self) -> Vec<&Tag> {
        self.invocations.iter().map(|i| &i.tag).collect()
    }
}
