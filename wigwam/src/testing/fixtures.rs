//! Ready-made registries, composers and pipelines for tests.

use std::sync::Arc;

use crate::core::{Tag, TagPrefix};
use crate::pipeline::{BaseRefs, PipelineComposer, PipelineSpec, StageInvocation};
use crate::stages::{StageConfig, StageKind, StageRegistry};

/// External image the first stage of a fixture pipeline builds on.
pub const FIXTURE_BASE_IMAGE: &str = "scratch";

/// A registry holding one root kind and a chain of fake kinds.
///
/// The kinds are named after `labels`; each after the first builds on the
/// previous one.
#[must_use]
pub fn chain_registry(labels: &[&str]) -> StageRegistry {
    let mut registry = StageRegistry::new();
    let mut previous: Option<&str> = None;
    for label in labels {
        let kind = match previous {
            Some(before) => StageKind::new(*label).after(before),
            None => StageKind::new(*label),
        };
        registry.register(kind);
        previous = Some(label);
    }
    registry
}

/// A linear pipeline named `test` with one fake stage per label.
///
/// Stage `i` produces `wigwam-test-<labels[i]>`; the first stage builds on
/// [`FIXTURE_BASE_IMAGE`].
///
/// # Panics
///
/// Panics if a label cannot form a tag. Intended for tests only.
#[must_use]
pub fn linear_spec(labels: &[&str]) -> PipelineSpec {
    let prefix = TagPrefix::default();
    let mut previous = Tag::external(FIXTURE_BASE_IMAGE).expect("fixture base image");
    let mut invocations = Vec::with_capacity(labels.len());

    for label in labels {
        let tag = Tag::reference(&prefix, &format!("test-{label}")).expect("fixture label");
        invocations.push(StageInvocation::new(
            Arc::new(StageKind::new(*label)),
            tag.clone(),
            BaseRefs::primary(previous),
            StageConfig::new(),
        ));
        previous = tag;
    }

    PipelineSpec::new("test", invocations).expect("fixture pipeline")
}

/// A composer over the standard registry with the default prefix.
#[must_use]
pub fn standard_composer() -> PipelineComposer {
    PipelineComposer::new(Arc::new(StageRegistry::standard()), TagPrefix::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_spec_chains() {
        let spec = linear_spec(&["a", "b"]);
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.invocations()[0].bases.primary.as_ref().map(Tag::render).as_deref(), Some("scratch"));
        assert_eq!(spec.final_tag().map(Tag::render).as_deref(), Some("wigwam-test-b"));
    }

    #[test]
    fn test_chain_registry() {
        let registry = chain_registry(&["a", "b"]);
        assert!(registry.lookup("a").unwrap().is_root());
        assert!(!registry.lookup("b").unwrap().is_root());
    }
}
