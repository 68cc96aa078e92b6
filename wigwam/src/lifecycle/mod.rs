//! Artifact lifecycle management.
//!
//! Artifacts are never deleted as a side effect of a pipeline run. Removal is
//! an explicit, pattern-driven operation handled by [`RemovalEngine`].

mod removal;

pub use crate::errors::DeletionFailure;
pub use removal::{RemovalEngine, RemovalReport};
