//! Core domain model types for wigwam.
//!
//! This module contains the value types the rest of the crate is built on:
//! - Artifact tags and the system prefix
//! - Removal/listing glob patterns
//! - Stage status enum

mod pattern;
mod status;
mod tag;

pub use pattern::{CompiledPattern, RemovalPattern};
pub use status::StageStatus;
pub use tag::{render_suffix, SuffixParams, Tag, TagPrefix, DEFAULT_PREFIX};
