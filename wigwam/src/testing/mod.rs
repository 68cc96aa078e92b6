//! Testing utilities for wigwam pipelines.
//!
//! This module provides:
//! - An in-memory build engine with scripted failures and refusals
//! - An in-memory artifact cache
//! - Fixture registries, composers and pipelines

mod fixtures;
mod mocks;

pub use fixtures::{chain_registry, linear_spec, standard_composer, FIXTURE_BASE_IMAGE};
pub use mocks::{MockCache, MockEngine};
