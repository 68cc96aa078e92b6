//! Test data management.
//!
//! This module provides:
//! - The data record catalog and its name/tag search
//! - The workflow test catalog
//! - The input locator for test input repositories
//! - The artifact cache boundary used to download records

mod fetch;
mod inputs;
mod records;
mod workflows;

pub use fetch::{
    fetch_all, plan_fetch, ArtifactCache, FetchFailure, FetchReport, FetchRequest, RoverCache,
};
pub use inputs::{InputDir, InputLocator, DEFAULT_CACHE_DIR};
pub use records::{DataCatalog, DataQuery, DataRecord};
pub use workflows::{TestCatalog, TestId, TestInputs, WorkflowTest};

#[cfg(test)]
pub use fetch::MockArtifactCache;
