//! Stage kinds and the registry that catalogs them.
//!
//! A [`StageKind`] describes one layer of the image stack: which kind it builds
//! on, how its tag suffix is formed and which options its build payload
//! accepts. The [`StageRegistry`] holds the fixed catalog and validates
//! [`StageConfig`] payloads against it.

mod config;
mod kind;
mod registry;

pub use config::StageConfig;
pub use kind::{OptionSpec, OptionValue, StageKind};
pub use registry::{StageDefaults, StageRegistry, BUILD_TYPES};
