//! # Wigwam
//!
//! Layered container image pipelines for building and distributing ISCE3.
//!
//! Wigwam composes a fixed catalog of stage kinds into linear pipelines where
//! each stage builds one tagged image on top of the previous one:
//!
//! - **Tags**: every managed image is tagged `prefix-label-suffix`, so a
//!   whole family of images can be listed or removed by pattern
//! - **Composition**: macro commands (`setup-all`, `full-compile`,
//!   `distributable`) expand into validated stage chains before anything runs
//! - **Execution**: stages build strictly in order; the first failure halts
//!   the run and leaves earlier images in place for resumption
//! - **Lifecycle**: glob-driven bulk removal restricted to prefixed images
//! - **Test data**: catalog search, input location and cache downloads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wigwam::prelude::*;
//!
//! let composer = PipelineComposer::new(Arc::new(StageRegistry::standard()), TagPrefix::default());
//! let spec = composer.compose(&MacroCommand::SetupAll(
//!     SetupAll::default().with_base_image("oraclelinux:8.4"),
//! ))?;
//!
//! let controller = RunController::new(BuildExecutor::new(Arc::new(DockerEngine::default())));
//! let report = controller.run(&spec, &CancellationToken::new()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::WigwamConfig;
    pub use crate::core::{RemovalPattern, StageStatus, Tag, TagPrefix};
    pub use crate::engine::{BuildEngine, BuildExecutor, BuildRequest, DockerEngine};
    pub use crate::errors::{
        BuildFailure, ConfigError, DeletionFailure, MissingBaseError, UnknownStageKindError,
        WigwamError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::lifecycle::{RemovalEngine, RemovalReport};
    pub use crate::pipeline::{
        Distributable, FullCompile, MacroCommand, PipelineComposer, PipelineSpec, RepoSource,
        RunController, RunReport, RunState, SetupAll, SingleStage, StageInvocation,
    };
    pub use crate::stages::{StageConfig, StageKind, StageRegistry};
}
