//! Pipeline composition and execution.
//!
//! This module provides:
//! - Pipeline specifications (ordered, chained stage invocations)
//! - A composer that expands macro commands into pipelines
//! - A run controller that executes pipelines with failure containment

mod composer;
mod controller;
mod result;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use composer::{
    Distributable, FullCompile, MacroCommand, PipelineComposer, RepoSource, SetupAll, SingleStage,
    SETUP_ALL_KINDS,
};
pub use controller::RunController;
pub use result::{RunReport, RunState, StageResult};
pub use spec::{BaseRefs, PipelineSpec, StageInvocation};
