//! Error types for wigwam.
//!
//! Composition-time errors (`ConfigError`, `MissingBaseError`,
//! `UnknownStageKindError`, `PipelineValidationError`) are raised before any
//! artifact is touched. Run-time errors (`BuildFailure`, `DeletionFailure`)
//! are collected into reports rather than propagated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for wigwam operations.
#[derive(Debug, Error)]
pub enum WigwamError {
    /// A stage option or configuration value was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage requires a base artifact that was never supplied.
    #[error("{0}")]
    MissingBase(#[from] MissingBaseError),

    /// A stage kind is not present in the registry.
    #[error("{0}")]
    UnknownStageKind(#[from] UnknownStageKindError),

    /// A composed pipeline violated a structural rule.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The build engine failed to produce an artifact.
    #[error("{0}")]
    Build(#[from] BuildFailure),

    /// The build engine could not be queried or driven.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// A data catalog or input lookup failed.
    #[error("{0}")]
    Data(#[from] DataError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WigwamError {
    /// Returns diagnostic metadata for composition-time errors.
    #[must_use]
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            Self::Config(e) => Some(e.error_info()),
            Self::MissingBase(e) => Some(e.error_info()),
            Self::UnknownStageKind(e) => Some(e.error_info()),
            Self::Validation(e) => e.error_info.clone(),
            _ => None,
        }
    }
}

/// Diagnostic metadata attached to composition errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "WIGWAM-CONFIG-INVALID_OPTION").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Invalid or missing stage option, or a bad configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required option was not supplied and has no default.
    #[error("Stage '{stage}' requires option '{option}'")]
    MissingOption {
        /// The stage kind.
        stage: String,
        /// The missing option.
        option: String,
    },

    /// An option value is outside the accepted set or format.
    #[error("Invalid value '{value}' for option '{option}' of stage '{stage}': expected {expected}")]
    InvalidOption {
        /// The stage kind.
        stage: String,
        /// The option name.
        option: String,
        /// The rejected value.
        value: String,
        /// Description of what is accepted.
        expected: String,
    },

    /// An option is not recognized by the stage kind.
    #[error("Stage '{stage}' does not recognize option '{option}'")]
    UnrecognizedOption {
        /// The stage kind.
        stage: String,
        /// The unrecognized option.
        option: String,
    },

    /// A suffix template references a parameter that was not provided.
    #[error("Suffix template '{template}' requires parameter '{parameter}'")]
    MalformedSuffix {
        /// The suffix template.
        template: String,
        /// The missing parameter.
        parameter: String,
    },

    /// A label cannot be used to form a tag.
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel {
        /// The label.
        label: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The system tag prefix is unusable.
    #[error("Invalid tag prefix '{prefix}': {reason}")]
    InvalidPrefix {
        /// The prefix.
        prefix: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A removal or listing pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two options cannot be used together.
    #[error("Conflicting options: {message}")]
    ConflictingOptions {
        /// Description of the conflict.
        message: String,
    },
}

impl ConfigError {
    /// Creates a missing option error.
    #[must_use]
    pub fn missing_option(stage: impl Into<String>, option: impl Into<String>) -> Self {
        Self::MissingOption {
            stage: stage.into(),
            option: option.into(),
        }
    }

    /// Creates an invalid option error.
    #[must_use]
    pub fn invalid_option(
        stage: impl Into<String>,
        option: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            stage: stage.into(),
            option: option.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Creates an unrecognized option error.
    #[must_use]
    pub fn unrecognized_option(stage: impl Into<String>, option: impl Into<String>) -> Self {
        Self::UnrecognizedOption {
            stage: stage.into(),
            option: option.into(),
        }
    }

    /// Creates a conflicting options error.
    #[must_use]
    pub fn conflicting(message: impl Into<String>) -> Self {
        Self::ConflictingOptions {
            message: message.into(),
        }
    }

    /// Returns diagnostic metadata for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Self::MissingOption { stage, option } => ErrorInfo::new(
                "WIGWAM-CONFIG-MISSING_OPTION",
                format!("Option '{option}' missing for stage '{stage}'"),
            )
            .with_fix_hint(format!("Pass --{} on the command line.", option.replace('_', "-"))),
            Self::InvalidOption { option, expected, .. } => ErrorInfo::new(
                "WIGWAM-CONFIG-INVALID_OPTION",
                format!("Option '{option}' has an unaccepted value"),
            )
            .with_fix_hint(format!("Use {expected}.")),
            Self::UnrecognizedOption { stage, option } => ErrorInfo::new(
                "WIGWAM-CONFIG-UNRECOGNIZED_OPTION",
                format!("Option '{option}' is not defined for stage '{stage}'"),
            ),
            Self::MalformedSuffix { template, .. } => ErrorInfo::new(
                "WIGWAM-CONFIG-MALFORMED_SUFFIX",
                format!("Suffix template '{template}' could not be rendered"),
            ),
            Self::InvalidLabel { label, .. } => {
                ErrorInfo::new("WIGWAM-CONFIG-INVALID_LABEL", format!("Label '{label}' rejected"))
                    .with_fix_hint("Use lowercase letters, digits, '.', '_' and '-' only.")
            }
            Self::InvalidPrefix { prefix, .. } => {
                ErrorInfo::new("WIGWAM-CONFIG-INVALID_PREFIX", format!("Prefix '{prefix}' rejected"))
            }
            Self::InvalidPattern { pattern, .. } => {
                ErrorInfo::new("WIGWAM-CONFIG-INVALID_PATTERN", format!("Pattern '{pattern}' rejected"))
                    .with_fix_hint("Use '*' and '?' as the only wildcards.")
            }
            Self::ConflictingOptions { message } => {
                ErrorInfo::new("WIGWAM-CONFIG-CONFLICT", message.clone())
            }
        }
    }
}

/// Which base slot of a stage invocation an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseRole {
    /// The image the stage builds on top of.
    Primary,
    /// An additional artifact the stage copies from.
    Secondary,
}

impl std::fmt::Display for BaseRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// Error raised when a stage references an upstream artifact that was never
/// supplied and cannot be defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' producing '{tag}' requires a {role} base artifact but none was supplied")]
pub struct MissingBaseError {
    /// The stage kind.
    pub stage: String,
    /// The tag the stage would have produced.
    pub tag: String,
    /// The missing base slot.
    pub role: BaseRole,
}

impl MissingBaseError {
    /// Creates a new missing base error.
    #[must_use]
    pub fn new(stage: impl Into<String>, tag: impl Into<String>, role: BaseRole) -> Self {
        Self {
            stage: stage.into(),
            tag: tag.into(),
            role,
        }
    }

    /// Returns diagnostic metadata for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(
            "WIGWAM-PIPELINE-MISSING_BASE",
            format!("No {} base for stage '{}'", self.role, self.stage),
        )
        .with_fix_hint("Pass --base (or --source-tag for the copy source).")
        .with_context_entry("tag", self.tag.clone())
    }
}

/// Error raised when looking up a stage kind that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown stage kind: {name}")]
pub struct UnknownStageKindError {
    /// The requested kind name.
    pub name: String,
}

impl UnknownStageKindError {
    /// Creates a new unknown stage kind error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns diagnostic metadata for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(
            "WIGWAM-REGISTRY-UNKNOWN_KIND",
            format!("No stage kind named '{}'", self.name),
        )
        .with_fix_hint("Run with a kind from the registry, e.g. 'init' or 'configure'.")
    }
}

/// Error raised when a composed pipeline breaks a structural rule.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Why a build did not produce its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external engine reported a failure.
    Engine,
    /// A referenced base artifact does not exist in the engine.
    MissingBase,
    /// The run was cancelled while this stage was current.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine => write!(f, "engine"),
            Self::MissingBase => write!(f, "missing_base"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A stage that did not produce its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", self.describe())]
pub struct BuildFailure {
    /// The stage kind.
    pub stage: String,
    /// The tag that was being produced.
    pub tag: String,
    /// One-based position of the stage in its pipeline, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// The failure kind.
    pub kind: FailureKind,
    /// Reason forwarded from the engine.
    pub reason: String,
}

impl BuildFailure {
    /// Creates an engine failure.
    #[must_use]
    pub fn engine(stage: impl Into<String>, tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Engine, stage, tag, reason)
    }

    /// Creates a missing base failure.
    #[must_use]
    pub fn missing_base(stage: impl Into<String>, tag: impl Into<String>, base: &str) -> Self {
        Self::with_kind(
            FailureKind::MissingBase,
            stage,
            tag,
            format!("base artifact '{base}' does not exist"),
        )
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(stage: impl Into<String>, tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Cancelled, stage, tag, reason)
    }

    fn with_kind(
        kind: FailureKind,
        stage: impl Into<String>,
        tag: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            tag: tag.into(),
            position: None,
            kind,
            reason: reason.into(),
        }
    }

    /// Records the one-based pipeline position of the failing stage.
    #[must_use]
    pub fn at_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    fn describe(&self) -> String {
        let position = self
            .position
            .map(|p| format!(" (stage {p})"))
            .unwrap_or_default();
        format!(
            "Stage '{}'{} failed to build '{}' [{}]: {}",
            self.stage, position, self.tag, self.kind, self.reason
        )
    }
}

/// A single artifact the engine refused or failed to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Failed to remove '{artifact}': {reason}")]
pub struct DeletionFailure {
    /// The artifact reference.
    pub artifact: String,
    /// Reason forwarded from the engine.
    pub reason: String,
}

impl DeletionFailure {
    /// Creates a new deletion failure.
    #[must_use]
    pub fn new(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by an external engine (container builder or cache tool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine executable could not be started.
    #[error("Could not run '{program}': {reason}")]
    Unavailable {
        /// The program name.
        program: String,
        /// The OS-level reason.
        reason: String,
    },

    /// An engine command exited unsuccessfully.
    #[error("Command '{command}' failed{}: {stderr}", .code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    CommandFailed {
        /// The command line.
        command: String,
        /// The exit code, when the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The engine refused the operation.
    #[error("Engine refused operation on '{artifact}': {reason}")]
    Refused {
        /// The artifact reference.
        artifact: String,
        /// The reason given.
        reason: String,
    },
}

/// Errors raised by the data catalog, workflow catalog and input locator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// A catalog file could not be read.
    #[error("Could not read '{path}': {reason}")]
    Read {
        /// The file path.
        path: String,
        /// The reason.
        reason: String,
    },

    /// A catalog file is not valid JSON of the expected shape.
    #[error("Could not parse '{path}': {reason}")]
    Parse {
        /// The file path.
        path: String,
        /// The reason.
        reason: String,
    },

    /// A test identifier is not in WORKFLOW:TEST form.
    #[error("Test identifier '{id}' is not in WORKFLOW:TEST format")]
    MalformedTestId {
        /// The identifier.
        id: String,
    },

    /// The workflow is not present in the test catalog.
    #[error("Workflow '{workflow}' not found")]
    UnknownWorkflow {
        /// The workflow name.
        workflow: String,
    },

    /// The test is not present under its workflow.
    #[error("Test '{test}' not found under workflow '{workflow}'")]
    UnknownTest {
        /// The workflow name.
        workflow: String,
        /// The test name.
        test: String,
    },

    /// A data record name is not present in the data catalog.
    #[error("Data record '{name}' not found")]
    UnknownRecord {
        /// The record name.
        name: String,
    },

    /// An input directory label does not name any input of the test.
    #[error("Label '{label}' was not expected")]
    UnknownLabel {
        /// The label.
        label: String,
    },

    /// Two input directories resolve to the same repository.
    #[error("Repository '{repository}' referenced twice")]
    DuplicateInput {
        /// The repository name.
        repository: String,
    },

    /// An unlabeled input directory was given for a multi-input test.
    #[error("Unlabeled input directories only allowed for tests with one input; this test needs {required}")]
    UnlabeledInput {
        /// How many inputs the test requires.
        required: usize,
    },

    /// An input directory string could not be parsed.
    #[error("Malformed input directory '{value}': expected PATH or LABEL:PATH")]
    MalformedInputDir {
        /// The raw value.
        value: String,
    },

    /// Required inputs were not found in any supplied location.
    #[error("Required repositories not found in supplied locations: {}", .names.join(", "))]
    InputsNotFound {
        /// The unresolved repository names.
        names: Vec<String>,
    },
}
