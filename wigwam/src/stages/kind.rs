//! Stage kind descriptors and their recognized options.

use serde::Serialize;
use std::fmt;

/// The value shape an option accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "choices")]
pub enum OptionValue {
    /// Any non-empty string.
    Text,
    /// One of a fixed set of values (case-sensitive).
    Choice(Vec<String>),
    /// A `MAJOR.MINOR` version. Exposes `<name>_major` and `<name>_minor`.
    Version,
    /// A GitHub-style `USER/REPO` slug.
    RepoSlug,
    /// A filesystem path. Exposes `<name>_dir`.
    Path,
    /// A boolean switch, rendered as `true` or `false`.
    Flag,
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "a non-empty string"),
            Self::Choice(choices) => write!(f, "one of {}", choices.join(", ")),
            Self::Version => write!(f, "a version in MAJOR.MINOR form"),
            Self::RepoSlug => write!(f, "a repository in USER/REPO form"),
            Self::Path => write!(f, "a filesystem path"),
            Self::Flag => write!(f, "true or false"),
        }
    }
}

/// One configuration option recognized by a stage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSpec {
    /// Option name (snake_case).
    pub name: String,
    /// Accepted value shape.
    pub value: OptionValue,
    /// Whether the option must be present after defaults are applied.
    pub required: bool,
    /// Value used when the caller does not supply one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl OptionSpec {
    /// Creates an optional option without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
            required: false,
            default: None,
        }
    }

    /// Marks the option as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A catalog entry describing one kind of stage.
///
/// Descriptors are built once when the registry is populated and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageKind {
    /// Kind name, also the Dockerfile template stem.
    pub name: String,
    /// Kind whose artifact this stage builds on. Empty for a root stage.
    ///
    /// At most one entry, except after the acquisition step: `configure`
    /// lists both `clone` and `insert` because either one can produce its
    /// base. A pipeline still threads exactly one of them.
    pub predecessors: Vec<String>,
    /// Kind whose artifact is copied in as a second input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    /// Suffix template used when the stage runs inside a macro.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Label used when a single-stage invocation supplies none.
    pub default_label: String,
    /// Recognized options.
    pub options: Vec<OptionSpec>,
    /// Option whose value determines the build context directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_option: Option<String>,
    /// Whether the produced artifact carries the system prefix.
    pub system_managed: bool,
    /// Whether the engine's layer cache is always bypassed.
    pub always_no_cache: bool,
}

impl StageKind {
    /// Creates a root, system-managed kind with no options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            default_label: name.clone(),
            name,
            predecessors: Vec::new(),
            secondary: None,
            suffix: None,
            options: Vec::new(),
            context_option: None,
            system_managed: true,
            always_no_cache: false,
        }
    }

    /// Declares the kind this stage builds on.
    #[must_use]
    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessors.push(predecessor.into());
        self
    }

    /// Declares a second upstream artifact the stage copies from.
    #[must_use]
    pub fn with_secondary(mut self, kind: impl Into<String>) -> Self {
        self.secondary = Some(kind.into());
        self
    }

    /// Sets the suffix template.
    #[must_use]
    pub fn with_suffix(mut self, template: impl Into<String>) -> Self {
        self.suffix = Some(template.into());
        self
    }

    /// Sets the label used for single-stage invocations.
    #[must_use]
    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = label.into();
        self
    }

    /// Adds a recognized option.
    #[must_use]
    pub fn with_option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    /// Names the option that determines the build context.
    #[must_use]
    pub fn with_context_option(mut self, option: impl Into<String>) -> Self {
        self.context_option = Some(option.into());
        self
    }

    /// Marks the produced artifact as exempt from the prefix convention.
    #[must_use]
    pub fn unmanaged(mut self) -> Self {
        self.system_managed = false;
        self
    }

    /// Always bypasses the engine's layer cache.
    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.always_no_cache = true;
        self
    }

    /// Returns true if the kind starts a chain.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.predecessors.is_empty()
    }

    /// Looks up a recognized option by name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
