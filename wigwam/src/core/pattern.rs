//! Glob patterns used to select artifacts for removal and listing.

use super::TagPrefix;
use crate::errors::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tag-matching expression: a literal or wildcard-bearing fragment.
///
/// Unless `ignore_prefix` is set, the system prefix is re-added to the
/// fragment before matching, so the pattern can only select system-managed
/// artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPattern {
    /// The label fragment (`*` matches any run, `?` any single character).
    pub fragment: String,
    /// Match the fragment against whole references without the prefix.
    #[serde(default)]
    pub ignore_prefix: bool,
}

impl RemovalPattern {
    /// Creates a prefix-scoped pattern.
    #[must_use]
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            ignore_prefix: false,
        }
    }

    /// Sets whether the prefix is re-added before matching.
    #[must_use]
    pub fn with_ignore_prefix(mut self, ignore_prefix: bool) -> Self {
        self.ignore_prefix = ignore_prefix;
        self
    }

    /// Returns the full glob this pattern matches against.
    #[must_use]
    pub fn effective_glob(&self, prefix: &TagPrefix) -> String {
        if self.ignore_prefix {
            self.fragment.clone()
        } else {
            prefix.apply(&self.fragment)
        }
    }

    /// Compiles the pattern for the given prefix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the fragment is empty or the translated
    /// expression is rejected by the regex engine.
    pub fn compile(&self, prefix: &TagPrefix) -> Result<CompiledPattern, ConfigError> {
        if self.fragment.trim().is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: self.fragment.clone(),
                reason: "pattern cannot be empty".to_string(),
            });
        }

        CompiledPattern::from_glob(self.effective_glob(prefix)).map_err(|e| match e {
            ConfigError::InvalidPattern { reason, .. } => ConfigError::InvalidPattern {
                pattern: self.fragment.clone(),
                reason,
            },
            other => other,
        })
    }
}

impl fmt::Display for RemovalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ignore_prefix {
            write!(f, "{} (ignore prefix)", self.fragment)
        } else {
            f.write_str(&self.fragment)
        }
    }
}

/// A pattern ready to be tested against rendered references.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    glob: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles a bare glob with no prefix handling.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` if the translated expression is rejected.
    pub fn from_glob(glob: impl Into<String>) -> Result<Self, ConfigError> {
        let glob = glob.into();
        let regex = Regex::new(&glob_to_regex(&glob)).map_err(|e| ConfigError::InvalidPattern {
            pattern: glob.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { glob, regex })
    }

    /// Returns the glob the pattern was compiled from.
    #[must_use]
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// Case-sensitive, anchored glob match against a rendered reference.
    #[must_use]
    pub fn is_match(&self, reference: &str) -> bool {
        self.regex.is_match(reference)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    for c in glob.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    expr
}
