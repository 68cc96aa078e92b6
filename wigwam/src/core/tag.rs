//! Artifact tags and their derivation rules.
//!
//! Every system-managed artifact renders as `prefix-label[-suffix]`. The
//! distributable artifact and external base images carry no prefix.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "wigwam";

/// Parameters substituted into suffix templates.
pub type SuffixParams = BTreeMap<String, String>;

/// The system-owned literal that marks artifacts as managed by wigwam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagPrefix(String);

impl TagPrefix {
    /// Creates a validated prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is empty, contains whitespace or
    /// characters outside `[a-z0-9._-]`, or begins/ends with `-`.
    pub fn new(prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        let reject = |reason: &str| ConfigError::InvalidPrefix {
            prefix: prefix.clone(),
            reason: reason.to_string(),
        };

        if prefix.is_empty() {
            return Err(reject("prefix cannot be empty"));
        }
        if prefix.starts_with('-') || prefix.ends_with('-') {
            return Err(reject("prefix cannot begin or end with '-'"));
        }
        if !prefix.chars().all(is_name_char) {
            return Err(reject(NAME_CHARS));
        }

        Ok(Self(prefix))
    }

    /// Returns the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `reference` already starts with `prefix-`.
    #[must_use]
    pub fn marks(&self, reference: &str) -> bool {
        reference
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Prepends `prefix-` unless the reference already carries it.
    #[must_use]
    pub fn apply(&self, reference: &str) -> String {
        if self.marks(reference) {
            reference.to_string()
        } else {
            format!("{}-{}", self.0, reference)
        }
    }

    /// Removes a leading `prefix-`, if present.
    #[must_use]
    pub fn strip<'a>(&self, reference: &'a str) -> &'a str {
        if self.marks(reference) {
            &reference[self.0.len() + 1..]
        } else {
            reference
        }
    }
}

impl Default for TagPrefix {
    fn default() -> Self {
        Self(DEFAULT_PREFIX.to_string())
    }
}

impl fmt::Display for TagPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TagPrefix {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagPrefix> for String {
    fn from(prefix: TagPrefix) -> Self {
        prefix.0
    }
}

/// Identifies one artifact.
///
/// Two tags are equal when they render to the same string, so a tag derived
/// from `(label, suffix)` equals the tag parsed back from its rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    prefix: Option<TagPrefix>,
    label: String,
    suffix: Option<String>,
}

impl Tag {
    /// Derives a system-managed tag from a label and an optional suffix template.
    ///
    /// A label that already carries the prefix is not prefixed twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is unusable or the template references a
    /// parameter missing from `params`.
    pub fn derive(
        prefix: &TagPrefix,
        label: &str,
        suffix_template: Option<&str>,
        params: &SuffixParams,
    ) -> Result<Self, ConfigError> {
        let label = prefix.strip(label);
        validate_label(label)?;

        let suffix = suffix_template
            .map(|template| render_suffix(template, params))
            .transpose()?
            .filter(|s| !s.is_empty());

        Ok(Self {
            prefix: Some(prefix.clone()),
            label: label.to_string(),
            suffix,
        })
    }

    /// Creates a tag without the system prefix (the distributable artifact).
    ///
    /// # Errors
    ///
    /// Returns an error if the label is unusable.
    pub fn unprefixed(label: &str) -> Result<Self, ConfigError> {
        validate_label(label)?;
        Ok(Self {
            prefix: None,
            label: label.to_string(),
            suffix: None,
        })
    }

    /// Refers to a system-managed artifact by a user-supplied name, adding the
    /// prefix when it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unusable.
    pub fn reference(prefix: &TagPrefix, reference: &str) -> Result<Self, ConfigError> {
        Self::derive(prefix, reference, None, &SuffixParams::new())
    }

    /// Refers to an image outside the system namespace, used verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unusable.
    pub fn external(reference: &str) -> Result<Self, ConfigError> {
        let reject = |reason: &str| ConfigError::InvalidLabel {
            label: reference.to_string(),
            reason: reason.to_string(),
        };
        if reference.trim().is_empty() {
            return Err(reject("image reference cannot be empty"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(reject("image reference cannot contain whitespace"));
        }
        Ok(Self {
            prefix: None,
            label: reference.to_string(),
            suffix: None,
        })
    }

    /// Returns the prefix, if the tag is system-managed.
    #[must_use]
    pub fn prefix(&self) -> Option<&TagPrefix> {
        self.prefix.as_ref()
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the rendered suffix.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Returns true if the tag carries the system prefix.
    #[must_use]
    pub fn is_system_managed(&self) -> bool {
        self.prefix.is_some()
    }

    /// Renders the tag as `prefix-label-suffix`, omitting absent segments.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(prefix) = &self.prefix {
            parts.push(prefix.as_str());
        }
        parts.push(&self.label);
        if let Some(suffix) = &self.suffix {
            parts.push(suffix);
        }
        parts.join("-")
    }

    /// Returns true if the rendered tag matches the compiled pattern.
    #[must_use]
    pub fn matches(&self, pattern: &super::CompiledPattern) -> bool {
        pattern.is_match(&self.render())
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.render() == other.render()
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.render().hash(state);
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn validate_label(label: &str) -> Result<(), ConfigError> {
    let reject = |reason: &str| ConfigError::InvalidLabel {
        label: label.to_string(),
        reason: reason.to_string(),
    };

    if label.is_empty() {
        return Err(reject("label cannot be empty"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(reject("label cannot begin or end with '-'"));
    }
    if !label.chars().all(is_name_char) {
        return Err(reject(NAME_CHARS));
    }
    Ok(())
}

const NAME_CHARS: &str = "only lowercase letters, digits, '.', '_' and '-' are allowed";

/// Characters the engine accepts in a repository name segment.
fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
}

/// Renders a suffix template, substituting `{name}` placeholders.
///
/// # Errors
///
/// Returns `MalformedSuffix` if a placeholder has no matching parameter or a
/// brace is left unclosed.
pub fn render_suffix(template: &str, params: &SuffixParams) -> Result<String, ConfigError> {
    let malformed = |parameter: &str| ConfigError::MalformedSuffix {
        template: template.to_string(),
        parameter: parameter.to_string(),
    };

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| malformed(after))?;
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| malformed(name))?;
        rendered.push_str(value);
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> SuffixParams {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_derive_and_render() {
        let prefix = TagPrefix::default();
        let tag = Tag::derive(
            &prefix,
            "setup",
            Some("cuda-{cuda_version_major}-{cuda_version_minor}-runtime"),
            &params(&[("cuda_version_major", "11"), ("cuda_version_minor", "4")]),
        )
        .unwrap();

        assert_eq!(tag.render(), "wigwam-setup-cuda-11-4-runtime");
        assert_eq!(tag.label(), "setup");
        assert_eq!(tag.suffix(), Some("cuda-11-4-runtime"));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let prefix = TagPrefix::default();
        let a = Tag::derive(&prefix, "build", Some("configured"), &SuffixParams::new()).unwrap();
        let b = Tag::derive(&prefix, "build", Some("configured"), &SuffixParams::new()).unwrap();
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn test_missing_parameter_is_config_error() {
        let err = Tag::derive(&TagPrefix::default(), "x", Some("file-{path_dir}"), &SuffixParams::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MalformedSuffix {
                template: "file-{path_dir}".to_string(),
                parameter: "path_dir".to_string(),
            }
        );
    }

    #[test]
    fn test_unclosed_placeholder() {
        let err = render_suffix("cuda-{cuda", &SuffixParams::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedSuffix { .. }));
    }

    #[test]
    fn test_prefix_not_duplicated() {
        let prefix = TagPrefix::default();
        let tag = Tag::reference(&prefix, "wigwam-setup-mamba-dev").unwrap();
        assert_eq!(tag.render(), "wigwam-setup-mamba-dev");

        let tag = Tag::reference(&prefix, "setup-mamba-dev").unwrap();
        assert_eq!(tag.render(), "wigwam-setup-mamba-dev");
    }

    #[test]
    fn test_prefix_only_matches_whole_segment() {
        let prefix = TagPrefix::default();
        assert!(!prefix.marks("wigwamish-x"));
        assert_eq!(prefix.apply("wigwamish-x"), "wigwam-wigwamish-x");
    }

    #[test]
    fn test_unprefixed_and_external() {
        assert_eq!(Tag::unprefixed("isce3").unwrap().render(), "isce3");
        let base = Tag::external("oraclelinux:8.4").unwrap();
        assert!(!base.is_system_managed());
        assert_eq!(base.render(), "oraclelinux:8.4");
    }

    #[test]
    fn test_derived_equals_reference() {
        let prefix = TagPrefix::default();
        let derived = Tag::derive(&prefix, "setup", Some("init"), &SuffixParams::new()).unwrap();
        let referenced = Tag::reference(&prefix, "setup-init").unwrap();
        assert_eq!(derived, referenced);
    }

    #[test]
    fn test_invalid_labels() {
        assert!(Tag::unprefixed("").is_err());
        assert!(Tag::unprefixed("has space").is_err());
        assert!(Tag::unprefixed("-lead").is_err());
        assert!(Tag::external("").is_err());
    }

    #[test]
    fn test_label_charset_matches_prefix_rule() {
        let err = Tag::derive(&TagPrefix::default(), "Setup", None, &SuffixParams::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLabel { ref label, .. } if label == "Setup"));
        assert!(Tag::unprefixed("isce3:latest").is_err());
        assert!(Tag::reference(&TagPrefix::default(), "build/installed").is_err());
        assert!(Tag::derive(&TagPrefix::default(), "my_build.2", None, &SuffixParams::new()).is_ok());
    }

    #[test]
    fn test_prefix_validation() {
        assert!(TagPrefix::new("wigwam").is_ok());
        assert!(TagPrefix::new("").is_err());
        assert!(TagPrefix::new("-bad").is_err());
        assert!(TagPrefix::new("Bad").is_err());
    }

    #[test]
    fn test_empty_rendered_suffix_is_dropped() {
        let tag = Tag::derive(&TagPrefix::default(), "x", Some(""), &SuffixParams::new()).unwrap();
        assert_eq!(tag.render(), "wigwam-x");
    }
}
