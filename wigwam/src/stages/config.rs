//! The opaque configuration payload carried by a stage invocation.

use super::{OptionValue, StageKind};
use crate::core::SuffixParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Option values for one stage invocation.
///
/// The core never branches on these values. They are validated against the
/// kind's recognized options and forwarded to the build engine as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageConfig(BTreeMap<String, String>);

impl StageConfig {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option.
    #[must_use]
    pub fn with(mut self, option: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(option, value);
        self
    }

    /// Sets an option if a value is present.
    #[must_use]
    pub fn with_opt(mut self, option: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.insert(option, value);
        }
        self
    }

    /// Sets a flag option. Absent flags are left unset.
    #[must_use]
    pub fn with_flag(self, option: impl Into<String>, on: bool) -> Self {
        if on {
            self.with(option, "true")
        } else {
            self
        }
    }

    /// Inserts or replaces an option.
    pub fn insert(&mut self, option: impl Into<String>, value: impl Into<String>) {
        self.0.insert(option.into(), value.into());
    }

    /// Returns an option value.
    #[must_use]
    pub fn get(&self, option: &str) -> Option<&str> {
        self.0.get(option).map(String::as_str)
    }

    /// Returns true if the option is set.
    #[must_use]
    pub fn contains(&self, option: &str) -> bool {
        self.0.contains_key(option)
    }

    /// Iterates over options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of options set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derives the parameters available to the kind's suffix template.
    ///
    /// Every option is available under its own name. Version options also
    /// expose `<name>_major`/`<name>_minor`, path options expose `<name>_dir`.
    #[must_use]
    pub fn suffix_params(&self, kind: &StageKind) -> SuffixParams {
        let mut params: SuffixParams = self.0.clone();

        for spec in &kind.options {
            let Some(value) = self.get(&spec.name) else {
                continue;
            };
            match spec.value {
                OptionValue::Version => {
                    if let Some((major, minor)) = value.split_once('.') {
                        params.insert(format!("{}_major", spec.name), major.to_string());
                        params.insert(format!("{}_minor", spec.name), minor.to_string());
                    }
                }
                OptionValue::Path => {
                    if let Some(dir) = top_dir(Path::new(value)) {
                        params.insert(format!("{}_dir", spec.name), dir);
                    }
                }
                _ => {}
            }
        }

        params
    }

    /// Resolves the build context directory from the kind's context option.
    ///
    /// A directory is used as-is; a file contributes its parent directory.
    #[must_use]
    pub fn context_dir(&self, kind: &StageKind) -> Option<PathBuf> {
        let value = self.get(kind.context_option.as_deref()?)?;
        let path = absolute(Path::new(value));
        if path.is_dir() {
            Some(path)
        } else {
            path.parent().map(Path::to_path_buf)
        }
    }
}

impl FromIterator<(String, String)> for StageConfig {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}

/// The name of the directory a path is copied as: the path itself when it is
/// a directory, else its parent.
fn top_dir(path: &Path) -> Option<String> {
    let path = absolute(path);
    let dir = if path.is_dir() { path.as_path() } else { path.parent()? };
    dir.file_name().map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::OptionSpec;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_and_lookup() {
        let config = StageConfig::new()
            .with("build_type", "Release")
            .with_flag("no_cuda", false)
            .with_opt("branch", None::<String>);

        assert_eq!(config.get("build_type"), Some("Release"));
        assert!(!config.contains("no_cuda"));
        assert!(!config.contains("branch"));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_version_params() {
        let kind = StageKind::new("runtime-cuda")
            .with_option(OptionSpec::new("cuda_version", OptionValue::Version));
        let config = StageConfig::new().with("cuda_version", "11.4");

        let params = config.suffix_params(&kind);
        assert_eq!(params.get("cuda_version_major").map(String::as_str), Some("11"));
        assert_eq!(params.get("cuda_version_minor").map(String::as_str), Some("4"));
        assert_eq!(params.get("cuda_version").map(String::as_str), Some("11.4"));
    }

    #[test]
    fn test_path_params_for_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir(&project).unwrap();
        let file = project.join("notes.txt");
        std::fs::write(&file, "x").unwrap();

        let kind = StageKind::new("insert")
            .with_option(OptionSpec::new("path", OptionValue::Path))
            .with_context_option("path");

        let config = StageConfig::new().with("path", project.to_string_lossy());
        assert_eq!(config.suffix_params(&kind).get("path_dir").map(String::as_str), Some("project"));
        assert_eq!(config.context_dir(&kind), Some(project.clone()));

        let config = StageConfig::new().with("path", file.to_string_lossy());
        assert_eq!(config.suffix_params(&kind).get("path_dir").map(String::as_str), Some("project"));
        assert_eq!(config.context_dir(&kind), Some(project));
    }

    #[test]
    fn test_context_dir_without_option() {
        let kind = StageKind::new("compile");
        assert_eq!(StageConfig::new().context_dir(&kind), None);
    }

    #[test]
    fn test_serializes_as_map() {
        let config = StageConfig::new().with("a", "1");
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"a":"1"}"#);
    }
}
