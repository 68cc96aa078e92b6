//! Locating the input repositories of a workflow test on disk.

use super::WorkflowTest;
use crate::errors::DataError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Cache searched after every explicitly supplied cache directory.
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// An explicitly supplied input location: `PATH` or `LABEL:PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDir {
    /// A bare path, only valid for single-input tests.
    Unlabeled(PathBuf),
    /// A path bound to a label or repository name.
    Labeled {
        /// The label.
        label: String,
        /// The directory.
        path: PathBuf,
    },
}

impl FromStr for InputDir {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DataError::MalformedInputDir { value: s.to_string() };
        let value = s.trim();
        if value.is_empty() {
            return Err(malformed());
        }
        match value.split_once(':') {
            None => Ok(Self::Unlabeled(PathBuf::from(value))),
            Some((label, path)) if !label.is_empty() && !path.is_empty() && !path.contains(':') => {
                Ok(Self::Labeled {
                    label: label.to_string(),
                    path: PathBuf::from(path),
                })
            }
            Some(_) => Err(malformed()),
        }
    }
}

/// Resolves each required input of a test to a directory.
///
/// An explicit input directory wins. Otherwise the cache directories are
/// searched in order, then the default cache; an input is present in a cache
/// when `<cache>/<name>` is a directory.
#[derive(Debug, Clone)]
pub struct InputLocator {
    cache_dirs: Vec<PathBuf>,
    default_cache: PathBuf,
}

impl Default for InputLocator {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

impl InputLocator {
    /// Creates a locator searching the given caches, then `./cache`.
    #[must_use]
    pub fn new<I, P>(cache_dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            cache_dirs: cache_dirs.into_iter().map(Into::into).collect(),
            default_cache: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }

    /// Replaces the fallback cache.
    #[must_use]
    pub fn with_default_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_cache = dir.into();
        self
    }

    /// Returns the caches in search order.
    pub fn search_order(&self) -> impl Iterator<Item = &Path> {
        let default = (!self.cache_dirs.contains(&self.default_cache)).then_some(self.default_cache.as_path());
        self.cache_dirs.iter().map(PathBuf::as_path).chain(default)
    }

    /// Maps every input repository of `test` to a directory.
    ///
    /// # Errors
    ///
    /// - `UnlabeledInput` if a bare path is given for a multi-input test, or
    ///   alongside other input directories
    /// - `UnknownLabel` if a label names no input of the test
    /// - `DuplicateInput` if two input directories name the same repository
    /// - `InputsNotFound` listing every input left unresolved
    pub fn locate(
        &self,
        test: &WorkflowTest,
        input_dirs: &[InputDir],
    ) -> Result<BTreeMap<String, PathBuf>, DataError> {
        let required = test.inputs.repositories();
        let labels = test.inputs.labels();
        let mut resolved: BTreeMap<String, PathBuf> = BTreeMap::new();

        for dir in input_dirs {
            match dir {
                InputDir::Unlabeled(path) => {
                    if required.len() != 1 || input_dirs.len() != 1 {
                        return Err(DataError::UnlabeledInput {
                            required: required.len(),
                        });
                    }
                    resolved.insert(required[0].to_string(), path.clone());
                }
                InputDir::Labeled { label, path } => {
                    let repo = labels.get(label.as_str()).ok_or_else(|| DataError::UnknownLabel {
                        label: label.clone(),
                    })?;
                    if resolved.contains_key(*repo) {
                        return Err(DataError::DuplicateInput {
                            repository: (*repo).to_string(),
                        });
                    }
                    resolved.insert((*repo).to_string(), path.clone());
                }
            }
        }

        let mut missing = Vec::new();
        for repo in required {
            if resolved.contains_key(repo) {
                continue;
            }
            match self.search_order().find(|cache| cache.join(repo).is_dir()) {
                Some(cache) => {
                    debug!(input = %repo, cache = %cache.display(), "Input found in cache");
                    resolved.insert(repo.to_string(), cache.join(repo));
                }
                None => missing.push(repo.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(DataError::InputsNotFound { names: missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TestInputs;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_with(inputs: TestInputs) -> WorkflowTest {
        WorkflowTest {
            inputs,
            runconfig: None,
            series: Vec::new(),
        }
    }

    fn labeled() -> WorkflowTest {
        test_with(TestInputs::Labeled(
            [("ref", "UAVSAR_A"), ("sec", "UAVSAR_B")]
                .into_iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
        ))
    }

    fn cache_with(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn locator(caches: &[&TempDir]) -> InputLocator {
        InputLocator::new(caches.iter().map(|d| d.path().to_path_buf()))
            .with_default_cache("/nonexistent/wigwam-cache")
    }

    #[test]
    fn test_parse_input_dir() {
        assert_eq!(
            "ref:/data/a".parse::<InputDir>().unwrap(),
            InputDir::Labeled {
                label: "ref".to_string(),
                path: PathBuf::from("/data/a")
            }
        );
        assert_eq!(
            "/data/a".parse::<InputDir>().unwrap(),
            InputDir::Unlabeled(PathBuf::from("/data/a"))
        );
        for bad in ["", "  ", "a:b:c", ":x", "x:"] {
            assert!(bad.parse::<InputDir>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_unlabeled_single_input() {
        let test = test_with(TestInputs::Single("REE1".to_string()));
        let found = locator(&[])
            .locate(&test, &[InputDir::Unlabeled(PathBuf::from("/in"))])
            .unwrap();
        assert_eq!(found.get("REE1"), Some(&PathBuf::from("/in")));
    }

    #[test]
    fn test_unlabeled_rejected_for_multiple_inputs() {
        let err = locator(&[])
            .locate(&labeled(), &[InputDir::Unlabeled(PathBuf::from("/in"))])
            .unwrap_err();
        assert_eq!(err, DataError::UnlabeledInput { required: 2 });
    }

    #[test]
    fn test_label_then_cache_resolution() {
        let first = cache_with(&[]);
        let second = cache_with(&["UAVSAR_B"]);
        let dirs = ["ref:/explicit/a".parse().unwrap()];

        let found = locator(&[&first, &second]).locate(&labeled(), &dirs).unwrap();

        assert_eq!(found.get("UAVSAR_A"), Some(&PathBuf::from("/explicit/a")));
        assert_eq!(found.get("UAVSAR_B"), Some(&second.path().join("UAVSAR_B")));
    }

    #[test]
    fn test_caches_searched_in_order() {
        let first = cache_with(&["UAVSAR_A"]);
        let second = cache_with(&["UAVSAR_A", "UAVSAR_B"]);

        let found = locator(&[&first, &second]).locate(&labeled(), &[]).unwrap();

        assert_eq!(found.get("UAVSAR_A"), Some(&first.path().join("UAVSAR_A")));
        assert_eq!(found.get("UAVSAR_B"), Some(&second.path().join("UAVSAR_B")));
    }

    #[test]
    fn test_default_cache_used_last() {
        let fallback = cache_with(&["UAVSAR_A", "UAVSAR_B"]);
        let locator = InputLocator::new(Vec::<PathBuf>::new()).with_default_cache(fallback.path());

        let found = locator.locate(&labeled(), &[]).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_all_missing_inputs_reported() {
        let err = locator(&[]).locate(&labeled(), &[]).unwrap_err();
        assert_eq!(
            err,
            DataError::InputsNotFound {
                names: vec!["UAVSAR_A".to_string(), "UAVSAR_B".to_string()]
            }
        );
    }

    #[test]
    fn test_unknown_label_and_duplicate() {
        let err = locator(&[])
            .locate(&labeled(), &["other:/x".parse().unwrap()])
            .unwrap_err();
        assert_eq!(err, DataError::UnknownLabel { label: "other".to_string() });

        let err = locator(&[])
            .locate(&labeled(), &["ref:/x".parse().unwrap(), "UAVSAR_A:/y".parse().unwrap()])
            .unwrap_err();
        assert_eq!(
            err,
            DataError::DuplicateInput {
                repository: "UAVSAR_A".to_string()
            }
        );
    }
}
