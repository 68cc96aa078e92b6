//! The workflow test catalog (`workflowtests.json`).

use crate::errors::DataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A `WORKFLOW:TEST` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId {
    /// Workflow name.
    pub workflow: String,
    /// Test name within the workflow.
    pub test: String,
}

impl TestId {
    /// Creates an identifier from its parts.
    #[must_use]
    pub fn new(workflow: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            test: test.into(),
        }
    }
}

impl FromStr for TestId {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DataError::MalformedTestId { id: s.to_string() };
        let (workflow, test) = s.trim().split_once(':').ok_or_else(malformed)?;
        if workflow.is_empty() || test.is_empty() || test.contains(':') {
            return Err(malformed());
        }
        Ok(Self::new(workflow, test))
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workflow, self.test)
    }
}

/// The input repositories a test needs.
///
/// Either a single name, a list of names, or a map of label to name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestInputs {
    /// One repository.
    Single(String),
    /// Several unlabeled repositories.
    List(Vec<String>),
    /// Repositories addressed by label.
    Labeled(BTreeMap<String, String>),
}

impl TestInputs {
    /// Returns the required repository names, without duplicates.
    #[must_use]
    pub fn repositories(&self) -> Vec<&str> {
        let names: Vec<&str> = match self {
            Self::Single(name) => vec![name.as_str()],
            Self::List(names) => names.iter().map(String::as_str).collect(),
            Self::Labeled(map) => map.values().map(String::as_str).collect(),
        };
        let mut seen = Vec::with_capacity(names.len());
        for name in names {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Maps every accepted label to its repository.
    ///
    /// A repository name is always accepted as its own label.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<&str, &str> {
        let mut labels: BTreeMap<&str, &str> =
            self.repositories().into_iter().map(|r| (r, r)).collect();
        if let Self::Labeled(map) = self {
            for (label, repo) in map {
                labels.insert(label.as_str(), repo.as_str());
            }
        }
        labels
    }
}

/// One test definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTest {
    /// Input repositories.
    pub inputs: TestInputs,
    /// Run configuration file, relative to the test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runconfig: Option<String>,
    /// Follow-on runs that share this test's inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Workflow {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    tests: BTreeMap<String, WorkflowTest>,
}

/// Tests grouped by workflow.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    workflows: BTreeMap<String, Workflow>,
}

impl TestCatalog {
    /// Loads `workflowtests.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DataError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&content, &path.display().to_string())
    }

    /// Parses catalog JSON; `origin` names the source in errors.
    pub fn from_json_str(content: &str, origin: &str) -> Result<Self, DataError> {
        let workflows = serde_json::from_str(content).map_err(|e| DataError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { workflows })
    }

    /// Returns the workflow names.
    pub fn workflows(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    /// Returns the workflow's declared type, if any.
    pub fn workflow_type(&self, workflow: &str) -> Result<Option<&str>, DataError> {
        Ok(self.workflow(workflow)?.kind.as_deref())
    }

    /// Returns the test names under a workflow.
    pub fn tests(&self, workflow: &str) -> Result<Vec<&str>, DataError> {
        Ok(self.workflow(workflow)?.tests.keys().map(String::as_str).collect())
    }

    /// Looks up one test.
    pub fn get(&self, id: &TestId) -> Result<&WorkflowTest, DataError> {
        self.workflow(&id.workflow)?
            .tests
            .get(&id.test)
            .ok_or_else(|| DataError::UnknownTest {
                workflow: id.workflow.clone(),
                test: id.test.clone(),
            })
    }

    fn workflow(&self, name: &str) -> Result<&Workflow, DataError> {
        self.workflows.get(name).ok_or_else(|| DataError::UnknownWorkflow {
            workflow: name.to_string(),
        })
    }
}
