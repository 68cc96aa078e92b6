//! The data record catalog and its search.

use crate::core::CompiledPattern;
use crate::errors::{ConfigError, DataError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One downloadable test data repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Repository name.
    pub name: String,
    /// Free-form tags used for search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where the files are downloaded from.
    pub url: String,
    /// File name to content hash.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl DataRecord {
    /// Returns true if the record carries every tag in `group`.
    #[must_use]
    pub fn has_all_tags(&self, group: &[String]) -> bool {
        group.iter().all(|tag| self.tags.contains(tag))
    }
}

#[derive(Deserialize)]
struct DataFile {
    data: Vec<DataRecord>,
}

/// Search terms over a [`DataCatalog`].
///
/// A record is accepted if its name matches any of the name globs, or if it
/// carries every tag of any one tag group. `all` accepts everything and
/// cannot be combined with names or tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataQuery {
    /// Name globs (`*` and `?` wildcards).
    pub names: Vec<String>,
    /// Tag groups.
    pub tag_groups: Vec<Vec<String>>,
    /// Accept every record.
    pub all: bool,
}

impl DataQuery {
    /// Creates an empty query, which accepts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query accepting every record.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    /// Adds a name glob.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Adds a tag group.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_groups.push(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Checks that `all` is not mixed with other terms.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingOptions` if `all` is combined with names or tags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.all && (!self.names.is_empty() || !self.tag_groups.is_empty()) {
            return Err(ConfigError::conflicting(
                "'all' cannot be used in conjunction with 'tags' or 'names'",
            ));
        }
        Ok(())
    }
}

/// Records loaded from `workflowdata.json`.
#[derive(Debug, Clone, Default)]
pub struct DataCatalog {
    records: Vec<DataRecord>,
}

impl DataCatalog {
    /// Creates a catalog over the given records.
    #[must_use]
    pub fn new(records: Vec<DataRecord>) -> Self {
        Self { records }
    }

    /// Loads a catalog file of the form `{"data": [...]}`.
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
        let file: DataFile = serde_json::from_str(content).map_err(|e| DataError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(file.data))
    }

    /// Returns every record, in file order.
    #[must_use]
    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    /// Looks up a record by exact name.
    pub fn get(&self, name: &str) -> Result<&DataRecord, DataError> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| DataError::UnknownRecord {
                name: name.to_string(),
            })
    }

    /// Returns the records accepted by the query, in file order.
    pub fn search(&self, query: &DataQuery) -> Result<Vec<&DataRecord>, ConfigError> {
        query.validate()?;
        if query.all {
            return Ok(self.records.iter().collect());
        }

        let globs = query
            .names
            .iter()
            .map(CompiledPattern::from_glob)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .records
            .iter()
            .filter(|record| {
                globs.iter().any(|g| g.is_match(&record.name))
                    || query.tag_groups.iter().any(|group| record.has_all_tags(group))
            })
            .collect())
    }

    /// Returns the names of the records accepted by the query.
    pub fn names(&self, query: &DataQuery) -> Result<Vec<&str>, ConfigError> {
        Ok(self.search(query)?.into_iter().map(|r| r.name.as_str()).collect())
    }

    /// Returns the accepted records as JSON objects holding only `fields`.
    ///
    /// An empty field list returns whole records.
    pub fn search_fields(
        &self,
        query: &DataQuery,
        fields: &[String],
    ) -> Result<Vec<serde_json::Value>, ConfigError> {
        Ok(self
            .search(query)?
            .into_iter()
            .map(|record| project(record, fields))
            .collect())
    }
}

fn project(record: &DataRecord, fields: &[String]) -> serde_json::Value {
    let full = serde_json::json!(record);
    if fields.is_empty() {
        return full;
    }
    match full {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().filter(|(key, _)| fields.contains(key)).collect(),
        ),
        other => other,
    }
}
