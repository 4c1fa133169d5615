//! Runs and the run registry.
//!
//! A Run is an external metadata record (a data-taking run). The registry is
//! the ordered list of runs that workers hand to one another: a filtering
//! worker replaces it wholesale, later workers read what is left.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::DataMap;

/// A single run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run type (e.g. "Las", "CIS", "cesium")
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Run number, unique within a run type
    pub number: i64,

    /// When the run was taken (epoch when unknown)
    #[serde(default)]
    pub timestamp: DateTime<Utc>,

    /// Open-ended data; workers may add keys after construction
    #[serde(default)]
    pub data: DataMap,
}

impl Run {
    /// Create a run with an unknown timestamp and no data
    pub fn new(kind: impl Into<String>, number: i64) -> Self {
        Self {
            kind: kind.into(),
            number,
            timestamp: DateTime::<Utc>::default(),
            data: DataMap::new(),
        }
    }

    /// Set the run timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a data entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run{{number: {}, type: {}, time: {}, data: {}}}",
            self.number,
            self.kind,
            self.timestamp.to_rfc3339(),
            serde_json::to_string(&self.data).unwrap_or_default()
        )
    }
}

/// Ordered list of runs shared between workers of one pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRegistry {
    runs: Vec<Run>,
}

impl RunRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list
    pub fn replace(&mut self, runs: Vec<Run>) {
        self.runs = runs;
    }

    /// All runs in registry order
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Iterate over runs in registry order
    pub fn iter(&self) -> std::slice::Iter<'_, Run> {
        self.runs.iter()
    }

    /// Runs of a given type, in registry order
    pub fn of_kind(&self, kind: &str) -> Vec<&Run> {
        self.runs.iter().filter(|r| r.kind == kind).collect()
    }

    /// Find a run by number
    pub fn get(&self, number: i64) -> Option<&Run> {
        self.runs.iter().find(|r| r.number == number)
    }

    /// Find a run by number for in-place updates
    pub fn get_mut(&mut self, number: i64) -> Option<&mut Run> {
        self.runs.iter_mut().find(|r| r.number == number)
    }

    /// Remove every run with this number, whatever its type.
    ///
    /// Returns how many runs were removed.
    pub fn remove(&mut self, number: i64) -> usize {
        let before = self.runs.len();
        self.runs.retain(|r| r.number != number);
        before - self.runs.len()
    }

    /// Sort by run number (stable)
    pub fn sort_by_number(&mut self) {
        self.runs.sort_by_key(|r| r.number);
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the registry holds no runs
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl From<Vec<Run>> for RunRegistry {
    fn from(runs: Vec<Run>) -> Self {
        Self { runs }
    }
}

impl<'a> IntoIterator for &'a RunRegistry {
    type Item = &'a Run;
    type IntoIter = std::slice::Iter<'a, Run>;

    fn into_iter(self) -> Self::IntoIter {
        self.runs.iter()
    }
}
