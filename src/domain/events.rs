//! Region annotations.
//!
//! Workers attach events to regions; later workers read them. Events are
//! never modified or removed once attached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::run::Run;

/// Free-form key/value payload carried by runs and events
pub type DataMap = BTreeMap<String, serde_json::Value>;

/// An annotation attached to a region by a worker.
///
/// The run is snapshotted when the event is created, so later changes to
/// the run registry are not reflected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The run this annotation belongs to
    pub run: Run,

    /// Worker-specific payload
    #[serde(default)]
    pub data: DataMap,
}

impl Event {
    /// Create an event with an empty payload
    pub fn new(run: Run) -> Self {
        Self {
            run,
            data: DataMap::new(),
        }
    }

    /// Add a payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Payload entry as a string, if present and a string
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}
