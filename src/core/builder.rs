//! Declarative graph construction.
//!
//! A graph file lists regions by id, each with its kind, its aliases (view 0
//! first) and the ids of its children:
//!
//! ```yaml
//! root: tilecal
//! regions:
//!   - id: tilecal
//!     names: [TILECAL]
//!     children: [lba]
//!   - id: lba
//!     names: [LBA]
//! ```
//!
//! Every child edge is recorded on both ends.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::RegionKind;

use super::graph::{GraphError, Region, RegionGraph, RegionId};

/// Errors while turning a graph description into a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Duplicate region id '{0}'")]
    DuplicateId(String),

    #[error("Region '{parent}' lists unknown child '{child}'")]
    UnknownChild { parent: String, child: String },

    #[error("Root region '{0}' is not defined")]
    UnknownRoot(String),

    #[error("Region '{0}' has no names")]
    EmptyNames(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// One region of a graph description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub id: String,

    #[serde(default)]
    pub kind: RegionKind,

    /// Aliases, canonical name first
    pub names: Vec<String>,

    #[serde(default)]
    pub children: Vec<String>,
}

/// A whole graph description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub root: String,
    pub regions: Vec<RegionSpec>,
}

/// Result of a build: the graph, its root and the id table
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: RegionGraph,
    pub root: RegionId,
    pub ids: HashMap<String, RegionId>,
}

impl BuiltGraph {
    /// Region id for a description id
    pub fn lookup(&self, id: &str) -> Option<RegionId> {
        self.ids.get(id).copied()
    }
}

impl GraphSpec {
    /// Load a graph description from a YAML (or JSON) file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse graph file: {}", path.display()))
    }

    /// Parse a graph description
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Invalid graph description")
    }

    /// Build the graph
    pub fn build(&self) -> Result<BuiltGraph, BuildError> {
        let mut graph = RegionGraph::new();
        let mut ids = HashMap::with_capacity(self.regions.len());

        for spec in &self.regions {
            let mut names = spec.names.iter();
            let Some(canonical) = names.next() else {
                return Err(BuildError::EmptyNames(spec.id.clone()));
            };
            if ids.contains_key(&spec.id) {
                return Err(BuildError::DuplicateId(spec.id.clone()));
            }

            let id = graph.add_region(Region::new(spec.kind, canonical.as_str(), names.cloned()));
            ids.insert(spec.id.clone(), id);
        }

        for spec in &self.regions {
            let parent = ids[&spec.id];
            for child_id in &spec.children {
                let child = ids.get(child_id).copied().ok_or_else(|| BuildError::UnknownChild {
                    parent: spec.id.clone(),
                    child: child_id.clone(),
                })?;
                graph.link(parent, child)?;
            }
        }

        let root = ids
            .get(&self.root)
            .copied()
            .ok_or_else(|| BuildError::UnknownRoot(self.root.clone()))?;

        debug!(regions = graph.len(), root = %self.root, "Built region graph");
        Ok(BuiltGraph { graph, root, ids })
    }
}
