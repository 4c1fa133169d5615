//! Artifact store boundary.
//!
//! Calibration workers read payload "trees" out of artifact files. The store
//! opens a file into a handle and looks a named tree up inside it; both steps
//! can fail. `FsArtifactStore` reads JSON documents of the form
//! `{ "trees": { "<tree>": { "<key>": <value>, ... } } }`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Failures while opening, reading or closing artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to open artifact {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse artifact {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact {} has no tree named '{name}'", path.display())]
    MissingTree { path: PathBuf, name: String },

    #[error("Failed to close artifact {}: {reason}", path.display())]
    Close { path: PathBuf, reason: String },
}

/// Source of artifact handles and payloads
pub trait ArtifactStore {
    /// An open artifact
    type Handle;

    /// A structured payload found inside an artifact
    type Payload;

    /// Open the artifact at `path`
    fn open(&mut self, path: &Path) -> Result<Self::Handle, ArtifactError>;

    /// Find the payload called `name` inside an open artifact
    fn lookup(&mut self, handle: &Self::Handle, name: &str) -> Result<Self::Payload, ArtifactError>;

    /// Release an open artifact
    fn close(&mut self, _handle: &Self::Handle) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// A parsed artifact file
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub document: serde_json::Value,
}

/// A named payload tree: key (usually a region hash) to value
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub name: String,
    pub entries: BTreeMap<String, serde_json::Value>,
}

impl Tree {
    /// Entry for a key
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }
}

/// JSON files on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for FsArtifactStore {
    type Handle = ArtifactFile;
    type Payload = Tree;

    fn open(&mut self, path: &Path) -> Result<ArtifactFile, ArtifactError> {
        let content = std::fs::read_to_string(path).map_err(|source| ArtifactError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let document = serde_json::from_str(&content).map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Opened artifact");
        Ok(ArtifactFile {
            path: path.to_path_buf(),
            document,
        })
    }

    fn lookup(&mut self, handle: &ArtifactFile, name: &str) -> Result<Tree, ArtifactError> {
        let missing = || ArtifactError::MissingTree {
            path: handle.path.clone(),
            name: name.to_string(),
        };

        let object = handle
            .document
            .get("trees")
            .and_then(|trees| trees.get(name))
            .and_then(|tree| tree.as_object())
            .ok_or_else(missing)?;

        Ok(Tree {
            name: name.to_string(),
            entries: object.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}
