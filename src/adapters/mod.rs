//! Boundaries to external collaborators.
//!
//! - `artifact_store`: opens calibration artifacts and reads payload trees
//! - `run_source`: answers run metadata queries

pub mod artifact_store;
pub mod run_source;

pub use artifact_store::{ArtifactError, ArtifactFile, ArtifactStore, FsArtifactStore, Tree};
pub use run_source::{read_run_numbers, RunCatalog, RunQuery, RunSelection, RunSource, SelectionError};
