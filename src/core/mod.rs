//! Core engine.
//!
//! This module contains:
//! - RegionGraph: the region hierarchy and identity hashes
//! - Traversal: kind-filtered post-order walk
//! - Worker: the stage contract
//! - Pipeline: sequential worker execution
//! - ArtifactCache: memoized artifact handles
//! - Builder: graph construction from a description

pub mod artifact_cache;
pub mod builder;
pub mod graph;
pub mod pipeline;
pub mod traverse;
pub mod worker;

// Re-export commonly used types
pub use artifact_cache::{ArtifactCache, ArtifactKey, CachedArtifact};
pub use builder::{BuildError, BuiltGraph, GraphSpec, RegionSpec};
pub use graph::{Asymmetry, Edge, GraphError, HashKey, Region, RegionGraph, RegionId};
pub use pipeline::Pipeline;
pub use traverse::{collect_of_kind, for_each_of_kind};
pub use worker::{Context, Worker};
