//! tucs - region-graph calibration pipelines
//!
//! A detector is modelled as a graph of regions (partitions, modules,
//! channels, gains) organised into several hierarchies. Workers walk the
//! graph one after another and attach events (run-tagged data) to regions.
//!
//! # Architecture
//!
//! - Regions live in an arena and are addressed by id; every edge is tagged
//!   with the kind of region it points to
//! - Each region has a memoized identity hash built from its ancestors' names
//! - Workers are visited children-first over the regions of their kind
//! - Runs are shared between workers through an explicit registry
//!
//! # Modules
//!
//! - `adapters`: Artifact store and run metadata boundaries
//! - `core`: Graph, traversal, worker contract, pipeline, artifact cache
//! - `domain`: Data structures (RegionKind, Event, Run)
//! - `workers`: Filter, print and laser ingest stages
//! - `job`: YAML job descriptions
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a job
//! tucs run jobs/laser.yaml
//!
//! # Check a graph description
//! tucs check detector.yaml
//!
//! # Print two levels of the read-out tree
//! tucs tree detector.yaml --depth 2
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod job;
pub mod workers;

// Re-export main types at crate root for convenience
pub use crate::core::{Context, GraphSpec, Pipeline, Region, RegionGraph, RegionId, Worker};
pub use crate::domain::{DataMap, Event, RegionKind, Run, RunRegistry};
pub use crate::job::Job;
