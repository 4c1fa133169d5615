//! Domain types for the tucs engine.
//!
//! This module contains the plain data structures:
//! - RegionKind: Hierarchy tags
//! - Event: Region annotations
//! - Run: External run records and the registry workers share

pub mod events;
pub mod region;
pub mod run;

// Re-export commonly used types
pub use events::{DataMap, Event};
pub use region::RegionKind;
pub use run::{Run, RunRegistry};
