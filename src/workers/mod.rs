//! Pipeline stages.
//!
//! - Filter: selects runs and seeds regions with events
//! - Print: writes events to a stream
//! - Laser: attaches laser calibration values from artifacts

pub mod filter;
pub mod laser;
pub mod print;

pub use filter::{Filter, FilterConfig};
pub use laser::{Laser, LaserConfig};
pub use print::{Print, PrintConfig};
