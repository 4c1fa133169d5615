//! Region kinds.
//!
//! A kind tags every region of the hierarchy and selects which
//! parent/child edges apply when the hierarchy is walked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The hierarchy a region belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Read-out electronics (partitions, modules, channels, gains)
    Readout,

    /// Physical geometry (samples, towers)
    Physical,

    /// Building 175 test setup
    B175,

    /// Test-beam setup
    TestBeam,
}

impl RegionKind {
    /// Stable lowercase label, also used in hash cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Readout => "readout",
            Self::Physical => "physical",
            Self::B175 => "b175",
            Self::TestBeam => "test_beam",
        }
    }
}

impl Default for RegionKind {
    // Ambiguous regions are treated as read-out
    fn default() -> Self {
        Self::Readout
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readout" => Ok(Self::Readout),
            "physical" => Ok(Self::Physical),
            "b175" => Ok(Self::B175),
            "test_beam" | "testbeam" => Ok(Self::TestBeam),
            other => Err(format!("unknown region kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_and_display() {
        for kind in [
            RegionKind::Readout,
            RegionKind::Physical,
            RegionKind::B175,
            RegionKind::TestBeam,
        ] {
            assert_eq!(kind.as_str().parse::<RegionKind>().unwrap(), kind);
        }
        assert_eq!("TestBeam".parse::<RegionKind>().unwrap(), RegionKind::TestBeam);
        assert!("cells".parse::<RegionKind>().is_err());
    }

    #[test]
    fn test_kind_yaml_names() {
        let kind: RegionKind = serde_yaml::from_str("physical").unwrap();
        assert_eq!(kind, RegionKind::Physical);
        assert_eq!(RegionKind::default(), RegionKind::Readout);
    }
}
