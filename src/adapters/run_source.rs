//! Run metadata boundary.
//!
//! Filter workers ask a [`RunSource`] for the runs matching some criteria.
//! [`RunCatalog`] is an in-memory source loaded from a YAML or JSON file;
//! [`RunSelection`] is the user-facing way of writing criteria in a job file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Run;

/// Criteria for a run lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunQuery {
    /// Exact run numbers; when set, the date window is ignored
    pub numbers: Option<Vec<i64>>,

    /// Only runs strictly after this time
    pub since: Option<DateTime<Utc>>,

    /// Only runs strictly before this time
    pub until: Option<DateTime<Utc>>,

    /// Only runs of this type (window lookups only)
    pub run_type: Option<String>,
}

/// Anything that can answer run queries
pub trait RunSource {
    /// Runs matching `query`, ordered by run number
    fn query(&self, query: &RunQuery) -> Result<Vec<Run>>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    runs: Vec<Run>,
}

/// In-memory run metadata
#[derive(Debug, Clone, Default)]
pub struct RunCatalog {
    runs: Vec<Run>,
}

impl RunCatalog {
    pub fn new(runs: Vec<Run>) -> Self {
        Self { runs }
    }

    /// Load a catalog file (`runs: [...]`, YAML or JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run catalog: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse run catalog: {}", path.display()))
    }

    /// Parse catalog content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content).context("Invalid run catalog")?;
        Ok(Self::new(file.runs))
    }

    /// Number of known runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl RunSource for RunCatalog {
    /// Explicit numbers missing from the catalog come back as placeholder
    /// runs with an empty type and an epoch timestamp.
    fn query(&self, query: &RunQuery) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = match &query.numbers {
            Some(numbers) => numbers
                .iter()
                .map(|&number| {
                    self.runs
                        .iter()
                        .find(|r| r.number == number)
                        .cloned()
                        .unwrap_or_else(|| Run::new("", number))
                })
                .collect(),
            None => self
                .runs
                .iter()
                .filter(|r| query.since.map_or(true, |since| r.timestamp > since))
                .filter(|r| query.until.map_or(true, |until| r.timestamp < until))
                .filter(|r| query.run_type.as_deref().map_or(true, |t| r.kind == t))
                .cloned()
                .collect(),
        };

        runs.sort_by_key(|r| r.number);
        Ok(runs)
    }
}

/// Read a plain-text list of run numbers, one per line
pub fn read_run_numbers(path: &Path) -> Result<Vec<i64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run list: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.trim().parse::<i64>().with_context(|| {
                format!("{}:{}: not a run number: '{}'", path.display(), i + 1, line.trim())
            })
        })
        .collect()
}

/// Errors in a written run selection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Invalid relative period '{0}' (expected e.g. '-1 week' or '-7 days')")]
    InvalidPeriod(String),

    #[error("Invalid date '{0}' (expected RFC 3339 or YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Run selection is empty")]
    Empty,
}

/// Number of days before a single date that a window starts
pub const DEFAULT_WINDOW_DAYS: i64 = 28;

/// How a job names its runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunSelection {
    /// `runs: 12345`
    Number(i64),

    /// `runs: [12345, 12346]`
    Numbers(Vec<i64>),

    /// `runs: "-1 week"` (relative to now) or `runs: "2012-05-01"`
    /// (the window ending at that date)
    Period(String),

    /// `runs: { file: runs.txt }`
    File { file: PathBuf },

    /// `runs: { since: ..., until: ... }`
    Between { since: String, until: String },
}

impl RunSelection {
    /// Turn the selection into a query, relative to `now`. File paths are
    /// resolved against `base_dir`.
    pub fn to_query(&self, now: DateTime<Utc>, base_dir: &Path) -> Result<RunQuery> {
        let query = match self {
            Self::Number(number) => RunQuery {
                numbers: Some(vec![*number]),
                ..Default::default()
            },
            Self::Numbers(numbers) => {
                if numbers.is_empty() {
                    return Err(SelectionError::Empty.into());
                }
                RunQuery {
                    numbers: Some(numbers.clone()),
                    ..Default::default()
                }
            }
            Self::Period(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SelectionError::Empty.into());
                }
                if text.starts_with('-') {
                    let since = now
                        .checked_sub_signed(parse_period(text)?)
                        .ok_or_else(|| SelectionError::InvalidPeriod(text.to_string()))?;
                    RunQuery {
                        since: Some(since),
                        ..Default::default()
                    }
                } else {
                    let until = parse_date(text)?;
                    let since = Duration::try_days(DEFAULT_WINDOW_DAYS)
                        .and_then(|window| until.checked_sub_signed(window))
                        .ok_or_else(|| SelectionError::InvalidDate(text.to_string()))?;
                    RunQuery {
                        since: Some(since),
                        until: Some(until),
                        ..Default::default()
                    }
                }
            }
            Self::File { file } => {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                RunQuery {
                    numbers: Some(read_run_numbers(&path)?),
                    ..Default::default()
                }
            }
            Self::Between { since, until } => RunQuery {
                since: Some(parse_date(since)?),
                until: Some(parse_date(until)?),
                ..Default::default()
            },
        };

        Ok(query)
    }
}

/// Parse "-N unit" into a duration (units: hours, days, weeks, months)
pub fn parse_period(text: &str) -> Result<Duration, SelectionError> {
    let invalid = || SelectionError::InvalidPeriod(text.to_string());

    let body = text.trim().strip_prefix('-').ok_or_else(invalid)?;
    let mut parts = body.split_whitespace();
    let count: i64 = parts.next().and_then(|n| n.parse().ok()).ok_or_else(invalid)?;
    let unit = parts.next().ok_or_else(invalid)?;
    if parts.next().is_some() || count < 0 {
        return Err(invalid());
    }

    let duration = match unit.trim_end_matches('s') {
        "hour" => Duration::try_hours(count),
        "day" => Duration::try_days(count),
        "week" => Duration::try_weeks(count),
        "month" => count.checked_mul(30).and_then(Duration::try_days),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC)
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, SelectionError> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| SelectionError::InvalidDate(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = r#"
runs:
  - type: Las
    number: 300
    timestamp: 2012-05-10T00:00:00Z
    data:
      digifrags: "0x100 0x101"
  - type: CIS
    number: 100
    timestamp: 2012-04-01T00:00:00Z
  - type: Las
    number: 200
    timestamp: 2012-05-01T00:00:00Z
"#;

    fn now() -> DateTime<Utc> {
        parse_date("2012-05-15").unwrap()
    }

    #[test]
    fn test_catalog_numbers_with_placeholders() {
        let catalog = RunCatalog::from_yaml(CATALOG).unwrap();
        let runs = catalog
            .query(&RunQuery {
                numbers: Some(vec![300, 999, 100]),
                ..Default::default()
            })
            .unwrap();

        let numbers: Vec<i64> = runs.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![100, 300, 999]);
        assert_eq!(runs[2].kind, "");
        assert_eq!(runs[1].data["digifrags"], "0x100 0x101");
    }

    #[test]
    fn test_catalog_window_and_type() {
        let catalog = RunCatalog::from_yaml(CATALOG).unwrap();
        let runs = catalog
            .query(&RunQuery {
                since: Some(parse_date("2012-04-15").unwrap()),
                run_type: Some("Las".to_string()),
                ..Default::default()
            })
            .unwrap();

        let numbers: Vec<i64> = runs.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![200, 300]);
    }

    #[test]
    fn test_relative_period() {
        let query = RunSelection::Period("-1 week".to_string())
            .to_query(now(), Path::new("."))
            .unwrap();
        assert_eq!(query.since, Some(parse_date("2012-05-08").unwrap()));
        assert_eq!(query.until, None);

        assert_eq!(parse_period("-7 days").unwrap(), Duration::days(7));
        assert_eq!(parse_period("-12 hours").unwrap(), Duration::hours(12));
        assert!(parse_period("7 days").is_err());
        assert!(parse_period("-x days").is_err());
        assert!(parse_period("-3 fortnights").is_err());
    }

    #[test]
    fn test_out_of_range_period_is_an_error() {
        assert!(matches!(
            parse_period("-9999999999999999 weeks"),
            Err(SelectionError::InvalidPeriod(_))
        ));
        assert!(matches!(
            parse_period("-9223372036854775807 months"),
            Err(SelectionError::InvalidPeriod(_))
        ));

        // fits in a duration but not before `now`
        let err = RunSelection::Period("-106751991167 days".to_string())
            .to_query(now(), Path::new("."))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SelectionError>(),
            Some(SelectionError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_single_date_is_a_window() {
        let query = RunSelection::Period("2012-05-15".to_string())
            .to_query(now(), Path::new("."))
            .unwrap();
        assert_eq!(query.until, Some(now()));
        assert_eq!(query.since, Some(now() - Duration::days(DEFAULT_WINDOW_DAYS)));
    }

    #[test]
    fn test_selection_yaml_forms() {
        let s: RunSelection = serde_yaml::from_str("12345").unwrap();
        assert_eq!(s, RunSelection::Number(12345));

        let s: RunSelection = serde_yaml::from_str("[1, 2]").unwrap();
        assert_eq!(s, RunSelection::Numbers(vec![1, 2]));

        let s: RunSelection = serde_yaml::from_str("'-1 week'").unwrap();
        assert_eq!(s, RunSelection::Period("-1 week".to_string()));

        let s: RunSelection = serde_yaml::from_str("file: runs.txt").unwrap();
        assert_eq!(s, RunSelection::File { file: PathBuf::from("runs.txt") });

        let s: RunSelection = serde_yaml::from_str("since: 2012-01-01\nuntil: 2012-02-01").unwrap();
        assert!(matches!(s, RunSelection::Between { .. }));
    }

    #[test]
    fn test_run_numbers_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("runs.txt"), "100\n\n200\n").unwrap();

        let query = RunSelection::File {
            file: PathBuf::from("runs.txt"),
        }
        .to_query(now(), dir.path())
        .unwrap();
        assert_eq!(query.numbers, Some(vec![100, 200]));

        std::fs::write(dir.path().join("bad.txt"), "100\nabc\n").unwrap();
        let err = read_run_numbers(&dir.path().join("bad.txt")).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_empty_selection() {
        assert!(RunSelection::Numbers(Vec::new()).to_query(now(), Path::new(".")).is_err());
        assert!(RunSelection::Period("  ".to_string()).to_query(now(), Path::new(".")).is_err());
        assert!(parse_date("yesterday").is_err());
    }
}
