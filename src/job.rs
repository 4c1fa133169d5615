//! Job definitions and loading.
//!
//! A job is a YAML file that names a graph description, a run catalog, a run
//! selection and an ordered list of workers. Paths are relative to the job
//! file's directory.
//!
//! ```yaml
//! name: laser-last-week
//! graph: detector.yaml
//! catalog: runs.yaml
//! runs: "-1 week"
//! workers:
//!   - type: filter
//!     run_type: Las
//!     region: EBC_m62
//!   - type: laser
//!   - type: print
//!     run_number: true
//!     data: true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::run_source::{RunCatalog, RunSelection};
use crate::core::{GraphSpec, Pipeline};
use crate::domain::RegionKind;
use crate::workers::{Filter, FilterConfig, Laser, LaserConfig, Print, PrintConfig};

/// One worker entry, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerSpec {
    Filter {
        #[serde(default)]
        kind: RegionKind,
        #[serde(flatten)]
        config: FilterConfig,
    },
    Print {
        #[serde(default)]
        kind: RegionKind,
        #[serde(flatten)]
        config: PrintConfig,
    },
    Laser {
        #[serde(default)]
        kind: RegionKind,
        #[serde(flatten)]
        config: LaserConfig,
    },
}

impl WorkerSpec {
    /// Worker type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::Print { .. } => "print",
            Self::Laser { .. } => "laser",
        }
    }
}

/// A complete job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job name (used in logs)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Graph description file
    pub graph: PathBuf,

    /// Run metadata file, required by filter workers
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Runs to select, required by filter workers
    #[serde(default)]
    pub runs: Option<RunSelection>,

    /// Default directory for calibration artifacts
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Ordered list of workers
    pub workers: Vec<WorkerSpec>,
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

impl Job {
    /// Load a job from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a job from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse job YAML")
    }

    /// Validate the job definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Job name cannot be empty");
        }

        if self.workers.is_empty() {
            anyhow::bail!("Job must have at least one worker");
        }

        let has_filter = self.workers.iter().any(|w| matches!(w, WorkerSpec::Filter { .. }));
        if has_filter {
            if self.catalog.is_none() {
                anyhow::bail!("Job '{}' has a filter worker but no run catalog", self.name);
            }
            if self.runs.is_none() {
                anyhow::bail!("Job '{}' has a filter worker but no run selection", self.name);
            }
        }

        Ok(())
    }

    /// Build the graph and workers. Relative paths resolve against `base_dir`.
    pub fn build_pipeline(&self, base_dir: &Path) -> Result<Pipeline> {
        self.validate()?;

        let built = GraphSpec::from_file(&resolve(base_dir, &self.graph))?
            .build()
            .with_context(|| format!("Failed to build graph for job '{}'", self.name))?;
        let mut pipeline = Pipeline::new(built.graph, built.root)?;

        let catalog = match &self.catalog {
            Some(path) => Some(RunCatalog::from_file(&resolve(base_dir, path))?),
            None => None,
        };
        let query = match &self.runs {
            Some(selection) => Some(selection.to_query(Utc::now(), base_dir)?),
            None => None,
        };
        let workdir = self
            .workdir
            .as_deref()
            .map(|dir| resolve(base_dir, dir))
            .unwrap_or_else(|| base_dir.to_path_buf());

        for (i, spec) in self.workers.iter().enumerate() {
            debug!(index = i, worker = spec.type_name(), "Adding worker");

            match spec {
                WorkerSpec::Filter { kind, config } => {
                    let (Some(catalog), Some(query)) = (&catalog, &query) else {
                        anyhow::bail!("Filter worker {} needs a run catalog and a run selection", i);
                    };
                    pipeline.add_worker(Filter::new(*kind, config.clone(), Box::new(catalog.clone()), query.clone()));
                }
                WorkerSpec::Print { kind, config } => {
                    pipeline.add_worker(Print::stdout(*kind, config.clone()));
                }
                WorkerSpec::Laser { kind, config } => {
                    let dir = config
                        .workdir
                        .as_deref()
                        .map(|dir| resolve(base_dir, dir))
                        .unwrap_or_else(|| workdir.clone());
                    pipeline.add_worker(Laser::new(*kind, config.clone(), dir));
                }
            }
        }

        info!(job = %self.name, workers = self.workers.len(), "Job ready");
        Ok(pipeline)
    }
}
