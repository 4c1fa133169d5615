//! Command-line interface for tucs.
//!
//! Provides commands for running jobs, checking graph descriptions,
//! printing region trees and showing the resolved configuration.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config;
use crate::core::GraphSpec;
use crate::domain::RegionKind;
use crate::job::Job;

/// tucs - region-graph calibration pipelines
#[derive(Parser, Debug)]
#[command(name = "tucs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job
    Run {
        /// Job file (YAML)
        job: PathBuf,

        /// Artifact directory (overrides the job and the config)
        #[arg(short, long, env = "TUCS_WORKDIR")]
        workdir: Option<PathBuf>,
    },

    /// Build a graph description and report asymmetric edges
    Check {
        /// Graph file (YAML)
        graph: PathBuf,
    },

    /// Print the region tree of a graph description
    Tree {
        /// Graph file (YAML)
        graph: PathBuf,

        /// Levels to print (0 or negative prints everything)
        #[arg(short, long, default_value = "-1", allow_hyphen_values = true)]
        depth: i32,

        /// Alias index used for names and hashes
        #[arg(long, default_value = "0")]
        view: usize,

        /// Hierarchy to follow
        #[arg(short, long, default_value = "readout")]
        kind: RegionKind,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { job, workdir } => run_job(&job, workdir),
            Commands::Check { graph } => check_graph(&graph),
            Commands::Tree {
                graph,
                depth,
                view,
                kind,
            } => print_tree(&graph, depth, view, kind),
            Commands::Config => show_config(),
        }
    }
}

/// Load, build and run a job
fn run_job(path: &Path, workdir: Option<PathBuf>) -> Result<()> {
    let mut job = Job::from_file(path)?;
    if workdir.is_some() {
        job.workdir = workdir;
    } else if job.workdir.is_none() {
        job.workdir = Some(config::workdir()?);
    }

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let mut pipeline = job.build_pipeline(base_dir)?;
    info!(job = %job.name, workers = ?pipeline.worker_names(), "Starting job");

    pipeline
        .run()
        .with_context(|| format!("Job '{}' failed", job.name))?;

    eprintln!("\n[Job {} completed: {} runs left]", job.name, pipeline.runs().len());
    Ok(())
}

/// Build a graph and report every one-sided edge
fn check_graph(path: &Path) -> Result<()> {
    let built = GraphSpec::from_file(path)?
        .build()
        .with_context(|| format!("Failed to build graph: {}", path.display()))?;

    let problems = built.graph.consistency_check();
    for problem in &problems {
        println!("{}", problem);
    }

    if !problems.is_empty() {
        anyhow::bail!("{} asymmetric edge(s) in {}", problems.len(), path.display());
    }

    println!("{}: {} regions, consistent", path.display(), built.graph.len());
    Ok(())
}

/// Print the region tree below the root
fn print_tree(path: &Path, depth: i32, view: usize, kind: RegionKind) -> Result<()> {
    let built = GraphSpec::from_file(path)?
        .build()
        .with_context(|| format!("Failed to build graph: {}", path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    built
        .graph
        .write_tree(&mut out, built.root, depth, view, 0, kind)
        .context("Failed to print tree")?;
    out.flush()?;

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("tucs configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Work dir: {}", cfg.workdir.display());
    println!();
    println!("Log filter: {}", cfg.log_filter);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree_command() {
        let cli = Cli::parse_from(["tucs", "tree", "g.yaml", "--depth", "-1", "--kind", "physical"]);
        match cli.command {
            Commands::Tree { graph, depth, view, kind } => {
                assert_eq!(graph, PathBuf::from("g.yaml"));
                assert_eq!(depth, -1);
                assert_eq!(view, 0);
                assert_eq!(kind, RegionKind::Physical);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["tucs", "tree", "g.yaml", "--kind", "nope"]).is_err());
    }
}
