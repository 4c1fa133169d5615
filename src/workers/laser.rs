//! Laser calibration ingest.
//!
//! Reads per-run laser calibration artifacts (`tileCalibLAS_<run>_Las.0.json`
//! in the work directory) and attaches their per-region values as events.
//! Runs without an artifact are dropped from the registry in `on_start`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::artifact_store::{ArtifactStore, FsArtifactStore, Tree};
use crate::core::{ArtifactCache, Context, RegionId, Worker};
use crate::domain::{Event, RegionKind, Run};

/// Value of the `source` key on events written by this worker
pub const LASER_SOURCE: &str = "laser";

fn default_tree() -> String {
    "h3000".to_string()
}

/// Laser ingest options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserConfig {
    /// Directory holding the artifacts; the configured work dir when unset
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Payload tree to read from each artifact
    #[serde(default = "default_tree")]
    pub tree: String,

    /// Reference diode, recorded on every event
    #[serde(default)]
    pub diode: u32,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            tree: default_tree(),
            diode: 0,
            verbose: false,
        }
    }
}

/// Artifact file name for a run
pub fn artifact_name(run: i64) -> String {
    format!("tileCalibLAS_{}_Las.0.json", run)
}

/// Laser calibration reader
pub struct Laser<S: ArtifactStore<Payload = Tree> = FsArtifactStore> {
    kind: RegionKind,
    config: LaserConfig,
    cache: ArtifactCache<S>,
    /// Region hashes matched so far, per kept run
    matches: BTreeMap<i64, Vec<String>>,
}

impl Laser<FsArtifactStore> {
    /// Reader over JSON artifacts in `workdir`
    pub fn new(kind: RegionKind, config: LaserConfig, workdir: PathBuf) -> Self {
        Self::with_store(kind, config, FsArtifactStore::new(), workdir)
    }
}

impl<S: ArtifactStore<Payload = Tree>> Laser<S> {
    pub fn with_store(kind: RegionKind, config: LaserConfig, store: S, workdir: PathBuf) -> Self {
        Self {
            kind,
            config,
            cache: ArtifactCache::new(store, workdir),
            matches: BTreeMap::new(),
        }
    }

    /// Kept runs and the region hashes matched for each
    pub fn matches(&self) -> &BTreeMap<i64, Vec<String>> {
        &self.matches
    }

    fn calibration_event(&self, run: &Run, hash: &str, value: &serde_json::Value) -> Event {
        let mut event = Event::new(run.clone())
            .with_data("source", LASER_SOURCE)
            .with_data("region", hash)
            .with_data("diode", self.config.diode);

        match value.as_object() {
            Some(fields) => {
                for (key, v) in fields {
                    event.data.insert(key.clone(), v.clone());
                }
            }
            None => {
                event.data.insert("value".to_string(), value.clone());
            }
        }
        event
    }
}

impl<S: ArtifactStore<Payload = Tree>> Worker for Laser<S> {
    fn name(&self) -> &str {
        "laser"
    }

    fn kind(&self) -> RegionKind {
        self.kind
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        info!(runs = ctx.runs.len(), dir = %self.cache.dir().display(), "Looking for laser artifacts");
        self.matches.clear();

        let numbers: Vec<i64> = ctx.runs.iter().map(|r| r.number).collect();
        for number in numbers {
            let file = artifact_name(number);
            if self.cache.dir().join(&file).exists() {
                if let Some(run) = ctx.runs.get_mut(number) {
                    run.data.insert("filename".to_string(), file.clone().into());
                }
                self.matches.insert(number, Vec::new());
                debug!(run = number, %file, "Found artifact");
            } else {
                info!(run = number, "Not processed yet, removing");
                ctx.runs.remove(number);
            }
        }

        Ok(())
    }

    fn on_region(&mut self, ctx: &mut Context<'_>, region: RegionId) -> Result<()> {
        let hash = ctx.hash(region)?;

        // Runs seeded on this region by an earlier worker
        let runs: Vec<Run> = ctx
            .graph
            .region(region)?
            .events()
            .iter()
            .filter(|e| e.data_str("source") != Some(LASER_SOURCE))
            .filter(|e| self.matches.contains_key(&e.run.number))
            .map(|e| ctx.runs.get(e.run.number).cloned().unwrap_or_else(|| e.run.clone()))
            .collect();

        for run in runs {
            let file = run
                .data
                .get("filename")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| artifact_name(run.number));

            let artifact = match self.cache.get(&file, &self.config.tree) {
                Ok(artifact) => artifact,
                Err(e) => {
                    warn!(run = run.number, error = %e, "Skipping run without payload");
                    continue;
                }
            };

            let Some(value) = artifact.payload.get(&hash) else {
                if self.config.verbose {
                    debug!(run = run.number, %hash, "No laser value for region");
                }
                continue;
            };

            let event = self.calibration_event(&run, &hash, value);
            ctx.add_event(region, event)?;
            if let Some(matched) = self.matches.get_mut(&run.number) {
                matched.push(hash.clone());
            }
        }

        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        for (run, regions) in &self.matches {
            info!(run, regions = regions.len(), "Laser values attached");
        }

        self.cache.release().context("Failed to release laser artifacts")
    }
}
