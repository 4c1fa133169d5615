//! Run and region selection.
//!
//! The filter worker is usually first in a pipeline. It asks a run source for
//! the candidate runs, keeps those of the requested type and seeds every
//! selected region with one event per run. The surviving run list is
//! published to the registry for later workers.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::run_source::{RunQuery, RunSource};
use crate::core::{Context, RegionId, Worker};
use crate::domain::{Event, RegionKind, Run};

/// Run type that matches every run
pub const ALL_RUN_TYPES: &str = "all";

/// Number of characters per module entry in a `digifrags` string
const DIGIFRAG_WIDTH: usize = 6;

/// Modules in a fully read-out detector
const DIGIFRAG_FULL: usize = 256;

fn default_run_type() -> String {
    ALL_RUN_TYPES.to_string()
}

/// Filter options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Comma-separated hash substrings; empty selects the whole detector
    #[serde(default)]
    pub region: String,

    /// Run type to keep ("all" keeps everything)
    #[serde(default = "default_run_type")]
    pub run_type: String,

    /// Only keep the highest-numbered run
    #[serde(default)]
    pub last_only: bool,

    /// Skip regions that were not read out in a run
    #[serde(default)]
    pub keep_only_active: bool,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            run_type: default_run_type(),
            last_only: false,
            keep_only_active: false,
            verbose: false,
        }
    }
}

impl FilterConfig {
    /// Region substrings, split on commas
    pub fn regions(&self) -> Vec<String> {
        self.region
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    fn accepts(&self, run: &Run) -> bool {
        self.run_type == ALL_RUN_TYPES || run.kind == self.run_type || run.kind.is_empty()
    }
}

/// Selects runs and regions
pub struct Filter {
    kind: RegionKind,
    config: FilterConfig,
    regions: Vec<String>,
    source: Box<dyn RunSource>,
    query: RunQuery,
    runs: Vec<Run>,
    /// `digifrags` per run number, for `keep_only_active`
    flags: HashMap<i64, String>,
    keep_only_active: bool,
}

impl Filter {
    pub fn new(kind: RegionKind, config: FilterConfig, source: Box<dyn RunSource>, query: RunQuery) -> Self {
        Self {
            kind,
            regions: config.regions(),
            keep_only_active: config.keep_only_active,
            config,
            source,
            query,
            runs: Vec::new(),
            flags: HashMap::new(),
        }
    }

    /// Runs kept by `on_start`
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    fn wants_region(&self, ctx: &Context<'_>, region: RegionId) -> Result<bool> {
        if self.regions.is_empty() {
            return Ok(true);
        }

        let primary = ctx.hash(region)?;
        // Regions without a second alias only match on their primary hash.
        let secondary = ctx.hash_view(region, 1).ok();

        Ok(self.regions.iter().any(|wanted| {
            primary.contains(wanted.as_str())
                || secondary.as_deref().map_or(false, |h| h.contains(wanted.as_str()))
        }))
    }

    /// Whether the region named by `hash` was read out in `run`.
    ///
    /// Runs without module flags count every region as active.
    fn is_active(&self, hash: &str, run: i64) -> bool {
        let flags = match self.flags.get(&run) {
            Some(flags) if !flags.is_empty() => flags,
            _ => return true,
        };

        if hash == "TILECAL" {
            return true;
        }
        if !hash.contains('B') {
            warn!(hash, "Unknown hash, treating region as inactive");
            return false;
        }

        let partition: u16 = if hash.contains("LBA") {
            0x1
        } else if hash.contains("LBC") {
            0x2
        } else if hash.contains("EBA") {
            0x3
        } else if hash.contains("EBC") {
            0x4
        } else {
            0x0
        };

        let Some(idx) = hash.find("_m") else {
            // partition-level region
            return true;
        };
        let Some(module) = hash
            .get(idx + 2..idx + 4)
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|m| *m > 0)
        else {
            warn!(hash, "Malformed module number, treating region as inactive");
            return false;
        };

        let code = format!("0x{:x}", (partition << 8) + module - 1);
        flags.contains(&code)
    }
}

impl Worker for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    fn kind(&self) -> RegionKind {
        self.kind
    }

    fn on_start(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        let mut candidates = self
            .source
            .query(&self.query)
            .context("Failed to query run metadata")?;

        if self.config.last_only {
            if let Some(last) = candidates.iter().max_by_key(|r| r.number).cloned() {
                candidates = vec![last];
            }
        }

        self.runs.clear();
        self.flags.clear();
        self.keep_only_active = self.config.keep_only_active;
        for run in candidates {
            if self.config.keep_only_active && (run.kind == self.config.run_type || run.kind.is_empty()) {
                let digifrags = run
                    .data
                    .get("digifrags")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let modules = digifrags.len() / DIGIFRAG_WIDTH;
                if self.config.verbose || modules != DIGIFRAG_FULL {
                    info!(run = run.number, modules, "Modules in readout");
                }
                if digifrags.is_empty() {
                    // no readout information: stop filtering on it
                    self.keep_only_active = false;
                }
                self.flags.insert(run.number, digifrags);
            }

            if self.config.accepts(&run) {
                self.runs.push(run);
            }
        }

        if self.regions.is_empty() {
            info!(runs = self.runs.len(), "Filter: using the whole detector");
        } else {
            info!(runs = self.runs.len(), regions = ?self.regions, "Filter: only using selected regions");
        }
        for run in &self.runs {
            debug!(%run, "Selected run");
        }

        Ok(())
    }

    fn on_region(&mut self, ctx: &mut Context<'_>, region: RegionId) -> Result<()> {
        if self.wants_region(ctx, region)? {
            let hash = ctx.hash(region)?;

            for run in &self.runs {
                if self.keep_only_active && !self.is_active(&hash, run.number) {
                    if self.config.verbose {
                        debug!(%hash, run = run.number, "Region not in readout, skipping");
                    }
                    continue;
                }
                // laser events only go to ADC regions
                if self.config.run_type == "Las" && !hash.contains("gain") {
                    continue;
                }

                ctx.add_event(region, Event::new(run.clone()).with_data("region", hash.clone()))?;
            }
        }

        ctx.runs.replace(self.runs.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::run_source::RunCatalog;
    use crate::core::{Region, RegionGraph};
    use crate::domain::RunRegistry;

    use RegionKind::Readout;

    fn catalog() -> Box<dyn RunSource> {
        Box::new(RunCatalog::new(vec![
            Run::new("Las", 10).with_data("digifrags", "0x100 0x101 "),
            Run::new("CIS", 20),
            Run::new("Las", 30),
        ]))
    }

    fn all_runs() -> RunQuery {
        RunQuery {
            numbers: Some(vec![10, 20, 30]),
            ..Default::default()
        }
    }

    /// TILECAL > LBA > m01 > c01_lowgain, plus LBA > m02
    fn detector() -> (RegionGraph, RegionId, RegionId, RegionId, RegionId) {
        let mut graph = RegionGraph::new();
        let root = graph.add_region(Region::named(Readout, "TILECAL"));
        let lba = graph.add_region(Region::named(Readout, "LBA"));
        let m01 = graph.add_region(Region::new(Readout, "m01", ["LBA01"]));
        let m02 = graph.add_region(Region::named(Readout, "m02"));
        let adc = graph.add_region(Region::named(Readout, "c01_lowgain"));
        graph.link(root, lba).unwrap();
        graph.link(lba, m01).unwrap();
        graph.link(lba, m02).unwrap();
        graph.link(m01, adc).unwrap();
        (graph, root, m01, m02, adc)
    }

    #[test]
    fn test_config_defaults_and_regions() {
        let config: FilterConfig = serde_yaml::from_str("region: 'LBA_m01, EBC'").unwrap();
        assert_eq!(config.run_type, "all");
        assert_eq!(config.regions(), vec!["LBA_m01", "EBC"]);
        assert!(FilterConfig::default().regions().is_empty());
    }

    #[test]
    fn test_start_keeps_matching_types() {
        let (mut graph, _, _, _, _) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            run_type: "Las".to_string(),
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());

        filter.on_start(&mut Context::new(&mut graph, &mut runs)).unwrap();
        let numbers: Vec<i64> = filter.runs().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![10, 30]);
    }

    #[test]
    fn test_last_only() {
        let (mut graph, _, _, _, _) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            last_only: true,
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());

        filter.on_start(&mut Context::new(&mut graph, &mut runs)).unwrap();
        assert_eq!(filter.runs().len(), 1);
        assert_eq!(filter.runs()[0].number, 30);
    }

    #[test]
    fn test_region_selection_and_publish() {
        let (mut graph, _, m01, m02, _) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            region: "LBA_m01".to_string(),
            run_type: "CIS".to_string(),
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());
        let mut ctx = Context::new(&mut graph, &mut runs);

        filter.on_start(&mut ctx).unwrap();
        filter.on_region(&mut ctx, m01).unwrap();
        filter.on_region(&mut ctx, m02).unwrap();

        assert_eq!(ctx.runs.len(), 1);
        let events = ctx.graph.region(m01).unwrap().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run.number, 20);
        assert_eq!(events[0].data_str("region"), Some("TILECAL_LBA_m01"));
        assert!(ctx.graph.region(m02).unwrap().events().is_empty());
    }

    #[test]
    fn test_region_selection_on_second_view() {
        let mut graph = RegionGraph::new();
        let root = graph.add_region(Region::new(Readout, "TILECAL", ["ATLAS"]));
        let m01 = graph.add_region(Region::new(Readout, "m01", ["LBA01"]));
        graph.link(root, m01).unwrap();
        let mut runs = RunRegistry::new();

        let config = FilterConfig {
            region: "ATLAS_LBA01".to_string(),
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());
        let mut ctx = Context::new(&mut graph, &mut runs);
        filter.on_start(&mut ctx).unwrap();
        filter.on_region(&mut ctx, m01).unwrap();

        assert_eq!(ctx.graph.region(m01).unwrap().events().len(), 3);
    }

    #[test]
    fn test_laser_runs_only_on_adc_regions() {
        let (mut graph, _, m01, _, adc) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            run_type: "Las".to_string(),
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());
        let mut ctx = Context::new(&mut graph, &mut runs);

        filter.on_start(&mut ctx).unwrap();
        filter.on_region(&mut ctx, adc).unwrap();
        filter.on_region(&mut ctx, m01).unwrap();

        assert_eq!(ctx.graph.region(adc).unwrap().events().len(), 2);
        assert!(ctx.graph.region(m01).unwrap().events().is_empty());
    }

    #[test]
    fn test_keep_only_active() {
        let (mut graph, _, m01, m02, _) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            run_type: "Las".to_string(),
            keep_only_active: true,
            ..Default::default()
        };
        let source: Box<dyn RunSource> = Box::new(RunCatalog::new(vec![
            Run::new("Las", 10).with_data("digifrags", "0x100 0x101 ")
        ]));
        let query = RunQuery {
            numbers: Some(vec![10]),
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, source, query);

        filter.on_start(&mut Context::new(&mut graph, &mut runs)).unwrap();
        assert!(filter.is_active("TILECAL_LBA_m01_c01_lowgain", 10));
        assert!(filter.is_active("TILECAL_LBA_m02", 10));
        assert!(!filter.is_active("TILECAL_LBA_m03", 10));
        assert!(!filter.is_active("TILECAL_LBC_m01", 10));
        assert!(filter.is_active("TILECAL_LBA", 10));
        assert!(filter.is_active("TILECAL", 10));
        assert!(filter.is_active("TILECAL_LBC_m01", 99));

        // m01 is read out but is not an ADC
        let mut ctx = Context::new(&mut graph, &mut runs);
        filter.on_region(&mut ctx, m01).unwrap();
        filter.on_region(&mut ctx, m02).unwrap();
        assert!(ctx.graph.region(m01).unwrap().events().is_empty());
    }

    #[test]
    fn test_empty_digifrags_disables_activity_check() {
        let (mut graph, _, _, _, _) = detector();
        let mut runs = RunRegistry::new();
        let config = FilterConfig {
            run_type: "Las".to_string(),
            keep_only_active: true,
            ..Default::default()
        };
        let mut filter = Filter::new(Readout, config, catalog(), all_runs());

        filter.on_start(&mut Context::new(&mut graph, &mut runs)).unwrap();
        assert!(!filter.keep_only_active);
    }
}
