//! Event printer.

use std::io::{self, Write};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{Context, RegionId, Worker};
use crate::domain::{Event, RegionKind};

/// What to print for every event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub run_type: bool,
    pub run_number: bool,
    pub time: bool,
    pub data: bool,
    /// Prefix each line with the region hash
    pub region_hash: bool,
    /// Print the whole data map as JSON
    pub verbose: bool,
    /// Only regions whose hash contains this
    pub region: Option<String>,
    /// Only this data key
    pub data_key: Option<String>,
}

/// Writes the events of every region it visits
pub struct Print<W: Write = io::Stdout> {
    kind: RegionKind,
    config: PrintConfig,
    out: W,
    regions: usize,
    events: usize,
}

impl Print<io::Stdout> {
    /// Printer writing to stdout
    pub fn stdout(kind: RegionKind, config: PrintConfig) -> Self {
        Self::new(kind, config, io::stdout())
    }
}

impl<W: Write> Print<W> {
    pub fn new(kind: RegionKind, config: PrintConfig, out: W) -> Self {
        Self {
            kind,
            config,
            out,
            regions: 0,
            events: 0,
        }
    }

    /// Regions visited so far
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Events printed so far
    pub fn events(&self) -> usize {
        self.events
    }

    /// The underlying writer
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn render(&self, hash: &str, event: &Event) -> String {
        let mut fields = Vec::new();

        if self.config.region_hash {
            fields.push(hash.to_string());
        }
        if self.config.run_type {
            fields.push(event.run.kind.clone());
        }
        if self.config.run_number {
            fields.push(event.run.number.to_string());
        }
        if self.config.time {
            fields.push(event.run.timestamp.to_rfc3339());
        }

        if self.config.verbose {
            fields.push(serde_json::to_string(&event.data).unwrap_or_default());
        } else if self.config.data {
            fields.extend(
                event
                    .data
                    .iter()
                    .filter(|(k, _)| self.config.data_key.as_deref().map_or(true, |key| key == k.as_str()))
                    .map(|(k, v)| format!("{}: {}", k, v)),
            );
        }

        fields.join(", ")
    }
}

impl<W: Write> Worker for Print<W> {
    fn name(&self) -> &str {
        "print"
    }

    fn kind(&self) -> RegionKind {
        self.kind
    }

    fn on_region(&mut self, ctx: &mut Context<'_>, region: RegionId) -> Result<()> {
        self.regions += 1;

        let hash = ctx.hash(region)?;
        if let Some(wanted) = &self.config.region {
            if !hash.contains(wanted.as_str()) {
                return Ok(());
            }
        }

        let lines: Vec<String> = ctx
            .graph
            .region(region)?
            .events()
            .iter()
            .map(|event| self.render(&hash, event))
            .collect();

        for line in lines {
            writeln!(self.out, "{}", line).context("Failed to write event")?;
            self.events += 1;
        }

        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        self.out.flush().context("Failed to flush output")?;
        info!(regions = self.regions, events = self.events, "Printed events");
        Ok(())
    }
}
