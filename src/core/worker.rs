//! Worker contract.
//!
//! A worker is one pipeline stage. The pipeline drives it through
//! `on_start`, then `on_region` for every region of its kind (post-order),
//! then `on_stop`.

use anyhow::Result;

use crate::domain::{Event, RegionKind, RunRegistry};

use super::graph::{RegionGraph, RegionId};

/// State handed to every worker hook
pub struct Context<'a> {
    /// The region hierarchy; workers attach events through it
    pub graph: &'a mut RegionGraph,

    /// Runs left by earlier workers
    pub runs: &'a mut RunRegistry,
}

impl<'a> Context<'a> {
    pub fn new(graph: &'a mut RegionGraph, runs: &'a mut RunRegistry) -> Self {
        Self { graph, runs }
    }

    /// View-0, ordinal-0 identity hash of a region, following parents of
    /// the region's own kind whatever hierarchy it was reached through
    pub fn hash(&self, region: RegionId) -> Result<String> {
        self.hash_view(region, 0)
    }

    /// Like [`Context::hash`] for another alias view
    pub fn hash_view(&self, region: RegionId, view: usize) -> Result<String> {
        let kind = self.graph.region(region)?.kind();
        Ok(self.graph.hash(region, view, kind, 0)?)
    }

    /// Attach an event to a region
    pub fn add_event(&mut self, region: RegionId, event: Event) -> Result<()> {
        Ok(self.graph.add_event(region, event)?)
    }
}

/// A pipeline stage
pub trait Worker {
    /// Name used in logs and error context
    fn name(&self) -> &str;

    /// Hierarchy kind this worker is driven against; fixed for its lifetime
    fn kind(&self) -> RegionKind;

    /// Called once before any region
    fn on_start(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once per matching region, children before parents
    fn on_region(&mut self, ctx: &mut Context<'_>, region: RegionId) -> Result<()>;

    /// Called once after the region pass
    fn on_stop(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }
}

impl<W: Worker + ?Sized> Worker for Box<W> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> RegionKind {
        (**self).kind()
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        (**self).on_start(ctx)
    }

    fn on_region(&mut self, ctx: &mut Context<'_>, region: RegionId) -> Result<()> {
        (**self).on_region(ctx, region)
    }

    fn on_stop(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        (**self).on_stop(ctx)
    }
}
