//! Pipeline orchestrator.
//!
//! Owns the region graph, the run registry and an ordered list of workers,
//! and drives each worker through its lifecycle, strictly one after another.

use anyhow::{Context as _, Result};
use tracing::{debug, info, instrument, warn};

use crate::domain::RunRegistry;

use super::graph::{GraphError, RegionGraph, RegionId};
use super::traverse;
use super::worker::{Context, Worker};

/// Sequential worker pipeline over one region graph
pub struct Pipeline {
    graph: RegionGraph,
    root: RegionId,
    runs: RunRegistry,
    workers: Vec<Box<dyn Worker>>,
}

impl Pipeline {
    /// Create a pipeline over `graph`, walking from `root`
    pub fn new(graph: RegionGraph, root: RegionId) -> Result<Self, GraphError> {
        graph.region(root)?;

        Ok(Self {
            graph,
            root,
            runs: RunRegistry::new(),
            workers: Vec::new(),
        })
    }

    /// Seed the run registry
    pub fn with_runs(mut self, runs: RunRegistry) -> Self {
        self.runs = runs;
        self
    }

    /// Register a worker; workers run in registration order
    pub fn add_worker<W: Worker + 'static>(&mut self, worker: W) {
        self.workers.push(Box::new(worker));
    }

    /// Register an already boxed worker
    pub fn add_boxed(&mut self, worker: Box<dyn Worker>) {
        self.workers.push(worker);
    }

    /// Names of registered workers, in order
    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// The region graph
    pub fn graph(&self) -> &RegionGraph {
        &self.graph
    }

    /// Root region of the walk
    pub fn root(&self) -> RegionId {
        self.root
    }

    /// The run registry as left by the last worker
    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Take the graph and registry back
    pub fn into_parts(self) -> (RegionGraph, RunRegistry) {
        (self.graph, self.runs)
    }

    /// Run every worker in registration order.
    ///
    /// For each worker: `on_start` (an error aborts the run and `on_stop` is
    /// not called), the region pass, then `on_stop` (an error aborts the run).
    /// A failure during the region pass ends that pass early but does not by
    /// itself fail the run: it is logged, and the result of `on_stop` decides
    /// whether the pipeline continues.
    #[instrument(skip(self), fields(workers = self.workers.len()))]
    pub fn run(&mut self) -> Result<()> {
        let root = self.root;

        for worker in self.workers.iter_mut() {
            let name = worker.name().to_string();
            let kind = worker.kind();
            info!(worker = %name, %kind, "Running worker");

            worker
                .on_start(&mut Context::new(&mut self.graph, &mut self.runs))
                .with_context(|| format!("Worker '{}' failed to start", name))?;

            let mut visited = 0usize;
            let pass = traverse::for_each_of_kind(&mut self.graph, root, kind, |graph, region| {
                visited += 1;
                worker.on_region(&mut Context::new(graph, &mut self.runs), region)
            });

            if let Err(e) = pass {
                warn!(
                    worker = %name,
                    visited,
                    error = %format!("{:#}", e),
                    "Region pass failed; stop hook decides the outcome"
                );
            }

            worker
                .on_stop(&mut Context::new(&mut self.graph, &mut self.runs))
                .with_context(|| format!("Worker '{}' failed to stop", name))?;

            debug!(worker = %name, visited, runs = self.runs.len(), "Worker finished");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::Region;
    use crate::domain::{RegionKind, Run};

    struct Noop;

    impl Worker for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn kind(&self) -> RegionKind {
            RegionKind::Readout
        }

        fn on_region(&mut self, _ctx: &mut Context<'_>, _region: RegionId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pipeline_rejects_unknown_root() {
        let mut graph = RegionGraph::new();
        let root = graph.add_region(Region::named(RegionKind::Readout, "TILECAL"));
        assert!(Pipeline::new(RegionGraph::new(), root).is_err());
        assert!(Pipeline::new(graph, root).is_ok());
    }

    #[test]
    fn test_pipeline_keeps_registration_order() {
        let mut graph = RegionGraph::new();
        let root = graph.add_region(Region::named(RegionKind::Readout, "TILECAL"));
        let mut pipeline = Pipeline::new(graph, root)
            .unwrap()
            .with_runs(RunRegistry::from(vec![Run::new("Las", 1)]));
        pipeline.add_worker(Noop);
        pipeline.add_boxed(Box::new(Noop));

        assert_eq!(pipeline.worker_names(), vec!["noop", "noop"]);
        pipeline.run().unwrap();
        assert_eq!(pipeline.runs().len(), 1);
    }
}
