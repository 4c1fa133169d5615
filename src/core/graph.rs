//! Region graph.
//!
//! Regions live in an arena owned by [`RegionGraph`] and refer to each other
//! through [`RegionId`]. A region may have several parents and several
//! children of different kinds; each edge records the kind of the region it
//! points to, so kind-filtered lookups never need to go back to the arena.
//!
//! Topology is set up once by a builder. After that only the event lists and
//! the identity-hash memo change.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

use crate::domain::{Event, RegionKind};

/// Index of a region inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(usize);

impl RegionId {
    /// Position of the region in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A parent or child edge, tagged with the kind of its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: RegionId,
    pub kind: RegionKind,
}

/// Memo key for identity hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub view: usize,
    pub kind: RegionKind,
    pub ordinal: usize,
}

/// Errors raised by graph lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("Region '{name}' has no alias at view {view} ({available} available)")]
    ViewOutOfRange {
        name: String,
        view: usize,
        available: usize,
    },

    #[error("Region '{name}' has no parent at ordinal {ordinal} ({available} parents)")]
    ParentOrdinalOutOfRange {
        name: String,
        ordinal: usize,
        available: usize,
    },

    #[error("Parent chain of region '{name}' loops back on itself")]
    ParentCycle { name: String },

    #[error("Child edges below region '{name}' form a cycle")]
    ChildCycle { name: String },
}

/// An edge recorded on one side only.
///
/// Returned by [`RegionGraph::consistency_check`]; never raised by the graph itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Asymmetry {
    /// `parent` lists `child` as a child, but `child` does not list `parent`
    #[error("'{parent_name}' lists '{child_name}' as a child, but '{child_name}' does not list it as a parent")]
    ChildNotParented {
        parent: RegionId,
        child: RegionId,
        parent_name: String,
        child_name: String,
    },

    /// `child` lists `parent` as a parent, but `parent` does not list `child`
    #[error("'{child_name}' lists '{parent_name}' as a parent, but '{parent_name}' does not list it as a child")]
    ParentNotChilding {
        child: RegionId,
        parent: RegionId,
        child_name: String,
        parent_name: String,
    },
}

/// A node of the hierarchy
#[derive(Debug)]
pub struct Region {
    names: Vec<String>,
    kind: RegionKind,
    parents: Vec<Edge>,
    children: Vec<Edge>,
    events: Vec<Event>,
    hashes: RefCell<HashMap<HashKey, String>>,
}

impl Region {
    /// Create a region with a canonical name (view 0) and optional aliases
    pub fn new<I, S>(kind: RegionKind, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = vec![name.into()];
        names.extend(aliases.into_iter().map(Into::into));

        Self {
            names,
            kind,
            parents: Vec::new(),
            children: Vec::new(),
            events: Vec::new(),
            hashes: RefCell::new(HashMap::new()),
        }
    }

    /// Create a region with a single name
    pub fn named(kind: RegionKind, name: impl Into<String>) -> Self {
        Self::new(kind, name, std::iter::empty::<String>())
    }

    /// Hierarchy kind of this region
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Canonical name (view 0)
    pub fn canonical_name(&self) -> &str {
        &self.names[0]
    }

    /// Alias at the given view index
    pub fn name(&self, view: usize) -> Result<&str, GraphError> {
        self.names
            .get(view)
            .map(String::as_str)
            .ok_or_else(|| GraphError::ViewOutOfRange {
                name: self.canonical_name().to_string(),
                view,
                available: self.names.len(),
            })
    }

    /// All aliases, view 0 first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Children of the given kind, in insertion order.
    ///
    /// Fallback policy: when no child has the requested kind, the whole child
    /// list is returned instead of an empty one. Callers cannot tell "no child
    /// of this kind" apart from "children are not partitioned by kind".
    pub fn children(&self, kind: RegionKind) -> Vec<RegionId> {
        let mut seen = HashSet::new();
        let matching: Vec<RegionId> = self
            .children
            .iter()
            .filter(|edge| edge.kind == kind && seen.insert(edge.target))
            .map(|edge| edge.target)
            .collect();

        if matching.is_empty() {
            self.children.iter().map(|edge| edge.target).collect()
        } else {
            matching
        }
    }

    /// Parent for the given kind.
    ///
    /// No parents gives `None`. Otherwise the first parent of `kind` wins; if
    /// none has that kind, the parent at `ordinal` is returned and an ordinal
    /// past the end is an error.
    pub fn parent(&self, kind: RegionKind, ordinal: usize) -> Result<Option<RegionId>, GraphError> {
        if self.parents.is_empty() {
            return Ok(None);
        }

        if let Some(edge) = self.parents.iter().find(|edge| edge.kind == kind) {
            return Ok(Some(edge.target));
        }

        self.parents
            .get(ordinal)
            .map(|edge| Some(edge.target))
            .ok_or_else(|| GraphError::ParentOrdinalOutOfRange {
                name: self.canonical_name().to_string(),
                ordinal,
                available: self.parents.len(),
            })
    }

    /// Raw child edges, insertion order
    pub fn child_edges(&self) -> &[Edge] {
        &self.children
    }

    /// Raw parent edges, insertion order
    pub fn parent_edges(&self) -> &[Edge] {
        &self.parents
    }

    /// Events attached so far, in append order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn cached_hash(&self, key: &HashKey) -> Option<String> {
        self.hashes.borrow().get(key).cloned()
    }
}

/// Arena of regions
#[derive(Debug, Default)]
pub struct RegionGraph {
    regions: Vec<Region>,
}

impl RegionGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region and return its id
    pub fn add_region(&mut self, region: Region) -> RegionId {
        self.regions.push(region);
        RegionId(self.regions.len() - 1)
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the graph holds no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// All region ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        (0..self.regions.len()).map(RegionId)
    }

    /// Look up a region
    pub fn region(&self, id: RegionId) -> Result<&Region, GraphError> {
        self.regions.get(id.0).ok_or(GraphError::UnknownRegion(id))
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region, GraphError> {
        self.regions.get_mut(id.0).ok_or(GraphError::UnknownRegion(id))
    }

    fn edges_to(&self, targets: &[RegionId]) -> Result<Vec<Edge>, GraphError> {
        targets
            .iter()
            .map(|&target| {
                self.region(target).map(|r| Edge {
                    target,
                    kind: r.kind,
                })
            })
            .collect()
    }

    /// Add child edges on `id` only. Edges already present are skipped.
    pub fn set_children(&mut self, id: RegionId, children: &[RegionId]) -> Result<(), GraphError> {
        let edges = self.edges_to(children)?;
        let region = self.region_mut(id)?;
        union_add(&mut region.children, edges);
        Ok(())
    }

    /// Add parent edges on `id` only. Edges already present are skipped.
    pub fn set_parents(&mut self, id: RegionId, parents: &[RegionId]) -> Result<(), GraphError> {
        let edges = self.edges_to(parents)?;
        let region = self.region_mut(id)?;
        union_add(&mut region.parents, edges);
        Ok(())
    }

    /// Add the edge in both directions
    pub fn link(&mut self, parent: RegionId, child: RegionId) -> Result<(), GraphError> {
        self.set_children(parent, &[child])?;
        self.set_parents(child, &[parent])
    }

    /// Shorthand for `region(id)?.children(kind)`
    pub fn children(&self, id: RegionId, kind: RegionKind) -> Result<Vec<RegionId>, GraphError> {
        Ok(self.region(id)?.children(kind))
    }

    /// Shorthand for `region(id)?.parent(kind, ordinal)`
    pub fn parent(&self, id: RegionId, kind: RegionKind, ordinal: usize) -> Result<Option<RegionId>, GraphError> {
        self.region(id)?.parent(kind, ordinal)
    }

    /// Shorthand for `region(id)?.name(view)`
    pub fn name(&self, id: RegionId, view: usize) -> Result<&str, GraphError> {
        self.region(id)?.name(view)
    }

    /// Attach an event to a region
    pub fn add_event(&mut self, id: RegionId, event: Event) -> Result<(), GraphError> {
        self.region_mut(id)?.events.push(event);
        Ok(())
    }

    /// Identity hash of a region.
    ///
    /// The hash is the parent's hash (same view, kind and ordinal) joined to
    /// this region's alias with `_`, or just the alias when there is no parent.
    /// Every region on the chain memoizes its result under
    /// `(view, kind, ordinal)`; a memoized value is never recomputed, even if
    /// ancestors change afterwards.
    pub fn hash(&self, id: RegionId, view: usize, kind: RegionKind, ordinal: usize) -> Result<String, GraphError> {
        let key = HashKey { view, kind, ordinal };

        // Walk up until a memoized ancestor or the top of the chain.
        let mut pending = Vec::new();
        let mut prefix = None;
        let mut current = id;
        loop {
            let region = self.region(current)?;
            if let Some(hash) = region.cached_hash(&key) {
                prefix = Some(hash);
                break;
            }

            pending.push(current);
            if pending.len() > self.regions.len() {
                return Err(GraphError::ParentCycle {
                    name: self.region(id)?.canonical_name().to_string(),
                });
            }

            match region.parent(kind, ordinal)? {
                Some(parent) => current = parent,
                None => break,
            }
        }

        // Fill in memos from the top down.
        for rid in pending.into_iter().rev() {
            let region = self.region(rid)?;
            let name = region.name(view)?;
            let hash = match prefix {
                Some(parent_hash) => format!("{}_{}", parent_hash, name),
                None => name.to_string(),
            };
            region.hashes.borrow_mut().insert(key, hash.clone());
            prefix = Some(hash);
        }

        // pending held at least `id` unless `id` itself was memoized
        prefix.ok_or(GraphError::UnknownRegion(id))
    }

    /// Check that every edge is recorded on both of its ends.
    ///
    /// Reports every asymmetric edge found; the graph is not modified.
    pub fn consistency_check(&self) -> Vec<Asymmetry> {
        let mut problems = Vec::new();

        for (index, region) in self.regions.iter().enumerate() {
            let id = RegionId(index);

            for edge in &region.parents {
                let Ok(parent) = self.region(edge.target) else {
                    continue;
                };
                if !parent.children.iter().any(|c| c.target == id) {
                    problems.push(Asymmetry::ParentNotChilding {
                        child: id,
                        parent: edge.target,
                        child_name: region.canonical_name().to_string(),
                        parent_name: parent.canonical_name().to_string(),
                    });
                }
            }

            for edge in &region.children {
                let Ok(child) = self.region(edge.target) else {
                    continue;
                };
                if !child.parents.iter().any(|p| p.target == id) {
                    problems.push(Asymmetry::ChildNotParented {
                        parent: id,
                        child: edge.target,
                        parent_name: region.canonical_name().to_string(),
                        child_name: child.canonical_name().to_string(),
                    });
                }
            }
        }

        problems
    }

    /// Render the tree below `root` as one `name hash` line per region,
    /// indented by depth. A `depth` of zero or less prints everything.
    pub fn write_tree<W: Write>(
        &self,
        out: &mut W,
        root: RegionId,
        depth: i32,
        view: usize,
        ordinal: usize,
        kind: RegionKind,
    ) -> io::Result<()> {
        let mut stack = vec![(root, 0usize)];

        while let Some((id, level)) = stack.pop() {
            let region = self.region(id).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let name = region.name(view).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let hash = self.hash(id, view, kind, ordinal).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writeln!(out, "{}{} {}", "  ".repeat(level), name, hash)?;

            if depth <= 0 || (level as i32) + 1 < depth {
                for child in region.children(kind).into_iter().rev() {
                    stack.push((child, level + 1));
                }
            }
        }

        Ok(())
    }
}

fn union_add(edges: &mut Vec<Edge>, additions: Vec<Edge>) {
    for edge in additions {
        if !edges.iter().any(|e| e.target == edge.target) {
            edges.push(edge);
        }
    }
}
