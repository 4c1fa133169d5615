//! Kind-filtered depth-first walk.
//!
//! The walk is post-order: every child returned by `children(kind)` is
//! finished before its parent is visited. There is no visited set, so a
//! region reachable through several parents is visited once per path.

use crate::domain::RegionKind;

use super::graph::{GraphError, RegionGraph, RegionId};

struct Frame {
    region: RegionId,
    children: Vec<RegionId>,
    next: usize,
}

impl Frame {
    fn enter(graph: &RegionGraph, region: RegionId, kind: RegionKind) -> Result<Self, GraphError> {
        Ok(Self {
            region,
            children: graph.children(region, kind)?,
            next: 0,
        })
    }
}

/// Visit every region reachable from `root` through `children(kind)`, in
/// post-order, calling `visit` on each.
///
/// The first error returned by `visit` stops the walk and is returned as is.
/// The graph is handed to `visit` mutably so it can attach events; a region's
/// children are read when the walk first enters it.
pub fn for_each_of_kind<E, F>(
    graph: &mut RegionGraph,
    root: RegionId,
    kind: RegionKind,
    mut visit: F,
) -> Result<(), E>
where
    E: From<GraphError>,
    F: FnMut(&mut RegionGraph, RegionId) -> Result<(), E>,
{
    let limit = graph.len();
    let mut stack = vec![Frame::enter(graph, root, kind)?];

    while let Some(frame) = stack.last_mut() {
        if frame.next < frame.children.len() {
            let child = frame.children[frame.next];
            frame.next += 1;

            // A DAG path can never be longer than the number of regions.
            if stack.len() >= limit {
                let name = graph.region(child)?.canonical_name().to_string();
                return Err(GraphError::ChildCycle { name }.into());
            }
            stack.push(Frame::enter(graph, child, kind)?);
        } else {
            let region = frame.region;
            stack.pop();
            visit(graph, region)?;
        }
    }

    Ok(())
}

/// Post-order list of the regions `for_each_of_kind` would visit
pub fn collect_of_kind(graph: &mut RegionGraph, root: RegionId, kind: RegionKind) -> Result<Vec<RegionId>, GraphError> {
    let mut order = Vec::new();
    for_each_of_kind(graph, root, kind, |_, region| {
        order.push(region);
        Ok::<(), GraphError>(())
    })?;
    Ok(order)
}
