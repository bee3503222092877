//! Dynamic topology: refine and coarsen triangles under the brush.
//!
//! Edges inside the brush region longer than the detail size are split at
//! their midpoint; edges shorter than the collapse limit are merged into one
//! of their vertices. Both passes pull edges from a priority queue:
//! - Split: longest first
//! - Collapse: shortest first, boundary edges deferred
//!
//! Only leaves flagged with [`NodeFlags::TOPOLOGY_UPDATE_NEEDED`] take part.
//! Every edit goes through the tree so face and vertex ownership stay
//! consistent while the mesh changes.

mod edge_collapse;
mod edge_split;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use bitflags::bitflags;
use glam::Vec3;
use tracing::trace;

use crate::dyntopo::{DynFaceId, DynMesh, DynVertId};
use crate::spatial::ray::closest_on_tri_to_point;
use crate::tree::{NodeFlags, SpatialTree};

bitflags! {
    /// Which topology passes to run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TopologyMode: u8 {
        const SUBDIVIDE = 1 << 0;
        const COLLAPSE = 1 << 1;
    }
}

/// Part of the surface a topology update may touch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologyRegion {
    pub center: Vec3,
    pub radius: f32,
    /// Test triangles against the brush circle projected along this
    /// direction instead of the sphere
    pub view_normal: Option<Vec3>,
}

/// Edits made by one topology update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopologyStats {
    pub edges_split: usize,
    pub edges_collapsed: usize,
}

impl TopologyStats {
    pub fn modified(&self) -> bool {
        self.edges_split > 0 || self.edges_collapsed > 0
    }
}

#[derive(Debug, Clone, Copy)]
struct QueuedEdge {
    priority: f32,
    v1: DynVertId,
    v2: DynVertId,
}

impl PartialEq for QueuedEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEdge {}

impl PartialOrd for QueuedEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEdge {
    // Reversed: the heap pops the lowest priority first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| (other.v1, other.v2).cmp(&(self.v1, self.v2)))
    }
}

fn edge_key(v1: DynVertId, v2: DynVertId) -> (DynVertId, DynVertId) {
    if v1 < v2 { (v1, v2) } else { (v2, v1) }
}

/// Edges waiting to be split or collapsed.
pub(crate) struct EdgeQueue {
    heap: BinaryHeap<QueuedEdge>,
    queued: HashSet<(DynVertId, DynVertId)>,
    region: TopologyRegion,
    limit_len_sq: f32,
}

impl EdgeQueue {
    fn new(region: &TopologyRegion, limit_len: f32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::new(),
            region: *region,
            limit_len_sq: limit_len * limit_len,
        }
    }

    fn tri_in_range(&self, tri: [Vec3; 3]) -> bool {
        let center = self.region.center;
        let radius_sq = self.region.radius * self.region.radius;
        let tri = match self.region.view_normal {
            Some(normal) => tri.map(|p| p - normal * normal.dot(p - center)),
            None => tri,
        };
        closest_on_tri_to_point(center, tri).distance_squared(center) <= radius_sq
    }

    /// Fully masked or hidden geometry keeps its topology.
    fn edge_allowed(mesh: &DynMesh, v1: DynVertId, v2: DynVertId) -> bool {
        let any_unmasked = mesh.mask(v1) < 1.0 || mesh.mask(v2) < 1.0;
        any_unmasked && !mesh.is_vert_hidden(v1) && !mesh.is_vert_hidden(v2)
    }

    fn insert(&mut self, mesh: &DynMesh, v1: DynVertId, v2: DynVertId, priority: f32) {
        if !Self::edge_allowed(mesh, v1, v2) {
            return;
        }
        if self.queued.insert(edge_key(v1, v2)) {
            self.heap.push(QueuedEdge { priority, v1, v2 });
        }
    }

    fn pop(&mut self) -> Option<(DynVertId, DynVertId)> {
        let edge = self.heap.pop()?;
        self.queued.remove(&edge_key(edge.v1, edge.v2));
        Some((edge.v1, edge.v2))
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn face_edges(mesh: &DynMesh, face: DynFaceId) -> [(DynVertId, DynVertId); 3] {
        let [a, b, c] = mesh.face_verts(face);
        [(a, b), (b, c), (c, a)]
    }

    /// Queue the edges of `face` longer than the limit.
    pub(crate) fn long_face_add(&mut self, mesh: &DynMesh, face: DynFaceId) {
        if !self.tri_in_range(mesh.face_positions(face)) {
            return;
        }
        for (v1, v2) in Self::face_edges(mesh, face) {
            let len_sq = mesh.co(v1).distance_squared(mesh.co(v2));
            if len_sq > self.limit_len_sq {
                self.insert(mesh, v1, v2, -len_sq);
            }
        }
    }

    /// Queue the edges of `face` shorter than the limit.
    fn short_face_add(&mut self, mesh: &DynMesh, face: DynFaceId) {
        if !self.tri_in_range(mesh.face_positions(face)) {
            return;
        }
        for (v1, v2) in Self::face_edges(mesh, face) {
            let len_sq = mesh.co(v1).distance_squared(mesh.co(v2));
            if len_sq >= self.limit_len_sq {
                continue;
            }
            // Collapse open borders last
            let weight = if mesh.edge_is_boundary(v1, v2) {
                1.5
            } else if mesh.vert_is_boundary(v1) || mesh.vert_is_boundary(v2) {
                1.25
            } else {
                1.0
            };
            self.insert(mesh, v1, v2, len_sq * weight);
        }
    }
}

/// Faces of leaves waiting for a topology update.
fn faces_to_update(tree: &SpatialTree) -> Vec<DynFaceId> {
    let mut faces = Vec::new();
    for leaf in tree.all_leaf_nodes() {
        let node = tree.node(leaf);
        if !node.flags().contains(NodeFlags::TOPOLOGY_UPDATE_NEEDED) || node.is_fully_hidden() {
            continue;
        }
        if let Some(leaf) = node.as_dyntopo() {
            faces.extend(leaf.faces().iter().copied());
        }
    }
    faces
}

/// Split long and collapse short edges in the leaves marked with
/// [`SpatialTree::mark_topology_update`].
pub fn update_topology(
    tree: &mut SpatialTree,
    mesh: &mut DynMesh,
    mode: TopologyMode,
    region: &TopologyRegion,
) -> TopologyStats {
    let mut stats = TopologyStats::default();
    let max_edge_len = tree.config().dyntopo_max_edge_len();
    let min_edge_len = tree.config().dyntopo_min_edge_len();

    if mode.contains(TopologyMode::COLLAPSE) {
        let mut queue = EdgeQueue::new(region, min_edge_len);
        for face in faces_to_update(tree) {
            queue.short_face_add(mesh, face);
        }
        trace!("update_topology: {} short edges queued", queue.len());
        stats.edges_collapsed = edge_collapse::collapse_short_edges(tree, mesh, &mut queue);
    }

    if mode.contains(TopologyMode::SUBDIVIDE) {
        let mut queue = EdgeQueue::new(region, max_edge_len);
        for face in faces_to_update(tree) {
            queue.long_face_add(mesh, face);
        }
        trace!("update_topology: {} long edges queued", queue.len());
        stats.edges_split = edge_split::subdivide_long_edges(tree, mesh, &mut queue);
    }

    let mut changed = Vec::new();
    for leaf in tree.all_leaf_nodes() {
        let flags = tree.node(leaf).flags();
        tree.set_node_flag(leaf, NodeFlags::TOPOLOGY_UPDATE_NEEDED, false);
        if !flags.contains(NodeFlags::TOPOLOGY_UPDATED) {
            continue;
        }
        tree.set_node_flag(leaf, NodeFlags::TOPOLOGY_UPDATED, false);
        changed.push(leaf);
        // Original triangles changed too
        let has_orig = tree.node(leaf).as_dyntopo().is_some_and(|l| l.orig().is_some());
        if has_orig {
            tree.dyn_save_orig(mesh, leaf, true);
        }
    }
    tree.tag_topology_changed(&changed);

    trace!("update_topology: {:?}", stats);
    stats
}
