//! Bounding volume hierarchy over sculptable geometry.
//!
//! A [`SpatialTree`] partitions the faces of a mesh, the grids of a
//! subdivision surface, or the triangles of a dynamic-topology mesh into
//! leaves so brushes only visit geometry near the cursor:
//! - Nodes live in one flat array; children always come after their parent
//! - Leaves own their vertices uniquely so brushes write without locking
//! - Dirty state is tracked per node and resolved lazily before the next
//!   traversal

mod build;
mod dyntopo;
mod node;
mod query;
mod update;

pub use node::{DynTopoLeaf, GridsLeaf, MeshLeaf, NodeFlags, NodePayload, OrigSnapshot, SpatialNode};

use chisel_config::SculptConfig;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use subdiv::BitVector;
use tracing::trace;

use crate::error::TreeError;
use crate::gpu::{DrawCacheSink, DrawNotification};
use crate::spatial::Bounds;
use crate::surface::Surface;

/// Geometry representation a tree was built over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Mesh,
    Grids,
    DynTopo,
}

/// Spatial hierarchy over one sculptable surface.
#[derive(Debug, Clone)]
pub struct SpatialTree {
    kind: TreeKind,
    nodes: Vec<SpatialNode>,
    /// Faces (mesh) or grids (grids) in leaf order
    prim_indices: Vec<u32>,
    /// Leaf of every primitive
    prim_to_leaf: Vec<u32>,
    /// Owning leaf of every mesh vertex, `u32::MAX` when unused
    vert_to_leaf: Vec<u32>,
    bounds_dirty: BitVector,
    normals_dirty: BitVector,
    visibility_dirty: BitVector,
    pending: Vec<DrawNotification>,
    leaf_limit: usize,
    config: SculptConfig,
}

impl SpatialTree {
    fn with_kind(kind: TreeKind, leaf_limit: usize, config: &SculptConfig) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            prim_indices: Vec::new(),
            prim_to_leaf: Vec::new(),
            vert_to_leaf: Vec::new(),
            bounds_dirty: BitVector::new(0, false),
            normals_dirty: BitVector::new(0, false),
            visibility_dirty: BitVector::new(0, false),
            pending: Vec::new(),
            leaf_limit: leaf_limit.max(1),
            config: config.clone(),
        }
    }

    #[inline]
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    #[inline]
    pub fn nodes(&self) -> &[SpatialNode] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, index: usize) -> &SpatialNode {
        &self.nodes[index]
    }

    #[inline]
    pub fn nodes_num(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the whole tree.
    pub fn bounds(&self) -> Bounds {
        self.nodes.first().map_or(Bounds::ZERO, |root| root.bounds)
    }

    pub fn leaf_limit(&self) -> usize {
        self.leaf_limit
    }

    pub fn config(&self) -> &SculptConfig {
        &self.config
    }

    /// Primitives in leaf order; leaves reference ranges of this array.
    pub fn prim_indices(&self) -> &[u32] {
        &self.prim_indices
    }

    /// Leaf containing a face (mesh) or grid (grids).
    pub fn prim_leaf(&self, prim: usize) -> Option<usize> {
        self.prim_to_leaf.get(prim).map(|&leaf| leaf as usize)
    }

    /// Leaf whose unique vertices include `vert`. Mesh trees only; `None`
    /// for vertices no face uses.
    pub fn mesh_vert_leaf(&self, vert: usize) -> Option<usize> {
        self.vert_to_leaf
            .get(vert)
            .filter(|&&leaf| leaf != u32::MAX)
            .map(|&leaf| leaf as usize)
    }

    pub(crate) fn check_surface(&self, surface: &Surface) -> Result<(), TreeError> {
        if surface.kind() != self.kind {
            return Err(TreeError::BackendMismatch {
                tree: self.kind,
                surface: surface.kind(),
            });
        }
        let found = match surface {
            Surface::Mesh(surface) => surface.mesh().faces_num(),
            Surface::Grids(surface) => surface.ccg().grids_num(),
            Surface::DynTopo(_) => return Ok(()),
        };
        if found != self.prim_to_leaf.len() {
            return Err(TreeError::PrimitiveCountMismatch {
                expected: self.prim_to_leaf.len(),
                found,
            });
        }
        Ok(())
    }

    /// Append nodes, growing the per-node dirty sets with them.
    pub(crate) fn push_node(&mut self, node: SpatialNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        let len = self.nodes.len();
        self.bounds_dirty.resize(len, false);
        self.normals_dirty.resize(len, false);
        self.visibility_dirty.resize(len, false);
        index
    }

    /// Indices of every leaf.
    pub fn all_leaf_nodes(&self) -> Vec<usize> {
        self.search_nodes(|_| true)
    }

    /// Leaves reached by descending only into nodes accepted by `filter`.
    pub fn search_nodes(&self, filter: impl Fn(&SpatialNode) -> bool) -> Vec<usize> {
        let mut leaves = Vec::new();
        if self.nodes.is_empty() {
            return leaves;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !filter(node) {
                continue;
            }
            match node.children() {
                Some([first, second]) => {
                    stack.push(second);
                    stack.push(first);
                }
                None => leaves.push(index),
            }
        }
        leaves
    }

    /// Faces of a mesh leaf, or grids of a grids leaf.
    pub fn node_prims(&self, node: usize) -> &[u32] {
        match &self.nodes[node].payload {
            NodePayload::Mesh(leaf) => &self.prim_indices[leaf.prims.clone()],
            NodePayload::Grids(leaf) => &self.prim_indices[leaf.prims.clone()],
            _ => &[],
        }
    }

    /// Faces of a mesh leaf.
    pub fn node_faces(&self, node: usize) -> &[u32] {
        match &self.nodes[node].payload {
            NodePayload::Mesh(_) => self.node_prims(node),
            _ => &[],
        }
    }

    /// Grids of a grids leaf.
    pub fn node_grids(&self, node: usize) -> &[u32] {
        match &self.nodes[node].payload {
            NodePayload::Grids(_) => self.node_prims(node),
            _ => &[],
        }
    }

    /// Vertices referenced by a mesh leaf, unique prefix first.
    pub fn node_verts(&self, node: usize) -> &[u32] {
        self.nodes[node].as_mesh().map_or(&[], |leaf| leaf.verts())
    }

    /// Positions of every vertex a leaf references, shared ones included.
    pub fn leaf_positions_iter<'a>(
        &'a self,
        node: usize,
        surface: &'a Surface,
    ) -> Box<dyn Iterator<Item = Vec3> + 'a> {
        match (&self.nodes[node].payload, surface) {
            (NodePayload::Mesh(leaf), Surface::Mesh(surface)) => {
                let positions = surface.positions();
                Box::new(leaf.verts().iter().map(move |&vert| positions[vert as usize]))
            }
            (NodePayload::Grids(_), Surface::Grids(surface)) => {
                let ccg = surface.ccg();
                let positions = ccg.positions();
                Box::new(
                    self.node_prims(node)
                        .iter()
                        .flat_map(move |&grid| positions[ccg.grid_range(grid as usize)].iter().copied()),
                )
            }
            (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => Box::new(
                leaf.unique_verts()
                    .iter()
                    .chain(leaf.other_verts())
                    .map(move |&vert| mesh.co(vert)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Coarse faces whose grids a grids leaf contains, each listed once.
    pub fn node_grid_faces(&self, node: usize, grid_to_face: &[u32]) -> Vec<usize> {
        let mut faces: Vec<usize> = self
            .node_prims(node)
            .iter()
            .map(|&grid| grid_to_face[grid as usize] as usize)
            .collect();
        faces.dedup();
        faces
    }

    pub fn is_bounds_dirty(&self, node: usize) -> bool {
        self.bounds_dirty.get(node)
    }

    pub fn is_normals_dirty(&self, node: usize) -> bool {
        self.normals_dirty.get(node)
    }

    pub fn is_visibility_dirty(&self, node: usize) -> bool {
        self.visibility_dirty.get(node)
    }

    /// Vertex positions of the given leaves changed.
    pub fn tag_positions_changed(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.bounds_dirty.set(node, true);
            self.normals_dirty.set(node, true);
        }
        self.queue(DrawNotification::Positions(nodes.to_vec()));
    }

    pub fn tag_visibility_changed(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.visibility_dirty.set(node, true);
        }
        self.queue(DrawNotification::Visibility(nodes.to_vec()));
    }

    /// Faces were added or removed in the given leaves.
    pub fn tag_topology_changed(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.bounds_dirty.set(node, true);
            self.normals_dirty.set(node, true);
            self.nodes[node].flags |= NodeFlags::NEEDS_PIXEL_REBUILD;
        }
        self.queue(DrawNotification::Topology(nodes.to_vec()));
    }

    pub fn tag_face_sets_changed(&mut self, nodes: &[usize]) {
        self.queue(DrawNotification::FaceSets(nodes.to_vec()));
    }

    pub fn tag_masks_changed(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.nodes[node].flags |= NodeFlags::UPDATE_MASK;
        }
        self.queue(DrawNotification::Masks(nodes.to_vec()));
    }

    pub fn tag_attribute_changed(&mut self, nodes: &[usize], name: &str) {
        self.queue(DrawNotification::Attribute {
            name: name.to_string(),
            nodes: nodes.to_vec(),
        });
    }

    /// Request dynamic-topology refinement of the given leaves.
    pub fn mark_topology_update(&mut self, nodes: &[usize]) {
        for &node in nodes {
            self.nodes[node].flags |= NodeFlags::TOPOLOGY_UPDATE_NEEDED;
        }
    }

    pub(crate) fn set_node_flag(&mut self, node: usize, flag: NodeFlags, value: bool) {
        self.nodes[node].set_flag(flag, value);
    }

    fn queue(&mut self, notification: DrawNotification) {
        if notification.nodes().is_empty() {
            return;
        }
        self.pending.push(notification);
    }

    /// Publish queued draw-cache notifications. Returns how many were sent.
    pub fn take_draw_notifications(&mut self, sink: &mut dyn DrawCacheSink) -> usize {
        let count = self.pending.len();
        for notification in self.pending.drain(..) {
            sink.notify(notification);
        }
        if count > 0 {
            trace!("Published {} draw notifications", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::DirtyNodes;
    use crate::surface::MeshSurface;
    use subdiv::Mesh;

    fn small_tree() -> SpatialTree {
        let config = SculptConfig {
            leaf_limit: 4,
            ..Default::default()
        };
        SpatialTree::from_mesh(&MeshSurface::new(Mesh::quad_grid(4, 4, 2.0)), &config)
    }

    #[test]
    fn test_search_prunes_subtrees() {
        let tree = small_tree();
        let all = tree.all_leaf_nodes();
        assert!(all.len() >= 4);
        assert!(all.iter().all(|&i| tree.node(i).is_leaf()));

        let corner = glam::Vec3::new(-1.0, -1.0, 0.0);
        let near = tree.search_nodes(|node| node.bounds().intersects_sphere(corner, 0.1));
        assert!(!near.is_empty());
        assert!(near.len() < all.len());
        assert!(tree.search_nodes(|_| false).is_empty());
    }

    #[test]
    fn test_tags_queue_notifications() {
        let mut tree = small_tree();
        let leaves = tree.all_leaf_nodes();
        tree.tag_positions_changed(&leaves[..1]);
        tree.tag_topology_changed(&leaves[1..2]);
        tree.tag_masks_changed(&[]);
        assert!(tree.is_bounds_dirty(leaves[0]));
        assert!(tree.is_normals_dirty(leaves[1]));
        assert!(tree.node(leaves[1]).flags().contains(NodeFlags::NEEDS_PIXEL_REBUILD));

        let mut dirty = DirtyNodes::new();
        assert_eq!(tree.take_draw_notifications(&mut dirty), 2);
        assert!(dirty.modified.contains(&leaves[0]));
        assert!(dirty.rebuild.contains(&leaves[1]));
        assert_eq!(tree.take_draw_notifications(&mut dirty), 0);
    }

    #[test]
    fn test_leaf_accessors() {
        let surface = Surface::Mesh(MeshSurface::new(Mesh::quad_grid(4, 4, 2.0)));
        let tree = small_tree();
        let mut faces = 0;
        for leaf in tree.all_leaf_nodes() {
            faces += tree.node_faces(leaf).len();
            assert!(tree.node_grids(leaf).is_empty());
            let positions: Vec<Vec3> = tree.leaf_positions_iter(leaf, &surface).collect();
            assert_eq!(positions.len(), tree.node_verts(leaf).len());
            for p in positions {
                assert!(tree.node(leaf).bounds().contains_point(p));
            }
        }
        assert_eq!(faces, 16);
    }

    #[test]
    fn test_backend_mismatch() {
        let tree = small_tree();
        let surface = Surface::DynTopo(crate::dyntopo::DynMesh::new());
        assert!(matches!(
            tree.check_surface(&surface),
            Err(TreeError::BackendMismatch {
                tree: TreeKind::Mesh,
                surface: TreeKind::DynTopo
            })
        ));
        let surface = Surface::Mesh(MeshSurface::new(Mesh::quad_grid(1, 1, 1.0)));
        assert!(matches!(
            tree.check_surface(&surface),
            Err(TreeError::PrimitiveCountMismatch { expected: 16, found: 1 })
        ));
    }
}
