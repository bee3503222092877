//! Dynamic-topology leaves: construction, splitting and vertex ownership.
//!
//! Every live triangle belongs to exactly one leaf and every vertex is owned
//! by exactly one leaf using it ("unique" there); leaves list the vertices
//! they use but do not own as "other". Topology edits keep both in sync with
//! the owner ids stored on the mesh elements.

use std::collections::{BTreeSet, HashMap};

use chisel_config::SculptConfig;
use glam::Vec3;
use tracing::debug;

use super::{DynTopoLeaf, NodeFlags, NodePayload, OrigSnapshot, SpatialNode, SpatialTree, TreeKind};
use crate::dyntopo::{DynFaceId, DynMesh, DynVertId};
use crate::spatial::Bounds;

impl SpatialTree {
    /// Build a tree over a dynamic-topology mesh, writing leaf ownership
    /// into the mesh elements.
    pub fn from_dyntopo(mesh: &mut DynMesh, config: &SculptConfig) -> Self {
        let mut tree = Self::with_kind(TreeKind::DynTopo, config.dyntopo_leaf_limit, config);

        let verts: Vec<DynVertId> = mesh.vert_ids().collect();
        for vert in verts {
            mesh.set_vert_owner(vert, None);
        }
        let faces: BTreeSet<DynFaceId> = mesh.face_ids().collect();
        for &face in &faces {
            mesh.set_face_owner(face, None);
        }

        let root = DynTopoLeaf {
            faces,
            ..Default::default()
        };
        tree.push_node(SpatialNode::leaf(None, NodePayload::DynTopo(root)));
        tree.dyn_node_split(mesh, 0);

        debug!(
            "Built dyntopo tree: {} triangles, {} nodes",
            mesh.faces_num(),
            tree.nodes.len()
        );
        tree
    }

    /// Assign ownership of a leaf's faces and vertices and compute its bounds.
    fn dyn_node_finalize(&mut self, mesh: &mut DynMesh, node: usize) {
        let owner = Some(node as u32);
        let Some(leaf) = self.nodes[node].as_dyntopo_mut() else {
            return;
        };

        let mut bounds = Bounds::empty();
        let mut has_visible = false;
        for &face in &leaf.faces {
            mesh.set_face_owner(face, owner);
            for vert in mesh.face_verts(face) {
                if !leaf.unique_verts.contains(&vert) {
                    if mesh.vert_owner(vert).is_some() {
                        leaf.other_verts.insert(vert);
                    } else {
                        leaf.unique_verts.insert(vert);
                        mesh.set_vert_owner(vert, owner);
                    }
                }
                bounds.include_point(mesh.co(vert));
            }
            has_visible |= !mesh.is_face_hidden(face);
        }
        let empty = leaf.faces.is_empty();
        if empty && node == 0 {
            bounds = Bounds::ZERO;
        }

        let node_ref = &mut self.nodes[node];
        node_ref.bounds = bounds;
        node_ref.bounds_orig = bounds;
        node_ref.flags.set(NodeFlags::FULLY_HIDDEN, !empty && !has_visible);
        node_ref.flags |= NodeFlags::UPDATE_MASK;
        self.normals_dirty.set(node, true);
    }

    /// Split a leaf holding more triangles than the leaf limit, recursively.
    fn dyn_node_split(&mut self, mesh: &mut DynMesh, node: usize) {
        let faces: Vec<DynFaceId> = match self.nodes[node].as_dyntopo() {
            Some(leaf) => leaf.faces.iter().copied().collect(),
            None => return,
        };
        if faces.len() <= self.leaf_limit {
            self.dyn_node_finalize(mesh, node);
            return;
        }

        let centers: Vec<Vec3> = faces.iter().map(|&f| mesh.face_bounds(f).center()).collect();
        let centroids = Bounds::from_points(centers.iter().copied());
        let axis = centroids.longest_axis();
        let mid = centroids.center()[axis];

        let mut lower = BTreeSet::new();
        let mut upper = BTreeSet::new();
        for (&face, center) in faces.iter().zip(&centers) {
            if center[axis] < mid {
                lower.insert(face);
            } else {
                upper.insert(face);
            }
        }
        // Each child needs at least one face
        if lower.is_empty() {
            if let Some(face) = upper.pop_first() {
                lower.insert(face);
            }
        } else if upper.is_empty() {
            if let Some(face) = lower.pop_first() {
                upper.insert(face);
            }
        }

        // The parent stops owning anything
        if let NodePayload::DynTopo(old) = std::mem::take(&mut self.nodes[node].payload) {
            for vert in old.unique_verts {
                mesh.set_vert_owner(vert, None);
            }
            for face in old.faces {
                mesh.set_face_owner(face, None);
            }
        }

        let parent = Some(node as u32);
        let first = self.push_node(SpatialNode::leaf(
            parent,
            NodePayload::DynTopo(DynTopoLeaf {
                faces: lower,
                ..Default::default()
            }),
        ));
        self.push_node(SpatialNode::leaf(
            parent,
            NodePayload::DynTopo(DynTopoLeaf {
                faces: upper,
                ..Default::default()
            }),
        ));
        let node_ref = &mut self.nodes[node];
        node_ref.children_offset = first as u32;
        node_ref.flags.remove(NodeFlags::LEAF | NodeFlags::FULLY_HIDDEN);

        self.dyn_node_split(mesh, first);
        self.dyn_node_split(mesh, first + 1);

        let bounds = self.nodes[first].bounds.union(&self.nodes[first + 1].bounds);
        let node_ref = &mut self.nodes[node];
        node_ref.bounds = bounds;
        node_ref.bounds_orig = bounds;
    }

    /// Split leaves that grew past the leaf limit. Returns true if any did.
    pub(crate) fn dyn_node_limit_ensure(&mut self, mesh: &mut DynMesh, node: usize) -> bool {
        let over_limit = self.nodes[node]
            .as_dyntopo()
            .is_some_and(|leaf| leaf.faces.len() > self.leaf_limit);
        if !over_limit {
            return false;
        }
        let before = self.nodes.len();
        self.dyn_node_split(mesh, node);
        let new_leaves: Vec<usize> = (before..self.nodes.len())
            .filter(|&i| self.nodes[i].is_leaf())
            .collect();
        self.tag_topology_changed(&new_leaves);
        true
    }

    /// Flag a leaf whose triangles changed during a topology update.
    pub(crate) fn dyn_mark_updated(&mut self, node: usize) {
        self.nodes[node].flags |= NodeFlags::TOPOLOGY_UPDATED | NodeFlags::UPDATE_MASK;
        self.bounds_dirty.set(node, true);
        self.normals_dirty.set(node, true);
    }

    pub(crate) fn dyn_leaf_mut(&mut self, node: usize) -> Option<&mut DynTopoLeaf> {
        self.nodes[node].as_dyntopo_mut()
    }

    /// Make `node` the owner of `vert`.
    pub(crate) fn dyn_vert_ownership_transfer(&mut self, mesh: &mut DynMesh, node: usize, vert: DynVertId) {
        if let Some(current) = mesh.vert_owner(vert) {
            let current = current as usize;
            if let Some(leaf) = self.dyn_leaf_mut(current) {
                leaf.unique_verts.remove(&vert);
            }
            self.dyn_mark_updated(current);
        }
        mesh.set_vert_owner(vert, Some(node as u32));
        if let Some(leaf) = self.dyn_leaf_mut(node) {
            leaf.unique_verts.insert(vert);
            leaf.other_verts.remove(&vert);
        }
        self.dyn_mark_updated(node);
    }

    /// Create a triangle in `node`. The caller adds any vertex the leaf does
    /// not reference yet.
    pub(crate) fn dyn_face_create(
        &mut self,
        mesh: &mut DynMesh,
        node: usize,
        verts: [DynVertId; 3],
    ) -> DynFaceId {
        let face = mesh.add_face(verts);
        mesh.set_face_owner(face, Some(node as u32));
        if let Some(leaf) = self.dyn_leaf_mut(node) {
            leaf.faces.insert(face);
        }
        self.nodes[node].flags.remove(NodeFlags::FULLY_HIDDEN);
        self.dyn_mark_updated(node);
        face
    }

    /// Remove a triangle, handing over vertices only it used in its leaf.
    pub(crate) fn dyn_face_remove(&mut self, mesh: &mut DynMesh, face: DynFaceId) {
        let Some(face_node) = mesh.face_owner(face) else {
            mesh.remove_face(face);
            return;
        };
        for vert in mesh.face_verts(face) {
            let uses = mesh
                .vert_faces(vert)
                .iter()
                .filter(|&&f| mesh.face_owner(f) == Some(face_node))
                .count();
            if uses != 1 {
                continue;
            }
            let owned_here = mesh.vert_owner(vert) == Some(face_node);
            if owned_here {
                let other_node = mesh
                    .vert_faces(vert)
                    .iter()
                    .find_map(|&f| mesh.face_owner(f).filter(|&n| n != face_node));
                if let Some(other_node) = other_node {
                    self.dyn_vert_ownership_transfer(mesh, other_node as usize, vert);
                }
            } else if let Some(leaf) = self.dyn_leaf_mut(face_node as usize) {
                leaf.other_verts.remove(&vert);
            }
        }
        if let Some(leaf) = self.dyn_leaf_mut(face_node as usize) {
            leaf.faces.remove(&face);
        }
        self.dyn_mark_updated(face_node as usize);
        mesh.remove_face(face);
    }

    /// Drop a vertex from every leaf referencing it.
    pub(crate) fn dyn_vert_remove(&mut self, mesh: &mut DynMesh, vert: DynVertId) {
        if let Some(owner) = mesh.vert_owner(vert) {
            if let Some(leaf) = self.dyn_leaf_mut(owner as usize) {
                leaf.unique_verts.remove(&vert);
            }
            self.dyn_mark_updated(owner as usize);
        }
        mesh.set_vert_owner(vert, None);
        let faces: Vec<DynFaceId> = mesh.vert_faces(vert).to_vec();
        for face in faces {
            if let Some(node) = mesh.face_owner(face) {
                if let Some(leaf) = self.dyn_leaf_mut(node as usize) {
                    leaf.other_verts.remove(&vert);
                }
                self.dyn_mark_updated(node as usize);
            }
        }
    }

    /// Snapshot a leaf's vertices and visible triangles for original
    /// coordinate ray casts.
    pub(crate) fn dyn_save_orig(&mut self, mesh: &DynMesh, node: usize, use_original: bool) {
        let Some(leaf) = self.dyn_leaf_mut(node) else {
            return;
        };
        let verts: Vec<DynVertId> = leaf
            .unique_verts
            .iter()
            .chain(&leaf.other_verts)
            .copied()
            .collect();
        let local: HashMap<DynVertId, u32> = verts
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i as u32))
            .collect();
        let positions = verts
            .iter()
            .map(|&v| if use_original { mesh.orig_co(v) } else { mesh.co(v) })
            .collect();
        let tris = leaf
            .faces
            .iter()
            .filter(|&&f| !mesh.is_face_hidden(f))
            .filter_map(|&f| {
                let [a, b, c] = mesh.face_verts(f);
                Some([*local.get(&a)?, *local.get(&b)?, *local.get(&c)?])
            })
            .collect();
        leaf.orig = Some(OrigSnapshot {
            positions,
            verts,
            tris,
        });
    }

    pub(crate) fn dyn_drop_orig(&mut self, node: usize) {
        if let Some(leaf) = self.dyn_leaf_mut(node) {
            leaf.orig = None;
        }
    }

    /// Snapshot every leaf at stroke start.
    pub fn store_orig_snapshots(&mut self, mesh: &DynMesh) {
        for node in self.all_leaf_nodes() {
            self.dyn_save_orig(mesh, node, false);
        }
    }

    /// End of a dynamic-topology stroke: drop the snapshots and split leaves
    /// that grew past the leaf limit. Returns true if the node array grew.
    pub fn after_stroke(&mut self, mesh: &mut DynMesh) -> bool {
        let totnode = self.nodes.len();
        let mut split = false;
        for node in 0..totnode {
            if !self.nodes[node].is_leaf() {
                continue;
            }
            self.dyn_drop_orig(node);
            split |= self.dyn_node_limit_ensure(mesh, node);
        }
        if split {
            debug!("Split oversized leaves, {} nodes", self.nodes.len());
        }
        split
    }

    /// True when faces and vertices agree with the leaves about ownership.
    pub fn check_dyntopo_ownership(&self, mesh: &DynMesh) -> bool {
        for face in mesh.face_ids() {
            let Some(owner) = mesh.face_owner(face) else {
                return false;
            };
            let in_leaf = self.nodes[owner as usize]
                .as_dyntopo()
                .is_some_and(|leaf| leaf.faces.contains(&face));
            if !in_leaf {
                return false;
            }
        }
        for vert in mesh.vert_ids() {
            if mesh.vert_faces(vert).is_empty() {
                continue;
            }
            let Some(owner) = mesh.vert_owner(vert) else {
                return false;
            };
            let owned = self.nodes[owner as usize]
                .as_dyntopo()
                .is_some_and(|leaf| leaf.unique_verts.contains(&vert));
            if !owned {
                return false;
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(leaf) = node.as_dyntopo() else {
                continue;
            };
            let owner = Some(index as u32);
            if leaf.unique_verts.iter().any(|&v| mesh.vert_owner(v) != owner) {
                return false;
            }
            if leaf
                .other_verts
                .iter()
                .any(|&v| mesh.vert_owner(v).is_none() || mesh.vert_owner(v) == owner)
            {
                return false;
            }
            for &face in &leaf.faces {
                for vert in mesh.face_verts(face) {
                    if !leaf.unique_verts.contains(&vert) && !leaf.other_verts.contains(&vert) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subdiv::Mesh;

    fn dyn_grid(cols: u32, leaf_limit: usize) -> (SpatialTree, DynMesh) {
        let mut mesh = DynMesh::from_mesh(&Mesh::quad_grid(cols, cols, 2.0));
        let config = SculptConfig {
            dyntopo_leaf_limit: leaf_limit,
            ..Default::default()
        };
        let tree = SpatialTree::from_dyntopo(&mut mesh, &config);
        (tree, mesh)
    }

    #[test]
    fn test_build_assigns_ownership() {
        let (tree, mesh) = dyn_grid(8, 16);
        assert!(tree.check_dyntopo_ownership(&mesh));

        let leaves = tree.all_leaf_nodes();
        assert!(leaves.len() >= 8);
        let mut face_count = 0;
        let mut unique_count = 0;
        for &leaf in &leaves {
            let leaf_ref = tree.node(leaf).as_dyntopo().unwrap();
            assert!(!leaf_ref.faces().is_empty());
            assert!(leaf_ref.faces().len() <= 16);
            face_count += leaf_ref.faces().len();
            unique_count += leaf_ref.unique_verts().len();
            for &face in leaf_ref.faces() {
                assert!(tree.node(leaf).bounds().contains(&mesh.face_bounds(face)));
            }
        }
        assert_eq!(face_count, mesh.faces_num());
        assert_eq!(unique_count, mesh.verts_num());
    }

    #[test]
    fn test_empty_dyntopo_mesh() {
        let mut mesh = DynMesh::new();
        let tree = SpatialTree::from_dyntopo(&mut mesh, &SculptConfig::default());
        assert_eq!(tree.nodes_num(), 1);
        assert_eq!(tree.bounds(), Bounds::ZERO);
    }

    #[test]
    fn test_face_remove_hands_over_vertices() {
        let (mut tree, mut mesh) = dyn_grid(4, 4);
        // Remove every face of one leaf; its vertices move to neighbours
        let leaf = tree.all_leaf_nodes()[0];
        let faces: Vec<DynFaceId> = tree.node(leaf).as_dyntopo().unwrap().faces().iter().copied().collect();
        for face in faces {
            tree.dyn_face_remove(&mut mesh, face);
        }
        assert!(tree.node(leaf).as_dyntopo().unwrap().faces().is_empty());
        assert!(tree.check_dyntopo_ownership(&mesh));
        assert!(tree.node(leaf).flags().contains(NodeFlags::TOPOLOGY_UPDATED));
    }

    #[test]
    fn test_after_stroke_splits_grown_leaf() {
        let (mut tree, mut mesh) = dyn_grid(4, 8);
        let leaf = tree.all_leaf_nodes()[0];
        let nodes_before = tree.nodes_num();
        // Grow the leaf past the limit with triangles off to the side
        let base = mesh.add_vert(Vec3::new(5.0, 0.0, 0.0));
        tree.dyn_vert_ownership_transfer(&mut mesh, leaf, base);
        for i in 0..8 {
            let a = mesh.add_vert(Vec3::new(5.0 + i as f32, 1.0, 0.0));
            let b = mesh.add_vert(Vec3::new(6.0 + i as f32, 1.0, 0.0));
            tree.dyn_vert_ownership_transfer(&mut mesh, leaf, a);
            tree.dyn_vert_ownership_transfer(&mut mesh, leaf, b);
            tree.dyn_face_create(&mut mesh, leaf, [base, a, b]);
        }
        assert!(tree.check_dyntopo_ownership(&mesh));

        assert!(tree.after_stroke(&mut mesh));
        assert!(tree.nodes_num() > nodes_before);
        assert!(!tree.node(leaf).is_leaf());
        assert!(tree.check_dyntopo_ownership(&mesh));
        for node in tree.all_leaf_nodes() {
            assert!(tree.node(node).as_dyntopo().unwrap().faces().len() <= 8);
        }
        assert!(!tree.after_stroke(&mut mesh));
    }

    #[test]
    fn test_orig_snapshot() {
        let (mut tree, mut mesh) = dyn_grid(2, 100);
        tree.store_orig_snapshots(&mesh);
        let snapshot = tree.node(0).as_dyntopo().unwrap().orig().unwrap().clone();
        assert_eq!(snapshot.tris.len(), 8);
        assert_eq!(snapshot.positions.len(), 9);

        let moved = snapshot.verts[0];
        mesh.set_co(moved, Vec3::new(0.0, 0.0, 10.0));
        let orig = tree.node(0).as_dyntopo().unwrap().orig().unwrap();
        assert_ne!(orig.positions[0], mesh.co(moved));

        tree.after_stroke(&mut mesh);
        assert!(tree.node(0).as_dyntopo().unwrap().orig().is_none());
    }
}
