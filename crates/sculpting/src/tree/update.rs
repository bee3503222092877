//! Lazy refresh of bounds, visibility, mask flags and normals.

use std::collections::BTreeSet;

use rayon::prelude::*;
use subdiv::BitVector;
use tracing::trace;

use super::build::visible_quads_num;
use super::{NodeFlags, NodePayload, SpatialTree};
use crate::dyntopo::{DynFaceId, DynMesh, DynVertId};
use crate::error::TreeError;
use crate::spatial::Bounds;
use crate::surface::Surface;

/// `(fully_masked, fully_unmasked)` of a set of mask values.
fn mask_state(masks: impl Iterator<Item = f32>) -> (bool, bool) {
    let mut fully_masked = true;
    let mut fully_unmasked = true;
    for mask in masks {
        fully_masked &= mask >= 1.0;
        fully_unmasked &= mask <= 0.0;
        if !fully_masked && !fully_unmasked {
            break;
        }
    }
    (fully_masked, fully_unmasked)
}

impl SpatialTree {
    /// Bounds of a leaf from the current positions.
    pub(crate) fn leaf_bounds(&self, node: usize, surface: &Surface) -> Bounds {
        let bounds = match (&self.nodes[node].payload, surface) {
            (NodePayload::Mesh(leaf), Surface::Mesh(surface)) => {
                let positions = surface.positions();
                Bounds::from_points(leaf.verts.iter().map(|&v| positions[v as usize]))
            }
            (NodePayload::Grids(_), Surface::Grids(surface)) => {
                let ccg = surface.ccg();
                Bounds::from_points(
                    self.node_prims(node)
                        .iter()
                        .flat_map(|&grid| ccg.grid_positions(grid as usize).iter().copied()),
                )
            }
            (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => Bounds::from_points(
                leaf.unique_verts
                    .iter()
                    .chain(&leaf.other_verts)
                    .map(|&v| mesh.co(v)),
            ),
            _ => Bounds::empty(),
        };
        if bounds.is_empty() && node == 0 {
            return Bounds::ZERO;
        }
        bounds
    }

    /// Recompute the bounds of bounds-dirty leaves and mark them for
    /// [`SpatialTree::flush_bounds_to_parents`].
    pub fn update_bounds(&mut self, surface: &Surface) -> Result<(), TreeError> {
        self.check_surface(surface)?;
        let dirty: Vec<usize> = self
            .bounds_dirty
            .iter_ones()
            .filter(|&node| self.nodes[node].is_leaf())
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }
        let bounds: Vec<Bounds> = dirty
            .par_iter()
            .with_min_len(self.config.parallel_grain)
            .map(|&node| self.leaf_bounds(node, surface))
            .collect();
        for (&node, bounds) in dirty.iter().zip(bounds) {
            let node_ref = &mut self.nodes[node];
            node_ref.bounds = bounds;
            node_ref.flags |= NodeFlags::UPDATE_BOUNDS;
            self.bounds_dirty.set(node, false);
        }
        trace!("Updated bounds of {} leaves", dirty.len());
        Ok(())
    }

    /// Propagate changed bounds upwards. Children always follow their
    /// parent in the node array, so a single reverse pass suffices.
    pub fn flush_bounds_to_parents(&mut self) {
        for index in (0..self.nodes.len()).rev() {
            let Some([first, second]) = self.nodes[index].children() else {
                continue;
            };
            let changed = self.nodes[first].flags.contains(NodeFlags::UPDATE_BOUNDS)
                || self.nodes[second].flags.contains(NodeFlags::UPDATE_BOUNDS);
            if changed {
                let bounds = self.nodes[first].bounds.union(&self.nodes[second].bounds);
                self.nodes[index].bounds = bounds;
                self.nodes[index].flags |= NodeFlags::UPDATE_BOUNDS;
            }
        }
        for node in &mut self.nodes {
            node.flags.remove(NodeFlags::UPDATE_BOUNDS);
        }
    }

    /// Snapshot current bounds for original-coordinate queries.
    pub fn store_bounds_orig(&mut self) {
        for node in &mut self.nodes {
            node.bounds_orig = node.bounds;
        }
    }

    /// Refresh the fully masked and unmasked flags of leaves with stale masks.
    pub fn update_mask(&mut self, surface: &Surface) -> Result<(), TreeError> {
        self.check_surface(surface)?;
        for index in 0..self.nodes.len() {
            if !self.nodes[index].flags.contains(NodeFlags::UPDATE_MASK) {
                continue;
            }
            let (fully_masked, fully_unmasked) = match (&self.nodes[index].payload, surface) {
                (NodePayload::Mesh(leaf), Surface::Mesh(surface)) => match surface.mesh().mask() {
                    Some(mask) => mask_state(leaf.verts.iter().map(|&v| mask[v as usize])),
                    None => (false, true),
                },
                (NodePayload::Grids(_), Surface::Grids(surface)) => {
                    let ccg = surface.ccg();
                    if ccg.key().has_mask() {
                        let masks = ccg.masks();
                        mask_state(self.node_prims(index).iter().flat_map(|&grid| {
                            ccg.grid_range(grid as usize).map(|i| masks[i])
                        }))
                    } else {
                        (false, true)
                    }
                }
                (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => mask_state(
                    leaf.unique_verts
                        .iter()
                        .chain(&leaf.other_verts)
                        .map(|&v| mesh.mask(v)),
                ),
                _ => continue,
            };
            let node = &mut self.nodes[index];
            node.flags.set(NodeFlags::FULLY_MASKED, fully_masked);
            node.flags.set(NodeFlags::FULLY_UNMASKED, fully_unmasked);
            node.flags.remove(NodeFlags::UPDATE_MASK);
        }
        Ok(())
    }

    /// Refresh the fully hidden flag of visibility-dirty leaves.
    pub fn update_visibility(&mut self, surface: &Surface) -> Result<(), TreeError> {
        self.check_surface(surface)?;
        let dirty: Vec<usize> = self.visibility_dirty.iter_ones().collect();
        for index in dirty {
            let fully_hidden = match (&self.nodes[index].payload, surface) {
                (NodePayload::Mesh(_), Surface::Mesh(surface)) => {
                    let faces = self.node_prims(index);
                    surface.mesh().hide_poly().is_some_and(|hide| {
                        !faces.is_empty() && faces.iter().all(|&face| hide[face as usize])
                    })
                }
                (NodePayload::Grids(_), Surface::Grids(surface)) => {
                    let ccg = surface.ccg();
                    let grids = self.node_prims(index);
                    ccg.grid_hidden().is_some_and(|hidden| {
                        !grids.is_empty()
                            && grids.iter().all(|&grid| {
                                visible_quads_num(&hidden[grid as usize], ccg.grid_size()) == 0
                            })
                    })
                }
                (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => {
                    !leaf.faces.is_empty() && leaf.faces.iter().all(|&f| mesh.is_face_hidden(f))
                }
                _ => false,
            };
            self.nodes[index].flags.set(NodeFlags::FULLY_HIDDEN, fully_hidden);
            self.visibility_dirty.set(index, false);
        }
        Ok(())
    }

    /// Recompute face and vertex normals around normals-dirty leaves.
    pub fn update_normals(&mut self, surface: &mut Surface) -> Result<(), TreeError> {
        self.check_surface(surface)?;
        let dirty: Vec<usize> = self
            .normals_dirty
            .iter_ones()
            .filter(|&node| self.nodes[node].is_leaf())
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }

        match surface {
            Surface::Mesh(surface) => {
                let mesh = surface.mesh();
                // Every face touching a moved vertex changes
                let mut face_mask = BitVector::new(mesh.faces_num(), false);
                for &node in &dirty {
                    if let Some(leaf) = self.nodes[node].as_mesh() {
                        for &vert in leaf.verts() {
                            for &face in mesh.vert_faces(vert as usize) {
                                face_mask.set(face as usize, true);
                            }
                        }
                    }
                }
                let faces: Vec<usize> = face_mask.iter_ones().collect();
                let mut vert_mask = BitVector::new(mesh.verts_num(), false);
                for &face in &faces {
                    for &vert in mesh.face_verts(face) {
                        vert_mask.set(vert as usize, true);
                    }
                }
                let verts: Vec<usize> = vert_mask.iter_ones().collect();
                surface.update_face_normals(&faces);
                surface.update_vert_normals(&verts);
            }
            Surface::Grids(surface) => {
                let ccg = surface.ccg();
                let mut faces = Vec::new();
                for &node in &dirty {
                    faces.extend(self.node_grid_faces(node, ccg.grid_to_face_map()));
                }
                faces.sort_unstable();
                faces.dedup();
                surface.ccg_mut().update_normals(&faces);
            }
            Surface::DynTopo(mesh) => {
                let mut verts = BTreeSet::new();
                for &node in &dirty {
                    if let Some(leaf) = self.nodes[node].as_dyntopo() {
                        verts.extend(leaf.unique_verts.iter().chain(&leaf.other_verts).copied());
                    }
                }
                update_dyntopo_normals(mesh, &verts);
            }
        }

        for node in dirty {
            self.normals_dirty.set(node, false);
        }
        Ok(())
    }
}

fn update_dyntopo_normals(mesh: &mut DynMesh, verts: &BTreeSet<DynVertId>) {
    let faces: BTreeSet<DynFaceId> = verts
        .iter()
        .filter(|&&v| mesh.is_vert_alive(v))
        .flat_map(|&v| mesh.vert_faces(v).iter().copied())
        .collect();
    for &face in &faces {
        mesh.update_face_normal(face);
    }
    let touched: BTreeSet<DynVertId> = faces.iter().flat_map(|&f| mesh.face_verts(f)).collect();
    for vert in touched {
        mesh.update_vert_normal(vert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MeshSurface;
    use glam::Vec3;
    use chisel_config::SculptConfig;
    use subdiv::Mesh;

    fn mesh_tree(mesh: Mesh, leaf_limit: usize) -> (SpatialTree, Surface) {
        let config = SculptConfig {
            leaf_limit,
            ..Default::default()
        };
        let surface = MeshSurface::new(mesh);
        let tree = SpatialTree::from_mesh(&surface, &config);
        (tree, Surface::Mesh(surface))
    }

    fn check_bounds_sound(tree: &SpatialTree, surface: &Surface) {
        for leaf in tree.all_leaf_nodes() {
            let mut node = Some(leaf);
            let exact = tree.leaf_bounds(leaf, surface);
            while let Some(index) = node {
                assert!(tree.node(index).bounds().contains(&exact));
                node = tree.node(index).parent();
            }
        }
    }

    #[test]
    fn test_update_and_flush_bounds() {
        let (mut tree, mut surface) = mesh_tree(Mesh::quad_grid(8, 8, 4.0), 4);
        let Surface::Mesh(mesh_surface) = &mut surface else {
            unreachable!()
        };
        let leaf = tree.prim_leaf(0).unwrap();
        let vert = tree.node(leaf).as_mesh().unwrap().unique_verts()[0] as usize;
        mesh_surface.translate_vert(vert, Vec3::new(0.0, 0.0, 3.0));

        tree.tag_positions_changed(&[leaf]);
        tree.update_bounds(&surface).unwrap();
        assert!(!tree.is_bounds_dirty(leaf));
        assert_eq!(tree.node(leaf).bounds().max.z, 3.0);
        tree.flush_bounds_to_parents();

        assert_eq!(tree.bounds().max.z, 3.0);
        assert!(tree.nodes().iter().all(|n| !n.flags().contains(NodeFlags::UPDATE_BOUNDS)));
        check_bounds_sound(&tree, &surface);
    }

    #[test]
    fn test_bounds_orig_kept_until_stored() {
        let (mut tree, mut surface) = mesh_tree(Mesh::quad_grid(2, 2, 2.0), 1);
        let before = tree.bounds();
        if let Surface::Mesh(mesh_surface) = &mut surface {
            mesh_surface.translate_vert(0, Vec3::new(0.0, 0.0, -2.0));
        }
        let leaves = tree.all_leaf_nodes();
        tree.tag_positions_changed(&leaves);
        tree.update_bounds(&surface).unwrap();
        tree.flush_bounds_to_parents();
        assert_eq!(*tree.node(0).bounds_orig(), before);
        assert_eq!(tree.bounds().min.z, -2.0);
        tree.store_bounds_orig();
        assert_eq!(tree.node(0).bounds_orig().min.z, -2.0);
    }

    #[test]
    fn test_update_mask_flags() {
        let mut mesh = Mesh::quad_grid(2, 1, 1.0);
        mesh.set_mask(Some(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0])).unwrap();
        let (mut tree, surface) = mesh_tree(mesh, 1);
        tree.update_mask(&surface).unwrap();
        for leaf in tree.all_leaf_nodes() {
            assert!(tree.node(leaf).is_fully_masked());
            assert!(!tree.node(leaf).is_fully_unmasked());
        }

        let (mut tree, surface) = mesh_tree(Mesh::quad_grid(2, 1, 1.0), 1);
        tree.update_mask(&surface).unwrap();
        assert!(tree.node(tree.prim_leaf(0).unwrap()).is_fully_unmasked());
    }

    #[test]
    fn test_update_visibility() {
        let (mut tree, mut surface) = mesh_tree(Mesh::quad_grid(2, 1, 1.0), 1);
        let leaf = tree.prim_leaf(1).unwrap();
        assert!(!tree.node(leaf).is_fully_hidden());
        if let Surface::Mesh(mesh_surface) = &mut surface {
            mesh_surface
                .mesh_mut()
                .set_hide_poly(Some(vec![false, true]))
                .unwrap();
        }
        tree.tag_visibility_changed(&[leaf]);
        tree.update_visibility(&surface).unwrap();
        assert!(tree.node(leaf).is_fully_hidden());
        assert!(!tree.is_visibility_dirty(leaf));
    }

    #[test]
    fn test_update_normals_after_move() {
        let (mut tree, mut surface) = mesh_tree(Mesh::quad_grid(1, 1, 2.0), 4);
        if let Surface::Mesh(mesh_surface) = &mut surface {
            // Tilt the quad around the x axis
            mesh_surface.translate_vert(2, Vec3::new(0.0, 0.0, 2.0));
            mesh_surface.translate_vert(3, Vec3::new(0.0, 0.0, 2.0));
        }
        tree.tag_positions_changed(&[0]);
        tree.update_normals(&mut surface).unwrap();
        let Surface::Mesh(mesh_surface) = &surface else {
            unreachable!()
        };
        let normal = mesh_surface.face_normals()[0];
        assert!(normal.y < -0.5 && normal.z > 0.5);
        assert!(!tree.is_normals_dirty(0));
    }

    #[test]
    fn test_mask_state() {
        assert_eq!(mask_state([1.0, 1.0].into_iter()), (true, false));
        assert_eq!(mask_state([0.0, 0.0].into_iter()), (false, true));
        assert_eq!(mask_state([0.0, 0.5].into_iter()), (false, false));
    }
}
