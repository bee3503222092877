//! Top-down construction of mesh and grids trees.
//!
//! Primitives are split recursively at the midpoint of the dominant axis of
//! their centroid bounds. Primitives of one coarse face always stay together
//! and a leaf never mixes materials.

use std::collections::HashSet;
use std::ops::Range;

use chisel_config::SculptConfig;
use glam::Vec3;
use subdiv::{BitVector, Mesh};
use tracing::debug;

use super::{GridsLeaf, MeshLeaf, NodeFlags, NodePayload, SpatialNode, SpatialTree, TreeKind};
use crate::spatial::Bounds;
use crate::surface::{GridsSurface, MeshSurface};

/// Per-primitive data the partition reads.
struct BuildContext<'a> {
    prim_bounds: &'a [Bounds],
    prim_to_face: &'a [u32],
    face_centers: &'a [Vec3],
    /// Some face owns more than one primitive
    faces_span_prims: bool,
    materials: Option<&'a [i32]>,
}

impl BuildContext<'_> {
    #[inline]
    fn face(&self, prim: u32) -> u32 {
        self.prim_to_face[prim as usize]
    }

    #[inline]
    fn material(&self, prim: u32) -> i32 {
        self.materials
            .map_or(0, |materials| materials[self.face(prim) as usize])
    }

    fn materials_match(&self, a: u32, b: u32) -> bool {
        self.material(a) == self.material(b)
    }

    fn needs_material_split(&self, prims: &[u32]) -> bool {
        match prims.first() {
            Some(&first) if self.materials.is_some() => {
                prims.iter().any(|&prim| !self.materials_match(first, prim))
            }
            _ => false,
        }
    }

    fn bounds_of(&self, prims: &[u32]) -> Bounds {
        if prims.is_empty() {
            return Bounds::ZERO;
        }
        prims.iter().fold(Bounds::empty(), |acc, &prim| {
            acc.union(&self.prim_bounds[prim as usize])
        })
    }

    fn centroid_bounds(&self, prims: &[u32]) -> Bounds {
        Bounds::from_points(
            prims
                .iter()
                .map(|&prim| self.prim_bounds[prim as usize].center()),
        )
    }
}

/// Hoare partition of `prims` by the side of `mid` their face centre lies
/// on; returns the size of the lower part. When faces span several
/// primitives both parts are regrouped so each face stays contiguous.
fn partition_prim_indices(prims: &mut [u32], ctx: &BuildContext, axis: usize, mid: f32) -> usize {
    let below = |prim: u32| ctx.face_centers[ctx.face(prim) as usize][axis] < mid;
    let mut i = 0;
    let mut j = prims.len();
    loop {
        while i < j && below(prims[i]) {
            i += 1;
        }
        while i < j && !below(prims[j - 1]) {
            j -= 1;
        }
        if i >= j {
            break;
        }
        prims.swap(i, j - 1);
        i += 1;
        j -= 1;
    }
    if ctx.faces_span_prims {
        let (lower, upper) = prims.split_at_mut(i);
        lower.sort_unstable_by_key(|&prim| (ctx.face(prim), prim));
        upper.sort_unstable_by_key(|&prim| (ctx.face(prim), prim));
    }
    i
}

/// Centre of every face, from the bounds of its primitives.
fn face_centers(prim_bounds: &[Bounds], prim_to_face: &[u32], faces_num: usize) -> Vec<Vec3> {
    let mut bounds = vec![Bounds::empty(); faces_num];
    for (prim, &face) in prim_to_face.iter().enumerate() {
        bounds[face as usize] = bounds[face as usize].union(&prim_bounds[prim]);
    }
    bounds.iter().map(Bounds::center).collect()
}

/// Move primitives sharing the first primitive's material to the front.
/// Only called when at least two materials are present.
fn partition_material(prims: &mut [u32], ctx: &BuildContext) -> usize {
    let first = prims[0];
    let mut i = 0;
    let mut j = prims.len() - 1;
    loop {
        while ctx.materials_match(first, prims[i]) {
            i += 1;
        }
        while !ctx.materials_match(first, prims[j]) {
            j -= 1;
        }
        if i >= j {
            return i;
        }
        prims.swap(i, j);
        i += 1;
    }
}

/// Split position between two faces closest to the middle of `prims`.
fn face_boundary_near_middle(prims: &[u32], ctx: &BuildContext) -> Option<usize> {
    let mid = prims.len() / 2;
    for distance in 0..prims.len() {
        for i in [mid + distance, mid.wrapping_sub(distance)] {
            if i > 0 && i < prims.len() && ctx.face(prims[i]) != ctx.face(prims[i - 1]) {
                return Some(i);
            }
        }
    }
    None
}

impl SpatialTree {
    /// Split the primitive range of `node`; returns the leaves created in
    /// depth-first order together with their ranges.
    fn build_recursive(
        &mut self,
        ctx: &BuildContext,
        node: usize,
        range: Range<usize>,
        leaves: &mut Vec<(usize, Range<usize>)>,
    ) {
        let prims = &mut self.prim_indices[range.clone()];
        self.nodes[node].bounds = ctx.bounds_of(prims);
        self.nodes[node].bounds_orig = self.nodes[node].bounds;

        let below_leaf_limit = prims.len() <= self.leaf_limit;
        if below_leaf_limit && !ctx.needs_material_split(prims) {
            leaves.push((node, range));
            return;
        }

        let split = if below_leaf_limit {
            partition_material(prims, ctx)
        } else {
            let centroids = ctx.centroid_bounds(prims);
            let axis = centroids.longest_axis();
            let mid = centroids.center()[axis];
            partition_prim_indices(prims, ctx, axis, mid)
        };

        let split = if split == 0 || split == prims.len() {
            // Centroids coincide along the axis
            match face_boundary_near_middle(prims, ctx) {
                Some(split) => split,
                None => {
                    leaves.push((node, range));
                    return;
                }
            }
        } else {
            split
        };

        let parent = Some(node as u32);
        let first = self.push_node(SpatialNode::leaf(parent, NodePayload::Inner));
        self.push_node(SpatialNode::leaf(parent, NodePayload::Inner));
        self.nodes[node].children_offset = first as u32;
        self.nodes[node].flags.remove(NodeFlags::LEAF);

        let mid = range.start + split;
        self.build_recursive(ctx, first, range.start..mid, leaves);
        self.build_recursive(ctx, first + 1, mid..range.end, leaves);
    }

    fn build_prims(
        &mut self,
        ctx: &BuildContext,
        prims_num: usize,
    ) -> Vec<(usize, Range<usize>)> {
        self.prim_indices = (0..prims_num as u32).collect();
        self.prim_to_leaf = vec![0; prims_num];
        self.push_node(SpatialNode::leaf(None, NodePayload::Inner));
        let mut leaves = Vec::new();
        self.build_recursive(ctx, 0, 0..prims_num, &mut leaves);
        for (leaf, range) in &leaves {
            for &prim in &self.prim_indices[range.clone()] {
                self.prim_to_leaf[prim as usize] = *leaf as u32;
            }
            self.nodes[*leaf].flags |= NodeFlags::UPDATE_MASK;
        }
        leaves
    }

    /// Build a tree over the faces of a mesh surface.
    pub fn from_mesh(surface: &MeshSurface, config: &SculptConfig) -> Self {
        let mesh = surface.mesh();
        let positions = surface.positions();
        let mut tree = Self::with_kind(TreeKind::Mesh, config.leaf_limit, config);

        let prim_bounds: Vec<Bounds> = (0..mesh.faces_num())
            .map(|face| {
                Bounds::from_points(mesh.face_verts(face).iter().map(|&v| positions[v as usize]))
            })
            .collect();
        let prim_to_face: Vec<u32> = (0..mesh.faces_num() as u32).collect();
        let face_centers: Vec<Vec3> = prim_bounds.iter().map(Bounds::center).collect();
        let ctx = BuildContext {
            prim_bounds: &prim_bounds,
            prim_to_face: &prim_to_face,
            face_centers: &face_centers,
            faces_span_prims: false,
            materials: mesh.material_index(),
        };
        let leaves = tree.build_prims(&ctx, mesh.faces_num());

        // Vertices go to the first leaf that references them
        let mut claimed = BitVector::new(mesh.verts_num(), false);
        tree.vert_to_leaf = vec![u32::MAX; mesh.verts_num()];
        for (leaf, range) in &leaves {
            let faces = &tree.prim_indices[range.clone()];
            let mut seen = HashSet::new();
            let mut unique = Vec::new();
            let mut shared = Vec::new();
            for &face in faces {
                for &vert in mesh.face_verts(face as usize) {
                    if !seen.insert(vert) {
                        continue;
                    }
                    if claimed.get(vert as usize) {
                        shared.push(vert);
                    } else {
                        claimed.set(vert as usize, true);
                        tree.vert_to_leaf[vert as usize] = *leaf as u32;
                        unique.push(vert);
                    }
                }
            }
            let fully_hidden = mesh.hide_poly().is_some_and(|hide| {
                !faces.is_empty() && faces.iter().all(|&face| hide[face as usize])
            });

            let unique_verts_num = unique.len();
            unique.extend(shared);
            let node = &mut tree.nodes[*leaf];
            node.flags.set(NodeFlags::FULLY_HIDDEN, fully_hidden);
            node.payload = NodePayload::Mesh(MeshLeaf {
                prims: range.clone(),
                verts: unique,
                unique_verts_num,
            });
        }

        debug!(
            "Built mesh tree: {} faces, {} nodes, {} leaves",
            mesh.faces_num(),
            tree.nodes.len(),
            leaves.len()
        );
        tree
    }

    /// Build a tree over the grids of a subdivision surface. `mesh` is the
    /// coarse base mesh the grids were baked from.
    pub fn from_grids(surface: &GridsSurface, mesh: &Mesh, config: &SculptConfig) -> Self {
        let ccg = surface.ccg();
        let grid_area = ccg.grid_area().max(1);
        let max_face_grids = ccg
            .faces()
            .iter()
            .map(|face| face.num_grids as usize)
            .max()
            .unwrap_or(1);
        let leaf_limit = (config.leaf_limit / grid_area).max(max_face_grids);
        let mut tree = Self::with_kind(TreeKind::Grids, leaf_limit, config);

        let prim_bounds: Vec<Bounds> = (0..ccg.grids_num())
            .map(|grid| Bounds::from_points(ccg.grid_positions(grid).iter().copied()))
            .collect();
        let face_centers = face_centers(&prim_bounds, ccg.grid_to_face_map(), ccg.faces().len());
        let ctx = BuildContext {
            prim_bounds: &prim_bounds,
            prim_to_face: ccg.grid_to_face_map(),
            face_centers: &face_centers,
            faces_span_prims: max_face_grids > 1,
            materials: mesh.material_index(),
        };
        let leaves = tree.build_prims(&ctx, ccg.grids_num());

        for (leaf, range) in &leaves {
            let grids = &tree.prim_indices[range.clone()];
            let fully_hidden = ccg.grid_hidden().is_some_and(|hidden| {
                !grids.is_empty()
                    && grids
                        .iter()
                        .all(|&grid| visible_quads_num(&hidden[grid as usize], ccg.grid_size()) == 0)
            });
            let node = &mut tree.nodes[*leaf];
            node.flags.set(NodeFlags::FULLY_HIDDEN, fully_hidden);
            node.payload = NodePayload::Grids(GridsLeaf {
                prims: range.clone(),
            });
        }

        debug!(
            "Built grids tree: {} grids, leaf limit {}, {} nodes",
            ccg.grids_num(),
            leaf_limit,
            tree.nodes.len()
        );
        tree
    }
}

/// Number of grid quads none of whose corners is hidden.
pub(crate) fn visible_quads_num(hidden: &BitVector, grid_size: usize) -> usize {
    let mut visible = 0;
    for y in 0..grid_size.saturating_sub(1) {
        for x in 0..grid_size - 1 {
            let corners = [
                y * grid_size + x,
                y * grid_size + x + 1,
                (y + 1) * grid_size + x,
                (y + 1) * grid_size + x + 1,
            ];
            if !corners.iter().any(|&corner| hidden.get(corner)) {
                visible += 1;
            }
        }
    }
    visible
}

/// A grid quad is hidden when any of its corners is.
pub(crate) fn grid_quad_hidden(hidden: Option<&BitVector>, grid_size: usize, x: usize, y: usize) -> bool {
    hidden.is_some_and(|hidden| {
        hidden.get(y * grid_size + x)
            || hidden.get(y * grid_size + x + 1)
            || hidden.get((y + 1) * grid_size + x)
            || hidden.get((y + 1) * grid_size + x + 1)
    })
}
