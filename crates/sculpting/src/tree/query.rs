//! Ray and frustum queries.
//!
//! Tree-level queries visit leaves in order of their distance along (or to)
//! the ray and hand each one to a callback that may shrink the running best
//! value; leaves farther than the best are skipped. Node-level queries test
//! the actual triangles of one leaf.

use glam::Vec3;

use super::build::grid_quad_hidden;
use super::{NodePayload, SpatialNode, SpatialTree};
use crate::spatial::ray::{ray_face_intersection_tri, ray_face_nearest_tri};
use crate::spatial::{Bounds, Frustum};
use crate::surface::Surface;

impl SpatialTree {
    fn query_bounds(node: &SpatialNode, use_original: bool) -> &Bounds {
        if use_original {
            node.bounds_orig()
        } else {
            node.bounds()
        }
    }

    /// Visit leaves with a key in ascending order while the key does not
    /// exceed the running best. `key` prunes a subtree by returning `None`.
    fn search_ordered(
        &self,
        key: impl Fn(&SpatialNode) -> Option<f32>,
        mut hit_fn: impl FnMut(usize, &mut f32),
    ) {
        if self.nodes.is_empty() {
            return;
        }
        let mut leaves = Vec::new();
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let Some(value) = key(node) else {
                continue;
            };
            match node.children() {
                Some([first, second]) => {
                    stack.push(second);
                    stack.push(first);
                }
                None => leaves.push((index, value)),
            }
        }
        leaves.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut best = f32::MAX;
        for (leaf, value) in leaves {
            if value > best {
                break;
            }
            hit_fn(leaf, &mut best);
        }
    }

    /// Call `hit_fn(leaf, &mut depth)` for every leaf the ray enters, nearest
    /// entry first. The callback lowers `depth` when it finds a hit.
    pub fn raycast(
        &self,
        hit_fn: impl FnMut(usize, &mut f32),
        ray_start: Vec3,
        ray_normal: Vec3,
        use_original: bool,
    ) {
        self.search_ordered(
            |node| {
                Self::query_bounds(node, use_original)
                    .ray_intersect(ray_start, ray_normal)
                    .map(|(near, _)| near.max(0.0))
            },
            hit_fn,
        );
    }

    /// Call `hit_fn(leaf, &mut dist_sq)` for leaves ordered by the squared
    /// distance between the ray and their bounds.
    pub fn find_nearest_to_ray(
        &self,
        hit_fn: impl FnMut(usize, &mut f32),
        ray_start: Vec3,
        ray_normal: Vec3,
        use_original: bool,
    ) {
        self.search_ordered(
            |node| {
                let bounds = Self::query_bounds(node, use_original);
                (!bounds.is_empty()).then(|| bounds.dist_sq_to_ray(ray_start, ray_normal).0)
            },
            hit_fn,
        );
    }

    /// Move the endpoints of an orthographic ray to where it enters and
    /// leaves the (slightly padded) root bounds. Far-away endpoints would
    /// otherwise lose precision in the ray tests.
    pub fn clip_ray_ortho(
        &self,
        ray_start: &mut Vec3,
        ray_end: &mut Vec3,
        ray_normal: Vec3,
        use_original: bool,
    ) {
        let Some(root) = self.nodes.first() else {
            return;
        };
        let root_bounds = *Self::query_bounds(root, use_original);
        if root_bounds.is_empty() || ray_normal.length_squared() == 0.0 {
            return;
        }

        // Rough interval around the point of the ray nearest the bounds centre
        let center = root_bounds.center();
        let segment = *ray_end - *ray_start;
        let t = if segment.length_squared() > 0.0 {
            (center - *ray_start).dot(segment) / segment.length_squared()
        } else {
            0.0
        };
        let on_ray = *ray_start + segment * t;
        let extent = root_bounds.size().length();
        let start = on_ray - ray_normal * extent;
        let end = on_ray + ray_normal * extent;

        // Pad for flat meshes and faces touching the bounds
        let half = root_bounds.max - center + Vec3::splat(1e-3);
        let padded = Bounds::new(center - half * (1.0 + 1e-3), center + half * (1.0 + 1e-3));

        let Some((enter, _)) = padded.ray_intersect(start, ray_normal) else {
            return;
        };
        let Some((exit, _)) = padded.ray_intersect(end, -ray_normal) else {
            return;
        };
        *ray_start = start + ray_normal * enter;
        *ray_end = end - ray_normal * exit;
    }

    pub fn node_frustum_contain_aabb(&self, node: usize, frustum: &Frustum) -> bool {
        frustum.contains_aabb(self.nodes[node].bounds())
    }

    pub fn node_frustum_exclude_aabb(&self, node: usize, frustum: &Frustum) -> bool {
        frustum.excludes_aabb(self.nodes[node].bounds())
    }

    /// Leaves at least partially inside the frustum.
    pub fn gather_frustum_nodes(&self, frustum: &Frustum) -> Vec<usize> {
        self.search_nodes(|node| frustum.contains_aabb(node.bounds()))
    }

    /// Intersect the ray with the visible triangles of a leaf, lowering
    /// `depth` on a nearer hit.
    pub fn node_raycast(
        &self,
        surface: &Surface,
        node: usize,
        ray_start: Vec3,
        ray_normal: Vec3,
        depth: &mut f32,
        use_original: bool,
    ) -> bool {
        let mut hit = false;
        self.for_each_leaf_tri(surface, node, use_original, |tri| {
            hit |= ray_face_intersection_tri(ray_start, ray_normal, tri, depth);
        });
        hit
    }

    /// Track the triangle of a leaf nearest to the ray.
    #[allow(clippy::too_many_arguments)]
    pub fn node_nearest_to_ray(
        &self,
        surface: &Surface,
        node: usize,
        ray_start: Vec3,
        ray_normal: Vec3,
        depth: &mut f32,
        dist_sq: &mut f32,
        use_original: bool,
    ) -> bool {
        let mut hit = false;
        self.for_each_leaf_tri(surface, node, use_original, |tri| {
            hit |= ray_face_nearest_tri(ray_start, ray_normal, tri, depth, dist_sq);
        });
        hit
    }

    /// Visible triangles of a leaf: polygon fans for meshes, two triangles
    /// per grid quad, and dynamic-topology triangles (from the stroke-start
    /// snapshot when original coordinates are requested).
    fn for_each_leaf_tri(
        &self,
        surface: &Surface,
        node: usize,
        use_original: bool,
        mut f: impl FnMut([Vec3; 3]),
    ) {
        match (&self.nodes[node].payload, surface) {
            (NodePayload::Mesh(_), Surface::Mesh(surface)) => {
                let mesh = surface.mesh();
                let positions = if use_original {
                    surface.orig_positions()
                } else {
                    surface.positions()
                };
                for &face in self.node_prims(node) {
                    let face = face as usize;
                    if mesh.is_face_hidden(face) {
                        continue;
                    }
                    let verts = mesh.face_verts(face);
                    for i in 1..verts.len() - 1 {
                        f([
                            positions[verts[0] as usize],
                            positions[verts[i] as usize],
                            positions[verts[i + 1] as usize],
                        ]);
                    }
                }
            }
            (NodePayload::Grids(_), Surface::Grids(surface)) => {
                let ccg = surface.ccg();
                let size = ccg.grid_size();
                let positions = if use_original {
                    surface.orig_positions()
                } else {
                    ccg.positions()
                };
                let hidden = ccg.grid_hidden();
                for &grid in self.node_prims(node) {
                    let grid = grid as usize;
                    let base = ccg.grid_range(grid).start;
                    let grid_hidden = hidden.map(|hidden| &hidden[grid]);
                    for y in 0..size - 1 {
                        for x in 0..size - 1 {
                            if grid_quad_hidden(grid_hidden, size, x, y) {
                                continue;
                            }
                            let p = |x: usize, y: usize| positions[base + y * size + x];
                            let quad = [p(x, y), p(x + 1, y), p(x + 1, y + 1), p(x, y + 1)];
                            f([quad[0], quad[1], quad[2]]);
                            f([quad[0], quad[2], quad[3]]);
                        }
                    }
                }
            }
            (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => match (&leaf.orig, use_original)
            {
                (Some(orig), true) => {
                    for tri in &orig.tris {
                        f(tri.map(|i| orig.positions[i as usize]));
                    }
                }
                _ => {
                    for &face in &leaf.faces {
                        if !mesh.is_face_hidden(face) {
                            f(mesh.face_positions(face));
                        }
                    }
                }
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MeshSurface;
    use chisel_config::SculptConfig;
    use subdiv::Mesh;

    fn tree_over(mesh: Mesh, leaf_limit: usize) -> (SpatialTree, Surface) {
        let config = SculptConfig {
            leaf_limit,
            ..Default::default()
        };
        let surface = MeshSurface::new(mesh);
        (SpatialTree::from_mesh(&surface, &config), Surface::Mesh(surface))
    }

    /// Two parallel quads at z = 0 and z = -2.
    fn stacked() -> Mesh {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -2.0),
            Vec3::new(1.0, 1.0, -2.0),
            Vec3::new(-1.0, 1.0, -2.0),
        ];
        Mesh::new(positions, &[vec![0, 1, 2, 3], vec![4, 5, 6, 7]]).unwrap()
    }

    #[test]
    fn test_raycast_visits_nearest_first() {
        let (tree, surface) = tree_over(stacked(), 1);
        let mut visited = Vec::new();
        let mut depth_found = f32::MAX;
        tree.raycast(
            |leaf, depth| {
                visited.push(leaf);
                if tree.node_raycast(&surface, leaf, Vec3::new(0.1, 0.2, 5.0), -Vec3::Z, depth, false) {
                    depth_found = *depth;
                }
            },
            Vec3::new(0.1, 0.2, 5.0),
            -Vec3::Z,
            false,
        );
        // The upper quad is hit first and prunes the lower one
        assert_eq!(visited, [tree.prim_leaf(0).unwrap()]);
        assert!((depth_found - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_raycast_continues_past_miss() {
        let (tree, surface) = tree_over(stacked(), 1);
        let mut mesh_surface = surface.as_mesh().unwrap().clone();
        mesh_surface
            .mesh_mut()
            .set_hide_poly(Some(vec![true, false]))
            .unwrap();
        let surface = Surface::Mesh(mesh_surface);
        let mut depth_found = f32::MAX;
        let mut visits = 0;
        tree.raycast(
            |leaf, depth| {
                visits += 1;
                if tree.node_raycast(&surface, leaf, Vec3::new(0.0, 0.0, 5.0), -Vec3::Z, depth, false) {
                    depth_found = *depth;
                }
            },
            Vec3::new(0.0, 0.0, 5.0),
            -Vec3::Z,
            false,
        );
        assert_eq!(visits, 2);
        assert!((depth_found - 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_to_ray_beside_mesh() {
        let (tree, surface) = tree_over(Mesh::quad_grid(4, 4, 2.0), 2);
        let start = Vec3::new(2.0, 0.0, 1.0);
        let mut best = None;
        tree.find_nearest_to_ray(
            |leaf, dist_sq| {
                let mut depth = f32::MAX;
                if tree.node_nearest_to_ray(&surface, leaf, start, -Vec3::Z, &mut depth, dist_sq, false) {
                    best = Some((*dist_sq, depth));
                }
            },
            start,
            -Vec3::Z,
            false,
        );
        let (dist_sq, depth) = best.unwrap();
        assert!((dist_sq - 1.0).abs() < 1e-4);
        assert!((depth - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_clip_ray_ortho() {
        let (tree, _) = tree_over(Mesh::quad_grid(2, 2, 2.0), 4);
        let mut start = Vec3::new(0.0, 0.0, 1000.0);
        let mut end = Vec3::new(0.0, 0.0, -1000.0);
        tree.clip_ray_ortho(&mut start, &mut end, -Vec3::Z, false);
        assert!(start.z > 0.0 && start.z < 0.1);
        assert!(end.z < 0.0 && end.z > -0.1);

        let mut start = Vec3::new(0.0, 0.0, 1000.0);
        let mut end = start;
        tree.clip_ray_ortho(&mut start, &mut end, Vec3::ZERO, false);
        assert_eq!(start.z, 1000.0);
    }

    #[test]
    fn test_frustum_gather() {
        let (tree, _) = tree_over(Mesh::quad_grid(4, 4, 4.0), 2);
        let frustum = Frustum::from_box_xy(Vec3::new(-2.5, -2.5, 0.0), Vec3::new(-1.5, -1.5, 0.0));
        let gathered = tree.gather_frustum_nodes(&frustum);
        assert!(!gathered.is_empty());
        assert!(gathered.len() < tree.all_leaf_nodes().len());
        let corner_leaf = tree.prim_leaf(0).unwrap();
        assert!(gathered.contains(&corner_leaf));
        assert!(tree.node_frustum_contain_aabb(corner_leaf, &frustum));
        assert!(tree.node_frustum_exclude_aabb(corner_leaf, &frustum));

        let everything = Frustum::from_box_xy(Vec3::splat(-10.0), Vec3::splat(10.0));
        assert!(!tree.node_frustum_exclude_aabb(0, &everything));
        assert_eq!(tree.gather_frustum_nodes(&everything), tree.all_leaf_nodes());
    }
}
