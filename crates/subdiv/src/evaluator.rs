//! Limit-surface evaluation seam used to bake CCG grids.
//!
//! A grid belongs to one face corner. Grid-local `(u, v)` runs over
//! `[0, 1]^2` with `(0, 0)` at the face centre, `(1, 0)` at the midpoint of
//! the edge leaving the corner, `(0, 1)` at the midpoint of the edge entering
//! it and `(1, 1)` on the corner vertex. Evaluators must agree on shared grid
//! boundaries for stitching to be a no-op on freshly built grids.

use glam::Vec3;

use crate::mesh::Mesh;

/// Evaluates limit positions of a subdivision surface.
pub trait SubdivEvaluator: Sync {
    /// Position on the grid of `corner` (local index within `face`).
    fn evaluate_position(&self, mesh: &Mesh, face: usize, corner: usize, u: f32, v: f32) -> Vec3;
}

/// Evaluates the sculpt mask carried into grids.
pub trait MaskEvaluator: Sync {
    fn evaluate_mask(&self, mesh: &Mesh, face: usize, corner: usize, u: f32, v: f32) -> f32;
}

/// The four control values of a corner patch.
#[derive(Debug, Clone, Copy)]
struct CornerPatch<T> {
    center: T,
    edge_next: T,
    edge_prev: T,
    vertex: T,
}

impl<T> CornerPatch<T>
where
    T: Copy + std::ops::Add<Output = T> + std::ops::Mul<f32, Output = T>,
{
    fn gather(mesh: &Mesh, face: usize, corner: usize, value: impl Fn(usize) -> T) -> Self {
        let verts = mesh.face_verts(face);
        let n = verts.len();
        let vert = |i: usize| value(verts[i] as usize);
        let mut center = vert(0);
        for i in 1..n {
            center = center + vert(i);
        }
        let next = (corner + 1) % n;
        let prev = (corner + n - 1) % n;
        Self {
            center: center * (1.0 / n as f32),
            edge_next: (vert(corner) + vert(next)) * 0.5,
            edge_prev: (vert(prev) + vert(corner)) * 0.5,
            vertex: vert(corner),
        }
    }

    fn interpolate(&self, u: f32, v: f32) -> T {
        self.center * ((1.0 - u) * (1.0 - v))
            + self.edge_next * (u * (1.0 - v))
            + self.edge_prev * ((1.0 - u) * v)
            + self.vertex * (u * v)
    }
}

/// Bilinear ("simple") subdivision: each corner grid is the bilinear patch
/// through the face centre, the two adjacent edge midpoints and the vertex.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearEvaluator;

impl SubdivEvaluator for BilinearEvaluator {
    fn evaluate_position(&self, mesh: &Mesh, face: usize, corner: usize, u: f32, v: f32) -> Vec3 {
        let positions = mesh.positions();
        CornerPatch::gather(mesh, face, corner, |vert| positions[vert]).interpolate(u, v)
    }
}

/// Interpolates the per-vertex mask attribute with the same corner patch.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexMaskEvaluator;

impl MaskEvaluator for VertexMaskEvaluator {
    fn evaluate_mask(&self, mesh: &Mesh, face: usize, corner: usize, u: f32, v: f32) -> f32 {
        if mesh.mask().is_none() {
            return 0.0;
        }
        CornerPatch::gather(mesh, face, corner, |vert| mesh.vert_mask(vert)).interpolate(u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_patch_control_points() {
        let mesh = Mesh::quad_grid(1, 1, 2.0);
        let eval = BilinearEvaluator;
        // Corner 2 of the quad is vertex 3 at (1, 1)
        assert_eq!(eval.evaluate_position(&mesh, 0, 2, 0.0, 0.0), Vec3::ZERO);
        assert_eq!(eval.evaluate_position(&mesh, 0, 2, 1.0, 1.0), Vec3::new(1.0, 1.0, 0.0));
        // Edge leaving corner 2 goes to vertex 2 at (-1, 1)
        assert_eq!(eval.evaluate_position(&mesh, 0, 2, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(eval.evaluate_position(&mesh, 0, 2, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_shared_inner_edge_agrees() {
        let mesh = Mesh::quad_grid(1, 1, 2.0);
        let eval = BilinearEvaluator;
        for t in [0.25, 0.5, 0.75] {
            // Column u=0 of corner 1 is row v=0 of corner 0
            let a = eval.evaluate_position(&mesh, 0, 1, 0.0, t);
            let b = eval.evaluate_position(&mesh, 0, 0, t, 0.0);
            assert!((a - b).length() < 1e-6);
        }
    }

    #[test]
    fn test_mask_interpolation() {
        let mut mesh = Mesh::quad_grid(1, 1, 2.0);
        mesh.set_mask(Some(vec![1.0, 1.0, 0.0, 0.0])).unwrap();
        let eval = VertexMaskEvaluator;
        assert_eq!(eval.evaluate_mask(&mesh, 0, 0, 1.0, 1.0), 1.0);
        assert_eq!(eval.evaluate_mask(&mesh, 0, 0, 0.0, 0.0), 0.5);
    }
}
