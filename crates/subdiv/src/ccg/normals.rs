//! Grid normals from grid quads, averaged across stitched copies.

use glam::Vec3;
use rayon::prelude::*;
use tracing::trace;

use super::SubdivCcg;

/// Area-weighted normal of the quad whose lowest corner is `(x, y)`.
#[inline]
fn quad_normal(grid: &[Vec3], size: usize, x: usize, y: usize) -> Vec3 {
    let p00 = grid[y * size + x];
    let p10 = grid[y * size + x + 1];
    let p01 = grid[(y + 1) * size + x];
    let p11 = grid[(y + 1) * size + x + 1];
    (p01 - p10).cross(p11 - p00)
}

/// Per-sample normals of one grid, from the quads touching each sample.
fn grid_normals(grid: &[Vec3], size: usize, normals: &mut [Vec3]) {
    let quads = size - 1;
    for y in 0..size {
        for x in 0..size {
            let mut normal = Vec3::ZERO;
            for qy in y.saturating_sub(1)..=y.min(quads - 1) {
                for qx in x.saturating_sub(1)..=x.min(quads - 1) {
                    normal += quad_normal(grid, size, qx, qy);
                }
            }
            normals[y * size + x] = normal.normalize_or_zero();
        }
    }
}

impl SubdivCcg {
    /// Recompute every grid normal, then stitch.
    pub fn recalc_normals(&mut self) {
        if !self.key.has_normals() {
            return;
        }
        let size = self.key.grid_size;
        let positions = &self.positions;
        self.normals
            .par_chunks_mut(self.key.grid_area)
            .zip(positions.par_chunks(self.key.grid_area))
            .for_each(|(normals, grid)| grid_normals(grid, size, normals));
        self.average_grids();
    }

    /// Recompute normals of the grids of `faces` only, then stitch the
    /// samples those grids share.
    pub fn update_normals(&mut self, faces: &[usize]) {
        if !self.key.has_normals() || faces.is_empty() {
            return;
        }
        let size = self.key.grid_size;
        let area = self.key.grid_area;
        let grids: Vec<usize> = faces
            .iter()
            .flat_map(|&face| self.faces[face].grids())
            .collect();

        let computed: Vec<(usize, Vec<Vec3>)> = grids
            .par_iter()
            .map(|&grid| {
                let mut normals = vec![Vec3::ZERO; area];
                grid_normals(self.grid_positions(grid), size, &mut normals);
                (grid, normals)
            })
            .collect();
        for (grid, normals) in computed {
            let range = self.grid_range(grid);
            self.normals[range].copy_from_slice(&normals);
        }

        trace!("update_normals: {} faces, {} grids", faces.len(), grids.len());
        self.average_stitch_faces(faces);
    }
}
