//! Tangent-space displacement passes over baked grids.
//!
//! Displacements are stored in a per-sample frame built from the base
//! (undisplaced) grid: two tangents from neighbouring samples plus the grid
//! normal. Deforming the coarse mesh moves the frames, and the sculpted
//! detail follows.

use glam::{Mat3, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::disps::GridDisplacementStore;
use crate::ccg::SubdivCcg;
use crate::error::SubdivError;

/// Direction of a displacement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplacementMode {
    /// Tangent displacement → object-space positions (`base + M·d`).
    Apply,
    /// Object-space delta → tangent displacement (`M⁻¹·delta`).
    Calc,
    /// Accumulate an object-space delta into the stored displacement.
    Add,
}

const DEGENERATE_FRAME_EPSILON: f32 = 1e-12;

/// Tangent frame of sample `(x, y)` of a base grid.
///
/// The last row and column have no forward neighbour and use the backward
/// difference instead; the far corner takes its tangents from the previous
/// row and column. Degenerate frames fall back to identity so APPLY and CALC
/// stay inverse to each other.
pub fn tangent_matrix(grid: &[Vec3], normal: Option<Vec3>, size: usize, x: usize, y: usize) -> Mat3 {
    if size < 2 {
        return Mat3::IDENTITY;
    }
    let max = size - 1;
    let co = |x: usize, y: usize| grid[y * size + x];

    let tx = if x < max {
        co(x + 1, y) - co(x, y)
    } else if y == max {
        co(x, y - 1) - co(x - 1, y - 1)
    } else {
        co(x, y) - co(x - 1, y)
    };
    let ty = if y < max {
        co(x, y + 1) - co(x, y)
    } else if x == max {
        co(x - 1, y) - co(x - 1, y - 1)
    } else {
        co(x, y) - co(x, y - 1)
    };

    let tx = tx.normalize_or_zero();
    let ty = ty.normalize_or_zero();
    let normal = normal
        .unwrap_or_else(|| ty.cross(tx))
        .normalize_or_zero();
    let mat = Mat3::from_cols(tx, ty, normal);
    if mat.determinant().abs() < DEGENERATE_FRAME_EPSILON {
        Mat3::IDENTITY
    } else {
        mat
    }
}

fn check_inputs(
    base: &SubdivCcg,
    store: &GridDisplacementStore,
    data_len: usize,
) -> Result<(), SubdivError> {
    let key = base.key();
    if store.len() != base.grids_num() {
        return Err(SubdivError::CornerCountMismatch {
            expected: base.grids_num(),
            found: store.len(),
        });
    }
    let expected = base.grids_num() * key.grid_area;
    if data_len != expected {
        return Err(SubdivError::SizeMismatch {
            expected,
            found: data_len,
        });
    }
    if let Some(corner) = store.corners().iter().find(|c| c.level != key.level) {
        return Err(SubdivError::LevelMismatch {
            expected: key.level,
            found: corner.level,
        });
    }
    Ok(())
}

/// Visit every sample of one base grid with its tangent frame.
fn for_each_frame(base: &SubdivCcg, grid: usize, mut visit: impl FnMut(usize, Vec3, Mat3)) {
    let size = base.grid_size();
    let range = base.grid_range(grid);
    let positions = &base.positions()[range.clone()];
    let normals = base.normals();
    let grid_normals = (!normals.is_empty()).then(|| &normals[range]);
    for y in 0..size {
        for x in 0..size {
            let i = y * size + x;
            let mat = tangent_matrix(positions, grid_normals.map(|n| n[i]), size, x, y);
            visit(i, positions[i], mat);
        }
    }
}

/// Run a displacement pass over every grid of `base`.
///
/// `data` holds one vector per grid sample: the output positions for
/// [`DisplacementMode::Apply`], the object-space deltas for
/// [`DisplacementMode::Calc`] and [`DisplacementMode::Add`].
pub fn multires_disp_run(
    base: &SubdivCcg,
    store: &mut GridDisplacementStore,
    mode: DisplacementMode,
    data: &mut [Vec3],
) -> Result<(), SubdivError> {
    check_inputs(base, store, data.len())?;
    let area = base.grid_area();
    match mode {
        DisplacementMode::Apply => apply_into(base, store, data),
        DisplacementMode::Calc | DisplacementMode::Add => {
            store
                .corners_mut()
                .par_iter_mut()
                .zip(data.par_chunks(area))
                .enumerate()
                .for_each(|(grid, (corner, deltas))| {
                    for_each_frame(base, grid, |i, _, mat| {
                        let tangent = mat.inverse() * deltas[i];
                        if mode == DisplacementMode::Add {
                            corner.disps[i] += tangent;
                        } else {
                            corner.disps[i] = tangent;
                        }
                    });
                });
        }
    }

    debug!(
        "multires_disp_run: {:?} over {} grids at level {}",
        mode,
        base.grids_num(),
        base.level()
    );
    Ok(())
}

fn apply_into(base: &SubdivCcg, store: &GridDisplacementStore, out: &mut [Vec3]) {
    out.par_chunks_mut(base.grid_area())
        .zip(store.corners().par_iter())
        .enumerate()
        .for_each(|(grid, (values, corner))| {
            for_each_frame(base, grid, |i, position, mat| {
                values[i] = position + mat * corner.disps[i];
            });
        });
}

/// Object-space positions of `base` with the stored displacement applied.
pub fn apply_displacements(
    base: &SubdivCcg,
    store: &GridDisplacementStore,
) -> Result<Vec<Vec3>, SubdivError> {
    let mut positions = vec![Vec3::ZERO; base.positions().len()];
    check_inputs(base, store, positions.len())?;
    apply_into(base, store, &mut positions);
    Ok(positions)
}

/// Store the displacement that carries `base` onto `target` positions.
pub fn calc_displacements(
    base: &SubdivCcg,
    store: &mut GridDisplacementStore,
    target: &[Vec3],
) -> Result<(), SubdivError> {
    if target.len() != base.positions().len() {
        return Err(SubdivError::SizeMismatch {
            expected: base.positions().len(),
            found: target.len(),
        });
    }
    let mut deltas: Vec<Vec3> = target
        .iter()
        .zip(base.positions())
        .map(|(target, base)| *target - *base)
        .collect();
    multires_disp_run(base, store, DisplacementMode::Calc, &mut deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccg::SubdivToCcgSettings;
    use crate::evaluator::BilinearEvaluator;
    use crate::mesh::Mesh;

    fn base(mesh: &Mesh, level: u32) -> SubdivCcg {
        let settings = SubdivToCcgSettings {
            level,
            need_normal: true,
            need_mask: false,
        };
        SubdivCcg::new(mesh, settings, &BilinearEvaluator, None).unwrap()
    }

    fn wavy_deltas(count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|i| {
                let t = i as f32 * 0.37;
                Vec3::new(t.sin() * 0.1, t.cos() * 0.05, (t * 1.3).sin() * 0.2)
            })
            .collect()
    }

    #[test]
    fn test_calc_then_apply_reconstructs_delta() {
        let mesh = Mesh::cube(2.0);
        for level in 1..=4 {
            let ccg = base(&mesh, level);
            let mut store = GridDisplacementStore::new(mesh.corners_num(), level);
            let deltas = wavy_deltas(ccg.positions().len());
            let mut input = deltas.clone();
            multires_disp_run(&ccg, &mut store, DisplacementMode::Calc, &mut input).unwrap();

            let applied = apply_displacements(&ccg, &store).unwrap();
            for ((applied, base), delta) in applied.iter().zip(ccg.positions()).zip(&deltas) {
                assert!(((*applied - *base) - *delta).length() < 1e-4, "level {level}");
            }
        }
    }

    #[test]
    fn test_add_accumulates() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let ccg = base(&mesh, 2);
        let mut store = GridDisplacementStore::new(mesh.corners_num(), 2);
        let delta = vec![Vec3::new(0.0, 0.0, 0.1); ccg.positions().len()];
        multires_disp_run(&ccg, &mut store, DisplacementMode::Calc, &mut delta.clone()).unwrap();
        multires_disp_run(&ccg, &mut store, DisplacementMode::Add, &mut delta.clone()).unwrap();
        let applied = apply_displacements(&ccg, &store).unwrap();
        for (applied, base) in applied.iter().zip(ccg.positions()) {
            assert!(((*applied - *base).z - 0.2).abs() < 1e-5);
        }
    }

    #[test]
    fn test_boundary_frames_are_not_degenerate() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let ccg = base(&mesh, 3);
        let size = ccg.grid_size();
        let grid = ccg.grid_positions(0);
        for y in 0..size {
            for x in 0..size {
                let mat = tangent_matrix(grid, None, size, x, y);
                assert!(mat.determinant().abs() > 0.5, "({x}, {y})");
                assert!(!mat.is_nan());
            }
        }
    }

    #[test]
    fn test_level_mismatch_rejected() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let ccg = base(&mesh, 2);
        let mut store = GridDisplacementStore::new(mesh.corners_num(), 3);
        assert!(matches!(
            apply_displacements(&ccg, &store),
            Err(SubdivError::LevelMismatch { expected: 2, found: 3 })
        ));
    }
}
