//! Keeping displacement grids consistent with the multires levels.
//!
//! The store holds tangent displacements at the top level. Raising the top
//! level bakes the displaced surface at the old level, refines it, and
//! recomputes displacement against the finer base; lowering point-samples
//! the displaced surface. Either way the visible surface is preserved.

use std::borrow::Cow;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::disp_run::{DisplacementMode, apply_displacements, calc_displacements, multires_disp_run};
use super::disps::{GridDisplacementStore, MDisps, copy_grid};
use super::hidden::{downsample_hidden, upsample_hidden};
use super::{MAX_LEVEL, grid_size};
use crate::ccg::{SubdivCcg, SubdivToCcgSettings};
use crate::error::SubdivError;
use crate::evaluator::{MaskEvaluator, SubdivEvaluator};
use crate::mesh::Mesh;

/// Subdivision levels of a multires stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiresLevels {
    /// Level the displacement is stored at.
    pub total: u32,
    pub sculpt: u32,
    pub render: u32,
    /// Viewport preview level.
    pub view: u32,
}

impl MultiresLevels {
    /// Every level at `total`.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            sculpt: total,
            render: total,
            view: total,
        }
    }

    /// Move the top level. Every other level follows it to the new top.
    pub fn set_total(&mut self, total: u32) {
        *self = Self::new(total);
    }
}

/// Bakes and re-derives displacement grids for one coarse mesh.
pub struct DisplacementReconciler<'a> {
    mesh: &'a Mesh,
    evaluator: &'a dyn SubdivEvaluator,
    mask_evaluator: Option<&'a dyn MaskEvaluator>,
}

impl<'a> DisplacementReconciler<'a> {
    pub fn new(mesh: &'a Mesh, evaluator: &'a dyn SubdivEvaluator) -> Self {
        Self {
            mesh,
            evaluator,
            mask_evaluator: None,
        }
    }

    pub fn with_mask_evaluator(mut self, mask_evaluator: &'a dyn MaskEvaluator) -> Self {
        self.mask_evaluator = Some(mask_evaluator);
        self
    }

    pub fn mesh(&self) -> &Mesh {
        self.mesh
    }

    /// Undisplaced grids at `level`.
    pub fn base_ccg(&self, level: u32) -> Result<SubdivCcg, SubdivError> {
        let settings = SubdivToCcgSettings {
            level,
            need_normal: true,
            need_mask: self.mask_evaluator.is_some(),
        };
        SubdivCcg::new(self.mesh, settings, self.evaluator, self.mask_evaluator)
    }

    fn check_corners(&self, store: &GridDisplacementStore) -> Result<(), SubdivError> {
        if store.len() != self.mesh.corners_num() {
            return Err(SubdivError::CornerCountMismatch {
                expected: self.mesh.corners_num(),
                found: store.len(),
            });
        }
        Ok(())
    }

    /// Repair the store before use: corrupt corners are reallocated and the
    /// corner count follows the mesh. Returns how many corners changed.
    pub fn validate(&self, store: &mut GridDisplacementStore, level: u32) -> usize {
        let mut touched = store.validate(level);
        let corners_num = self.mesh.corners_num();
        if store.len() != corners_num {
            warn!(
                "displacement store has {} corners, mesh has {}; resizing",
                store.len(),
                corners_num
            );
            touched += store.len().abs_diff(corners_num);
            store.resize_corners(corners_num, level);
        }
        touched
    }

    /// Displaced grids at `level`.
    ///
    /// A store kept at another level is resampled on the fly; the store
    /// itself is not modified.
    pub fn build_ccg(
        &self,
        store: &GridDisplacementStore,
        level: u32,
    ) -> Result<SubdivCcg, SubdivError> {
        self.check_corners(store)?;
        let mut ccg = self.base_ccg(level)?;

        let view = if store.level() == Some(level) {
            Cow::Borrowed(store)
        } else {
            let mut resampled = store.clone();
            resampled.ensure_level(level);
            Cow::Owned(resampled)
        };
        let displaced = apply_displacements(&ccg, &view)?;
        ccg.positions_mut().copy_from_slice(&displaced);
        ccg.recalc_normals();

        if view.corners().iter().any(|corner| corner.hidden.is_some()) {
            let hidden = ccg.grid_hidden_ensure();
            for (grid, corner) in hidden.iter_mut().zip(view.corners()) {
                if let Some(corner_hidden) = &corner.hidden {
                    *grid = corner_hidden.clone();
                }
            }
        }
        Ok(ccg)
    }

    /// Store the displacement that turns the base grids into `sculpted`.
    pub fn reshape_from_ccg(
        &self,
        store: &mut GridDisplacementStore,
        sculpted: &SubdivCcg,
    ) -> Result<(), SubdivError> {
        self.check_corners(store)?;
        let level = sculpted.level();
        let base = self.base_ccg(level)?;
        store.ensure_level(level);
        calc_displacements(&base, store, sculpted.positions())?;

        if let Some(hidden) = sculpted.grid_hidden() {
            for (corner, grid_hidden) in store.corners_mut().iter_mut().zip(hidden) {
                corner.hidden = grid_hidden.any().then(|| grid_hidden.clone());
            }
        }
        debug!("reshape_from_ccg: {} corners at level {}", store.len(), level);
        Ok(())
    }

    /// Raise the top level by one, keeping the sculpted surface.
    pub fn subdivide(
        &self,
        store: &mut GridDisplacementStore,
        levels: &mut MultiresLevels,
    ) -> Result<(), SubdivError> {
        self.check_corners(store)?;
        let old = levels.total;
        let new = old + 1;
        if new > MAX_LEVEL {
            return Err(SubdivError::InvalidLevel {
                level: new,
                min: 0,
                max: MAX_LEVEL,
            });
        }

        if old == 0 {
            // Nothing to preserve beyond the hidden state
            for corner in store.corners_mut() {
                let hidden = corner
                    .hidden
                    .as_ref()
                    .map(|hidden| upsample_hidden(hidden, 0, new, None));
                *corner = MDisps {
                    hidden,
                    ..MDisps::new(new)
                };
            }
            levels.set_total(new);
            return Ok(());
        }

        let coarse = self.build_ccg(store, old)?;
        let fine = self.base_ccg(new)?;
        let (old_size, new_size) = (grid_size(old), grid_size(new));
        let fine_area = fine.grid_area();

        let mut target = vec![Vec3::ZERO; fine.positions().len()];
        target
            .par_chunks_mut(fine_area)
            .enumerate()
            .for_each(|(grid, cells)| {
                copy_grid(cells, new_size, coarse.grid_positions(grid), old_size);
                fill_between_samples(cells, new_size);
            });

        for corner in store.corners_mut() {
            let hidden = corner
                .hidden
                .as_ref()
                .map(|hidden| upsample_hidden(hidden, old, new, None));
            *corner = MDisps {
                hidden,
                ..MDisps::new(new)
            };
        }
        calc_displacements(&fine, store, &target)?;
        levels.set_total(new);
        info!("subdivided displacement from level {} to {}", old, new);
        Ok(())
    }

    /// Move the top level to `total`, raising one level at a time or
    /// dropping straight down.
    pub fn set_total_levels(
        &self,
        store: &mut GridDisplacementStore,
        levels: &mut MultiresLevels,
        total: u32,
    ) -> Result<(), SubdivError> {
        if total > MAX_LEVEL {
            return Err(SubdivError::InvalidLevel {
                level: total,
                min: 0,
                max: MAX_LEVEL,
            });
        }
        self.check_corners(store)?;
        while levels.total < total {
            self.subdivide(store, levels)?;
        }
        if levels.total == total {
            return Ok(());
        }

        let old = levels.total;
        let downsample = |corner: &MDisps| {
            corner
                .hidden
                .as_ref()
                .map(|hidden| downsample_hidden(hidden, total, old))
        };

        if total == 0 {
            for corner in store.corners_mut() {
                let hidden = downsample(corner);
                *corner = MDisps {
                    hidden,
                    ..MDisps::new(0)
                };
            }
            levels.set_total(0);
            return Ok(());
        }

        let fine = self.build_ccg(store, old)?;
        let coarse = self.base_ccg(total)?;
        let (old_size, new_size) = (grid_size(old), grid_size(total));
        let mut target = vec![Vec3::ZERO; coarse.positions().len()];
        target
            .par_chunks_mut(coarse.grid_area())
            .enumerate()
            .for_each(|(grid, cells)| {
                copy_grid(cells, new_size, fine.grid_positions(grid), old_size);
            });

        for corner in store.corners_mut() {
            let hidden = downsample(corner);
            *corner = MDisps {
                hidden,
                ..MDisps::new(total)
            };
        }
        calc_displacements(&coarse, store, &target)?;
        levels.set_total(total);
        info!("lowered displacement from level {} to {}", old, total);
        Ok(())
    }

    /// Keep the final surface `old_final` after the coarse mesh changed
    /// under the store.
    ///
    /// When the corner count changed, new corners start undisplaced and the
    /// surface cannot be carried over.
    pub fn rebase_after_topology_change(
        &self,
        store: &mut GridDisplacementStore,
        old_final: &SubdivCcg,
        level: u32,
    ) -> Result<(), SubdivError> {
        let corners_num = self.mesh.corners_num();
        if store.len() != corners_num {
            store.resize_corners(corners_num, level);
        }
        store.ensure_level(level);
        if old_final.grids_num() != corners_num || old_final.level() != level {
            warn!(
                "rebase: previous surface has {} grids at level {}, mesh has {} corners at level {}; skipping",
                old_final.grids_num(),
                old_final.level(),
                corners_num,
                level
            );
            return Ok(());
        }

        let base = self.base_ccg(level)?;
        let current = apply_displacements(&base, store)?;
        let mut deltas: Vec<Vec3> = old_final
            .positions()
            .iter()
            .zip(&current)
            .map(|(old, new)| *old - *new)
            .collect();
        multires_disp_run(&base, store, DisplacementMode::Add, &mut deltas)
    }
}

/// Bilinear fill of the samples a stride-2 [`copy_grid`] upsample left out.
fn fill_between_samples(cells: &mut [Vec3], size: usize) {
    let at = |x: usize, y: usize| y * size + x;
    for y in (0..size).step_by(2) {
        for x in (1..size).step_by(2) {
            cells[at(x, y)] = (cells[at(x - 1, y)] + cells[at(x + 1, y)]) * 0.5;
        }
    }
    for y in (1..size).step_by(2) {
        for x in (0..size).step_by(2) {
            cells[at(x, y)] = (cells[at(x, y - 1)] + cells[at(x, y + 1)]) * 0.5;
        }
        for x in (1..size).step_by(2) {
            cells[at(x, y)] = (cells[at(x - 1, y - 1)]
                + cells[at(x + 1, y - 1)]
                + cells[at(x - 1, y + 1)]
                + cells[at(x + 1, y + 1)])
                * 0.25;
        }
    }
}
