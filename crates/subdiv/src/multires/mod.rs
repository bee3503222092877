//! Multires displacement storage and level reconciliation.
//!
//! - [`disps`] - per-corner displacement grids ([`GridDisplacementStore`])
//! - [`hidden`] - hidden-bitmap resampling between levels
//! - [`disp_run`] - tangent-space APPLY / CALC / ADD passes
//! - [`reconcile`] - level changes driven by the modifier levels

pub mod disp_run;
pub mod disps;
pub mod hidden;
pub mod reconcile;

pub use disp_run::{
    DisplacementMode, apply_displacements, calc_displacements, multires_disp_run, tangent_matrix,
};
pub use disps::{GridDisplacementStore, MDisps, copy_grid};
pub use hidden::{downsample_hidden, upsample_hidden};
pub use reconcile::{DisplacementReconciler, MultiresLevels};

use serde::{Deserialize, Serialize};

/// Highest subdivision level a displacement grid may be stored at.
pub const MAX_LEVEL: u32 = 13;

/// Number of grid elements per corner at each level, indexed by level.
///
/// Level 0 is the degenerate single-sample grid.
pub const MULTIRES_GRID_TOT: [usize; MAX_LEVEL as usize + 1] = [
    1, 4, 9, 25, 81, 289, 1089, 4225, 16641, 66049, 263169, 1050625, 4198401, 16785409,
];

/// Grid side length at a level: `2^(level-1) + 1`, 1 at level 0.
#[inline]
pub const fn grid_size(level: u32) -> usize {
    if level == 0 { 1 } else { (1 << (level - 1)) + 1 }
}

/// Element count of one grid at a level.
#[inline]
pub const fn grid_area(level: u32) -> usize {
    let size = grid_size(level);
    size * size
}

/// Corner counts a legacy per-face displacement block can describe.
const PLAUSIBLE_CORNER_COUNTS: [usize; 3] = [1, 3, 4];

/// Infer how many corner grids a displacement block of `totdisp` elements
/// holds by trying decreasing levels.
///
/// Returns 0 when no level divides `totdisp` into a plausible corner count;
/// callers must then discard and reallocate the data.
pub fn mdisp_corners(totdisp: usize) -> usize {
    if totdisp == 0 {
        return 0;
    }
    for level in (1..=MAX_LEVEL).rev() {
        let area = grid_area(level);
        if totdisp % area != 0 {
            continue;
        }
        let corners = totdisp / area;
        if PLAUSIBLE_CORNER_COUNTS.contains(&corners) {
            return corners;
        }
    }
    0
}

/// Level whose grid area matches `totdisp` exactly.
pub fn level_from_totdisp(totdisp: usize) -> Option<u32> {
    MULTIRES_GRID_TOT
        .iter()
        .position(|&tot| tot == totdisp)
        .map(|level| level as u32)
}

/// In-memory layout contract a serializer must round-trip for one corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplacementLayout {
    pub level: u32,
    pub totdisp: usize,
    /// Bytes per element (three `f32`).
    pub stride: usize,
}
