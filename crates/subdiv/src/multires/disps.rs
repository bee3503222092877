//! Per-corner displacement grids.
//!
//! Every mesh corner owns one square grid of tangent-space displacement
//! vectors at a given level, plus an optional hidden bitmap of the same
//! resolution. [`GridDisplacementStore`] holds one [`MDisps`] per corner.

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::hidden::resample_hidden;
use super::{
    DisplacementLayout, MAX_LEVEL, MULTIRES_GRID_TOT, grid_size, level_from_totdisp,
    mdisp_corners,
};
use crate::bits::BitVector;
use crate::error::SubdivError;

/// Displacement grid of a single mesh corner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MDisps {
    /// Subdivision level the grid is stored at.
    pub level: u32,
    /// Row-major `grid_size(level)^2` tangent-space displacements.
    pub disps: Vec<Vec3>,
    /// Hidden cells at the same resolution, if any cell was ever hidden.
    pub hidden: Option<BitVector>,
}

impl MDisps {
    /// Zero displacement grid at `level`.
    pub fn new(level: u32) -> Self {
        Self {
            level,
            disps: vec![Vec3::ZERO; MULTIRES_GRID_TOT[level as usize]],
            hidden: None,
        }
    }

    #[inline]
    pub fn totdisp(&self) -> usize {
        self.disps.len()
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        grid_size(self.level)
    }

    /// Element count and hidden bitmap both agree with the level tag.
    pub fn is_consistent(&self) -> bool {
        self.level <= MAX_LEVEL
            && self.totdisp() == MULTIRES_GRID_TOT[self.level as usize]
            && self
                .hidden
                .as_ref()
                .is_none_or(|hidden| hidden.len() == self.totdisp())
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Vec3 {
        self.disps[y * self.grid_size() + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: Vec3) {
        let size = self.grid_size();
        self.disps[y * size + x] = value;
    }

    /// Copy of this grid at another level (strided copy for both directions,
    /// hidden bitmap resampled alongside).
    pub fn resampled(&self, level: u32) -> Self {
        if level == self.level {
            return self.clone();
        }
        let mut out = Self::new(level);
        copy_grid(&mut out.disps, grid_size(level), &self.disps, self.grid_size());
        out.hidden = self
            .hidden
            .as_ref()
            .map(|hidden| resample_hidden(hidden, self.level, level));
        out
    }

    pub fn hidden_ensure(&mut self) -> &mut BitVector {
        let len = self.totdisp();
        self.hidden.get_or_insert_with(|| BitVector::new(len, false))
    }

    pub fn layout(&self) -> DisplacementLayout {
        DisplacementLayout {
            level: self.level,
            totdisp: self.totdisp(),
            stride: std::mem::size_of::<Vec3>(),
        }
    }

    /// Raw element bytes in the layout described by [`Self::layout`].
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.disps)
    }

    /// Rebuild a grid from bytes written by [`Self::as_bytes`].
    pub fn from_bytes(layout: DisplacementLayout, bytes: &[u8]) -> Result<Self, SubdivError> {
        if layout.level > MAX_LEVEL {
            return Err(SubdivError::InvalidLevel {
                level: layout.level,
                min: 0,
                max: MAX_LEVEL,
            });
        }
        let expected = layout.totdisp * layout.stride;
        if layout.stride != std::mem::size_of::<Vec3>() || bytes.len() != expected {
            return Err(SubdivError::SizeMismatch {
                expected,
                found: bytes.len(),
            });
        }
        let disps: Vec<Vec3> = bytemuck::pod_collect_to_vec(bytes);
        Ok(Self {
            level: layout.level,
            disps,
            hidden: None,
        })
    }
}

/// Copy a square grid of `src_size` into one of `dst_size`.
///
/// Upsampling writes each source value to its strided destination cell and
/// leaves the cells in between untouched; downsampling point samples.
pub fn copy_grid<T: Copy>(dst: &mut [T], dst_size: usize, src: &[T], src_size: usize) {
    debug_assert_eq!(dst.len(), dst_size * dst_size);
    debug_assert_eq!(src.len(), src_size * src_size);

    if dst_size == 1 || src_size == 1 {
        dst[0] = src[0];
        return;
    }

    if dst_size > src_size {
        let skip = (dst_size - 1) / (src_size - 1);
        for y in 0..src_size {
            for x in 0..src_size {
                dst[y * skip * dst_size + x * skip] = src[y * src_size + x];
            }
        }
    } else {
        let skip = (src_size - 1) / (dst_size - 1);
        for y in 0..dst_size {
            for x in 0..dst_size {
                dst[y * dst_size + x] = src[y * skip * src_size + x * skip];
            }
        }
    }
}

/// Displacement grids for every corner of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridDisplacementStore {
    corners: Vec<MDisps>,
}

impl GridDisplacementStore {
    /// Zero displacement for `corners_num` corners at `level`.
    pub fn new(corners_num: usize, level: u32) -> Self {
        Self {
            corners: (0..corners_num).map(|_| MDisps::new(level)).collect(),
        }
    }

    pub fn from_corners(corners: Vec<MDisps>) -> Self {
        Self { corners }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    #[inline]
    pub fn corners(&self) -> &[MDisps] {
        &self.corners
    }

    #[inline]
    pub fn corners_mut(&mut self) -> &mut [MDisps] {
        &mut self.corners
    }

    #[inline]
    pub fn corner(&self, index: usize) -> &MDisps {
        &self.corners[index]
    }

    #[inline]
    pub fn corner_mut(&mut self, index: usize) -> &mut MDisps {
        &mut self.corners[index]
    }

    /// Level shared by every corner, `None` when empty or mixed.
    pub fn level(&self) -> Option<u32> {
        let first = self.corners.first()?.level;
        self.corners
            .iter()
            .all(|corner| corner.level == first)
            .then_some(first)
    }

    /// Resample every corner not already at `level`.
    pub fn ensure_level(&mut self, level: u32) {
        let mut resampled = 0;
        for corner in &mut self.corners {
            if corner.level != level {
                *corner = corner.resampled(level);
                resampled += 1;
            }
        }
        if resampled > 0 {
            debug!("ensure_level: resampled {} corners to level {}", resampled, level);
        }
    }

    /// Match the corner count after a base-mesh topology edit; new corners
    /// start with zero displacement.
    pub fn resize_corners(&mut self, corners_num: usize, level: u32) {
        self.corners.resize_with(corners_num, || MDisps::new(level));
    }

    /// Repair corners whose element count does not match their level tag.
    ///
    /// A foreign level tag on otherwise well-formed data is corrected; data
    /// that describes no single grid is discarded and reallocated at `level`.
    /// Returns how many corners were touched.
    pub fn validate(&mut self, level: u32) -> usize {
        let mut repaired = 0;
        for (index, corner) in self.corners.iter_mut().enumerate() {
            if corner.is_consistent() {
                continue;
            }
            repaired += 1;
            let totdisp = corner.totdisp();
            match (mdisp_corners(totdisp), level_from_totdisp(totdisp)) {
                (1, Some(found)) => {
                    warn!(
                        "corner {}: level tag {} does not match {} elements, retagging as level {}",
                        index, corner.level, totdisp, found
                    );
                    corner.level = found;
                    if corner.hidden.as_ref().is_some_and(|h| h.len() != totdisp) {
                        corner.hidden = None;
                    }
                    *corner = corner.resampled(level);
                }
                (count, _) => {
                    warn!(
                        "corner {}: {} displacement elements match no grid ({} corners inferred), reallocating",
                        index, totdisp, count
                    );
                    *corner = MDisps::new(level);
                }
            }
        }
        repaired
    }

    /// Scale displacements by an object-space matrix.
    ///
    /// Only uniform scale is representable in tangent space; non-uniform
    /// matrices use the cube root of the determinant as a uniform
    /// approximation.
    pub fn apply_scale(&mut self, smat: Mat3) {
        let scale = smat.determinant().abs().cbrt();
        let axis_scales = Vec3::new(
            smat.x_axis.length(),
            smat.y_axis.length(),
            smat.z_axis.length(),
        );
        if (axis_scales.max_element() - axis_scales.min_element()).abs() > 1e-5 {
            debug!(
                "apply_scale: non-uniform scale {:?} approximated by {}",
                axis_scales, scale
            );
        }
        for corner in &mut self.corners {
            corner.disps.iter_mut().for_each(|d| *d *= scale);
        }
    }

    pub fn layouts(&self) -> Vec<DisplacementLayout> {
        self.corners.iter().map(MDisps::layout).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_grid_upsample_writes_strided_cells() {
        let src: Vec<u32> = (0..9).collect();
        let mut dst = vec![u32::MAX; 25];
        copy_grid(&mut dst, 5, &src, 3);
        assert_eq!(dst[0], 0);
        assert_eq!(dst[2], 1);
        assert_eq!(dst[4], 2);
        assert_eq!(dst[2 * 5 + 2], 4);
        assert_eq!(dst[4 * 5 + 4], 8);
        // Intermediate cells are left for a later fill pass
        assert_eq!(dst[1], u32::MAX);
    }

    #[test]
    fn test_copy_grid_downsample_point_samples() {
        let src: Vec<u32> = (0..25).collect();
        let mut dst = vec![0; 9];
        copy_grid(&mut dst, 3, &src, 5);
        assert_eq!(dst, vec![0, 2, 4, 10, 12, 14, 20, 22, 24]);
    }

    #[test]
    fn test_resample_round_trip() {
        let mut disps = MDisps::new(2);
        for (i, d) in disps.disps.iter_mut().enumerate() {
            *d = Vec3::splat(i as f32);
        }
        let up = disps.resampled(4);
        assert_eq!(up.totdisp(), 81);
        assert_eq!(up.resampled(2), disps);
    }

    #[test]
    fn test_validate_reallocates_corrupt_corner() {
        let mut store = GridDisplacementStore::new(2, 2);
        store.corner_mut(1).disps.truncate(8);
        assert_eq!(store.validate(2), 1);
        assert!(store.corner(1).is_consistent());
        assert_eq!(store.corner(1).totdisp(), 9);
        assert!(store.corner(1).disps.iter().all(|d| *d == Vec3::ZERO));
    }

    #[test]
    fn test_validate_retags_foreign_level() {
        let mut store = GridDisplacementStore::new(1, 2);
        let corner = store.corner_mut(0);
        corner.disps = vec![Vec3::ONE; 81];
        assert_eq!(store.validate(2), 1);
        assert_eq!(store.corner(0).level, 2);
        assert_eq!(store.corner(0).disps, vec![Vec3::ONE; 9]);
    }

    #[test]
    fn test_apply_uniform_scale() {
        let mut store = GridDisplacementStore::new(1, 1);
        store.corner_mut(0).disps[0] = Vec3::new(1.0, 2.0, 3.0);
        store.apply_scale(Mat3::from_diagonal(Vec3::splat(2.0)));
        assert!((store.corner(0).disps[0] - Vec3::new(2.0, 4.0, 6.0)).length() < 1e-5);
    }

    #[test]
    fn test_bytes_layout_round_trip() {
        let mut disps = MDisps::new(1);
        disps.disps[3] = Vec3::new(0.5, -1.0, 2.0);
        let layout = disps.layout();
        assert_eq!(layout.stride, 12);
        let restored = MDisps::from_bytes(layout, disps.as_bytes()).unwrap();
        assert_eq!(restored, disps);
        assert!(MDisps::from_bytes(layout, &disps.as_bytes()[..11]).is_err());
    }

    #[test]
    fn test_store_level() {
        let mut store = GridDisplacementStore::new(3, 2);
        assert_eq!(store.level(), Some(2));
        *store.corner_mut(0) = MDisps::new(3);
        assert_eq!(store.level(), None);
        store.ensure_level(2);
        assert_eq!(store.level(), Some(2));
    }
}
