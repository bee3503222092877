//! Catmull-Clark grids: the dense per-corner sampling of a subdivided mesh.
//!
//! Every coarse face corner owns one `grid_size × grid_size` grid. Samples on
//! grid boundaries are stored redundantly by each grid that touches them;
//! [`stitch`] keeps the copies in sync and [`neighbors`] walks across grids.
//!
//! # Layout
//!
//! Positions, normals and masks live in separate dense arrays indexed by
//! [`SubdivCcgCoord::to_index`]. [`CcgKey`] describes the interleaved
//! element layout used when the grids are handed to a serializer.

mod neighbors;
mod normals;
mod stitch;

pub use neighbors::SubdivCcgNeighbors;
pub use stitch::{StitchGroup, StitchKind};

use std::ops::Range;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bits::BitVector;
use crate::error::SubdivError;
use crate::evaluator::{MaskEvaluator, SubdivEvaluator};
use crate::mesh::Mesh;
use crate::multires::{MAX_LEVEL, grid_size};
use stitch::StitchTopology;

/// What to bake into the grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdivToCcgSettings {
    /// Subdivision level, at least 1.
    pub level: u32,
    pub need_normal: bool,
    pub need_mask: bool,
}

impl Default for SubdivToCcgSettings {
    fn default() -> Self {
        Self {
            level: 2,
            need_normal: true,
            need_mask: true,
        }
    }
}

/// Element layout of the grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcgKey {
    pub level: u32,
    /// Bytes per interleaved element.
    pub elem_size: usize,
    pub grid_size: usize,
    pub grid_area: usize,
    /// Bytes per interleaved grid.
    pub grid_bytes: usize,
    /// Byte offset of the normal within an element.
    pub normal_offset: Option<usize>,
    /// Byte offset of the mask within an element.
    pub mask_offset: Option<usize>,
}

impl CcgKey {
    pub fn new(level: u32, has_normals: bool, has_mask: bool) -> Self {
        let position_size = std::mem::size_of::<[f32; 3]>();
        let mut elem_size = position_size;
        let normal_offset = has_normals.then(|| {
            let offset = elem_size;
            elem_size += std::mem::size_of::<[f32; 3]>();
            offset
        });
        let mask_offset = has_mask.then(|| {
            let offset = elem_size;
            elem_size += std::mem::size_of::<f32>();
            offset
        });
        let grid_size = grid_size(level);
        let grid_area = grid_size * grid_size;
        Self {
            level,
            elem_size,
            grid_size,
            grid_area,
            grid_bytes: elem_size * grid_area,
            normal_offset,
            mask_offset,
        }
    }

    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normal_offset.is_some()
    }

    #[inline]
    pub fn has_mask(&self) -> bool {
        self.mask_offset.is_some()
    }
}

/// A sample addressed by grid and grid-local position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubdivCcgCoord {
    pub grid_index: u32,
    pub x: u16,
    pub y: u16,
}

impl SubdivCcgCoord {
    pub fn new(grid_index: u32, x: usize, y: usize) -> Self {
        Self {
            grid_index,
            x: x as u16,
            y: y as u16,
        }
    }

    /// Flat element index into the dense arrays.
    #[inline]
    pub fn to_index(&self, key: &CcgKey) -> usize {
        self.grid_index as usize * key.grid_area + self.y as usize * key.grid_size + self.x as usize
    }

    pub fn from_index(key: &CcgKey, index: usize) -> Self {
        let grid_index = index / key.grid_area;
        let local = index % key.grid_area;
        Self::new(grid_index as u32, local % key.grid_size, local / key.grid_size)
    }

    /// On the outer rim of its grid.
    #[inline]
    pub fn is_grid_boundary(&self, key: &CcgKey) -> bool {
        let max = (key.grid_size - 1) as u16;
        self.x == 0 || self.y == 0 || self.x == max || self.y == max
    }
}

/// Grids of one coarse face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdivCcgFace {
    pub start_grid_index: u32,
    pub num_grids: u32,
}

impl SubdivCcgFace {
    #[inline]
    pub fn grids(&self) -> Range<usize> {
        self.start_grid_index as usize..(self.start_grid_index + self.num_grids) as usize
    }
}

/// Dense grids baked from a subdivision evaluator.
#[derive(Debug, Clone)]
pub struct SubdivCcg {
    key: CcgKey,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    masks: Vec<f32>,
    faces: Vec<SubdivCcgFace>,
    grid_to_face: Vec<u32>,
    grid_hidden: Option<Vec<BitVector>>,
    topology: StitchTopology,
}

impl SubdivCcg {
    /// Bake the grids of every face corner of `mesh`.
    pub fn new(
        mesh: &Mesh,
        settings: SubdivToCcgSettings,
        evaluator: &dyn SubdivEvaluator,
        mask_evaluator: Option<&dyn MaskEvaluator>,
    ) -> Result<Self, SubdivError> {
        if settings.level == 0 || settings.level > MAX_LEVEL {
            return Err(SubdivError::InvalidLevel {
                level: settings.level,
                min: 1,
                max: MAX_LEVEL,
            });
        }

        let need_mask = settings.need_mask && mask_evaluator.is_some();
        let key = CcgKey::new(settings.level, settings.need_normal, need_mask);
        let grids_num = mesh.corners_num();

        let mut faces = Vec::with_capacity(mesh.faces_num());
        let mut grid_to_face = Vec::with_capacity(grids_num);
        for face in 0..mesh.faces_num() {
            let corners = mesh.face_corners(face);
            faces.push(SubdivCcgFace {
                start_grid_index: corners.start as u32,
                num_grids: corners.len() as u32,
            });
            grid_to_face.extend(std::iter::repeat_n(face as u32, corners.len()));
        }

        let topology = StitchTopology::build(mesh, &key, &faces);

        let mut ccg = Self {
            key,
            positions: vec![Vec3::ZERO; grids_num * key.grid_area],
            normals: if key.has_normals() {
                vec![Vec3::ZERO; grids_num * key.grid_area]
            } else {
                Vec::new()
            },
            masks: Vec::new(),
            faces,
            grid_to_face,
            grid_hidden: None,
            topology,
        };

        ccg.update_positions(mesh, evaluator);
        if let Some(mask_evaluator) = mask_evaluator.filter(|_| need_mask) {
            ccg.masks = ccg.eval_grids(mesh, |face, corner, u, v| {
                mask_evaluator.evaluate_mask(mesh, face, corner, u, v)
            });
        }
        ccg.recalc_normals();

        debug!(
            "SubdivCcg::new: level {}, {} grids of {}x{}, {} stitch groups",
            key.level,
            grids_num,
            key.grid_size,
            key.grid_size,
            ccg.topology.groups().len()
        );
        Ok(ccg)
    }

    /// Evaluate a per-element value for every grid cell in parallel.
    fn eval_grids<T: Send + Copy + Default>(
        &self,
        mesh: &Mesh,
        eval: impl Fn(usize, usize, f32, f32) -> T + Sync,
    ) -> Vec<T> {
        debug_assert_eq!(mesh.corners_num(), self.grids_num());
        let key = self.key;
        let max = (key.grid_size - 1).max(1) as f32;
        let mut values = vec![T::default(); self.grids_num() * key.grid_area];
        values
            .par_chunks_mut(key.grid_area)
            .enumerate()
            .for_each(|(grid, values)| {
                let face = self.grid_to_face[grid] as usize;
                let corner = grid - self.faces[face].start_grid_index as usize;
                for y in 0..key.grid_size {
                    for x in 0..key.grid_size {
                        let u = x as f32 / max;
                        let v = y as f32 / max;
                        values[y * key.grid_size + x] = eval(face, corner, u, v);
                    }
                }
            });
        values
    }

    /// Re-evaluate limit positions after the coarse mesh deformed.
    pub fn update_positions(&mut self, mesh: &Mesh, evaluator: &dyn SubdivEvaluator) {
        self.positions = self.eval_grids(mesh, |face, corner, u, v| {
            evaluator.evaluate_position(mesh, face, corner, u, v)
        });
    }

    #[inline]
    pub fn key(&self) -> &CcgKey {
        &self.key
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.key.level
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.key.grid_size
    }

    #[inline]
    pub fn grid_area(&self) -> usize {
        self.key.grid_area
    }

    #[inline]
    pub fn grids_num(&self) -> usize {
        self.grid_to_face.len()
    }

    #[inline]
    pub fn faces(&self) -> &[SubdivCcgFace] {
        &self.faces
    }

    #[inline]
    pub fn grid_to_face_map(&self) -> &[u32] {
        &self.grid_to_face
    }

    #[inline]
    pub fn grid_face(&self, grid: usize) -> usize {
        self.grid_to_face[grid] as usize
    }

    #[inline]
    pub fn grid_range(&self, grid: usize) -> Range<usize> {
        grid * self.key.grid_area..(grid + 1) * self.key.grid_area
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    #[inline]
    pub fn grid_positions(&self, grid: usize) -> &[Vec3] {
        &self.positions[self.grid_range(grid)]
    }

    /// Empty when normals were not requested.
    #[inline]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Empty when masks were not requested.
    #[inline]
    pub fn masks(&self) -> &[f32] {
        &self.masks
    }

    #[inline]
    pub fn masks_mut(&mut self) -> &mut [f32] {
        &mut self.masks
    }

    #[inline]
    pub fn position(&self, coord: SubdivCcgCoord) -> Vec3 {
        self.positions[coord.to_index(&self.key)]
    }

    #[inline]
    pub fn mask(&self, index: usize) -> f32 {
        self.masks.get(index).copied().unwrap_or(0.0)
    }

    /// Stitch groups shared between grids.
    #[inline]
    pub fn stitch_groups(&self) -> &[StitchGroup] {
        self.topology.groups()
    }

    /// Copies of a boundary sample, including itself; `None` for samples
    /// stored only once.
    pub fn coord_duplicates(&self, coord: SubdivCcgCoord) -> Option<&[SubdivCcgCoord]> {
        self.topology
            .group_of(coord.to_index(&self.key))
            .map(|group| self.topology.group_coords(group))
    }

    /// Coarse vertex the sample sits on, if it is a grid corner at a vertex.
    pub fn coord_adjacent_vertex(&self, mesh: &Mesh, coord: SubdivCcgCoord) -> Option<usize> {
        let max = (self.key.grid_size - 1) as u16;
        (coord.x == max && coord.y == max)
            .then(|| mesh.corner_verts()[coord.grid_index as usize] as usize)
    }

    /// Lies on an open boundary of the coarse mesh.
    pub fn coord_is_mesh_boundary(&self, mesh: &Mesh, coord: SubdivCcgCoord) -> bool {
        let max = (self.key.grid_size - 1) as u16;
        let grid = coord.grid_index as usize;
        if coord.x == max && coord.y == max {
            return mesh.vert_is_boundary(mesh.corner_verts()[grid] as usize);
        }
        let face = self.grid_face(grid);
        let start = self.faces[face].start_grid_index as usize;
        let n = self.faces[face].num_grids as usize;
        if coord.x == max {
            return mesh.edge_is_boundary(mesh.corner_edges()[grid] as usize);
        }
        if coord.y == max {
            let prev = start + (grid - start + n - 1) % n;
            return mesh.edge_is_boundary(mesh.corner_edges()[prev] as usize);
        }
        false
    }

    pub fn has_any_hidden(&self) -> bool {
        self.grid_hidden
            .as_ref()
            .is_some_and(|grids| grids.iter().any(BitVector::any))
    }

    pub fn grid_hidden(&self) -> Option<&[BitVector]> {
        self.grid_hidden.as_deref()
    }

    /// Allocate hidden bitmaps (all visible) if missing.
    pub fn grid_hidden_ensure(&mut self) -> &mut [BitVector] {
        let area = self.key.grid_area;
        let grids = self.grids_num();
        self.grid_hidden
            .get_or_insert_with(|| vec![BitVector::new(area, false); grids])
    }

    pub fn grid_hidden_free(&mut self) {
        self.grid_hidden = None;
    }

    #[inline]
    pub fn is_hidden(&self, coord: SubdivCcgCoord) -> bool {
        self.grid_hidden.as_ref().is_some_and(|grids| {
            grids[coord.grid_index as usize]
                .get(coord.y as usize * self.key.grid_size + coord.x as usize)
        })
    }

    /// Interleave positions, normals and masks as described by the key.
    pub fn export_elements(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.positions.len() * self.key.elem_size);
        for (i, position) in self.positions.iter().enumerate() {
            bytes.extend_from_slice(bytemuck::bytes_of(position));
            if self.key.has_normals() {
                bytes.extend_from_slice(bytemuck::bytes_of(&self.normals[i]));
            }
            if self.key.has_mask() {
                bytes.extend_from_slice(bytemuck::bytes_of(&self.masks[i]));
            }
        }
        bytes
    }

    /// Read back elements written by [`Self::export_elements`].
    pub fn import_elements(&mut self, bytes: &[u8]) -> Result<(), SubdivError> {
        let expected = self.positions.len() * self.key.elem_size;
        if bytes.len() != expected {
            return Err(SubdivError::SizeMismatch {
                expected,
                found: bytes.len(),
            });
        }
        for (i, elem) in bytes.chunks_exact(self.key.elem_size).enumerate() {
            self.positions[i] = bytemuck::pod_read_unaligned(&elem[..12]);
            if let Some(offset) = self.key.normal_offset {
                self.normals[i] = bytemuck::pod_read_unaligned(&elem[offset..offset + 12]);
            }
            if let Some(offset) = self.key.mask_offset {
                self.masks[i] = bytemuck::pod_read_unaligned(&elem[offset..offset + 4]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{BilinearEvaluator, VertexMaskEvaluator};

    pub(crate) fn build(mesh: &Mesh, level: u32) -> SubdivCcg {
        let settings = SubdivToCcgSettings {
            level,
            need_normal: true,
            need_mask: true,
        };
        SubdivCcg::new(mesh, settings, &BilinearEvaluator, Some(&VertexMaskEvaluator)).unwrap()
    }

    #[test]
    fn test_coord_to_index() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let ccg = build(&mesh, 2);
        assert_eq!(ccg.grid_size(), 3);
        assert_eq!(ccg.grid_area(), 9);
        let coord = SubdivCcgCoord::new(2, 1, 1);
        assert_eq!(coord.to_index(ccg.key()), 22);
        assert_eq!(SubdivCcgCoord::from_index(ccg.key(), 22), coord);
    }

    #[test]
    fn test_one_grid_per_corner() {
        let mesh = Mesh::quad_grid(2, 1, 1.0);
        let ccg = build(&mesh, 3);
        assert_eq!(ccg.grids_num(), mesh.corners_num());
        let total: u32 = ccg.faces().iter().map(|f| f.num_grids).sum();
        assert_eq!(total as usize, ccg.grids_num());
        assert_eq!(ccg.grid_face(5), 1);
    }

    #[test]
    fn test_level_zero_rejected() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let settings = SubdivToCcgSettings {
            level: 0,
            ..Default::default()
        };
        assert!(matches!(
            SubdivCcg::new(&mesh, settings, &BilinearEvaluator, None),
            Err(SubdivError::InvalidLevel { level: 0, .. })
        ));
    }

    #[test]
    fn test_key_layout() {
        let key = CcgKey::new(3, true, true);
        assert_eq!(key.elem_size, 28);
        assert_eq!(key.normal_offset, Some(12));
        assert_eq!(key.mask_offset, Some(24));
        let key = CcgKey::new(3, false, true);
        assert_eq!(key.elem_size, 16);
        assert_eq!(key.mask_offset, Some(12));
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut mesh = Mesh::quad_grid(1, 1, 1.0);
        mesh.set_mask(Some(vec![0.0, 0.25, 0.5, 1.0])).unwrap();
        let ccg = build(&mesh, 2);
        let bytes = ccg.export_elements();
        assert_eq!(bytes.len(), ccg.grids_num() * ccg.key().grid_bytes);
        let mut copy = build(&Mesh::quad_grid(1, 1, 3.0), 2);
        copy.import_elements(&bytes).unwrap();
        assert_eq!(copy.positions(), ccg.positions());
        assert_eq!(copy.normals(), ccg.normals());
        assert_eq!(copy.masks(), ccg.masks());
    }

    #[test]
    fn test_mesh_boundary_detection() {
        let mesh = Mesh::quad_grid(2, 1, 1.0);
        let ccg = build(&mesh, 2);
        let max = 2;
        // Grid 1 is corner 1 of face 0 (vertex 1, on the bottom rim)
        assert!(ccg.coord_is_mesh_boundary(&mesh, SubdivCcgCoord::new(1, max, max)));
        // Its x=max column runs along edge 1-4, shared with face 1
        assert!(!ccg.coord_is_mesh_boundary(&mesh, SubdivCcgCoord::new(1, max, 1)));
        assert!(!ccg.coord_is_mesh_boundary(&mesh, SubdivCcgCoord::new(1, 0, 0)));
    }

    #[test]
    fn test_hidden_bitmaps() {
        let mesh = Mesh::quad_grid(1, 1, 1.0);
        let mut ccg = build(&mesh, 2);
        assert!(!ccg.has_any_hidden());
        ccg.grid_hidden_ensure()[1].set(4, true);
        assert!(ccg.has_any_hidden());
        assert!(ccg.is_hidden(SubdivCcgCoord::new(1, 1, 1)));
        ccg.grid_hidden_free();
        assert!(!ccg.is_hidden(SubdivCcgCoord::new(1, 1, 1)));
    }
}
