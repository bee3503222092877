//! Coarse polygon mesh with the attributes sculpting reads.
//!
//! Faces are stored as offsets into a flat corner array (one vertex index per
//! face corner). Edges, vertex→face and vertex→edge adjacency are derived once
//! at construction. Optional attributes (hide, mask, material, face sets)
//! mirror the generic attribute layers of the host application.

#[cfg(feature = "bevy")]
mod construction;

use std::collections::HashMap;
use std::ops::Range;

use glam::Vec3;
use smallvec::SmallVec;

use crate::error::MeshError;

/// Type-safe coarse vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

/// Type-safe coarse face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub u32);

/// Polygon mesh with derived topology.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    positions: Vec<Vec3>,
    face_offsets: Vec<u32>,
    corner_verts: Vec<u32>,
    corner_edges: Vec<u32>,
    edges: Vec<[u32; 2]>,
    edge_face_count: Vec<u32>,
    vert_face_offsets: Vec<u32>,
    vert_faces: Vec<u32>,
    vert_edge_offsets: Vec<u32>,
    vert_edges: Vec<u32>,
    hide_vert: Option<Vec<bool>>,
    hide_poly: Option<Vec<bool>>,
    mask: Option<Vec<f32>>,
    material_index: Option<Vec<i32>>,
    face_sets: Option<Vec<i32>>,
}

impl Mesh {
    /// Build a mesh from positions and per-face vertex lists.
    pub fn new(positions: Vec<Vec3>, faces: &[Vec<u32>]) -> Result<Self, MeshError> {
        let mut face_offsets = Vec::with_capacity(faces.len() + 1);
        let mut corner_verts = Vec::new();
        face_offsets.push(0);
        for (face, verts) in faces.iter().enumerate() {
            if verts.len() < 3 {
                return Err(MeshError::DegenerateFace {
                    face,
                    corners: verts.len(),
                });
            }
            for &vert in verts {
                if vert as usize >= positions.len() {
                    return Err(MeshError::VertexOutOfRange {
                        face,
                        vert,
                        verts_num: positions.len(),
                    });
                }
            }
            corner_verts.extend_from_slice(verts);
            face_offsets.push(corner_verts.len() as u32);
        }
        Ok(Self::from_raw(positions, face_offsets, corner_verts))
    }

    /// Build a mesh from a triangle index list.
    pub fn from_triangles(positions: Vec<Vec3>, indices: &[u32]) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::InvalidTopology(
                "Index count not divisible by 3".to_string(),
            ));
        }
        let faces: Vec<Vec<u32>> = indices.chunks(3).map(|tri| tri.to_vec()).collect();
        Self::new(positions, &faces)
    }

    fn from_raw(positions: Vec<Vec3>, face_offsets: Vec<u32>, corner_verts: Vec<u32>) -> Self {
        let verts_num = positions.len();
        let faces_num = face_offsets.len().saturating_sub(1);

        let mut edge_map: HashMap<(u32, u32), u32> = HashMap::new();
        let mut edges: Vec<[u32; 2]> = Vec::new();
        let mut edge_face_count: Vec<u32> = Vec::new();
        let mut corner_edges = vec![0u32; corner_verts.len()];
        for face in 0..faces_num {
            let start = face_offsets[face] as usize;
            let end = face_offsets[face + 1] as usize;
            for corner in start..end {
                let next = if corner + 1 == end { start } else { corner + 1 };
                let a = corner_verts[corner];
                let b = corner_verts[next];
                let key = (a.min(b), a.max(b));
                let edge = *edge_map.entry(key).or_insert_with(|| {
                    edges.push([key.0, key.1]);
                    edge_face_count.push(0);
                    (edges.len() - 1) as u32
                });
                edge_face_count[edge as usize] += 1;
                corner_edges[corner] = edge;
            }
        }

        let (vert_face_offsets, vert_faces) = build_vert_map(verts_num, faces_num, |face| {
            let range = face_offsets[face] as usize..face_offsets[face + 1] as usize;
            corner_verts[range].to_vec()
        });
        let (vert_edge_offsets, vert_edges) =
            build_vert_map(verts_num, edges.len(), |edge| edges[edge].to_vec());

        Self {
            positions,
            face_offsets,
            corner_verts,
            corner_edges,
            edges,
            edge_face_count,
            vert_face_offsets,
            vert_faces,
            vert_edge_offsets,
            vert_edges,
            hide_vert: None,
            hide_poly: None,
            mask: None,
            material_index: None,
            face_sets: None,
        }
    }

    /// Flat `cols × rows` quad grid in the XY plane, centred on the origin.
    pub fn quad_grid(cols: u32, rows: u32, size: f32) -> Self {
        let mut positions = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
        for y in 0..=rows {
            for x in 0..=cols {
                positions.push(Vec3::new(
                    (x as f32 / cols.max(1) as f32 - 0.5) * size,
                    (y as f32 / rows.max(1) as f32 - 0.5) * size,
                    0.0,
                ));
            }
        }
        let mut face_offsets = vec![0];
        let mut corner_verts = Vec::with_capacity((cols * rows * 4) as usize);
        for y in 0..rows {
            for x in 0..cols {
                let v0 = y * (cols + 1) + x;
                corner_verts.extend_from_slice(&[v0, v0 + 1, v0 + cols + 2, v0 + cols + 1]);
                face_offsets.push(corner_verts.len() as u32);
            }
        }
        Self::from_raw(positions, face_offsets, corner_verts)
    }

    /// Closed unit cube made of six outward-facing quads.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        let quads: [[u32; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        let mut face_offsets = vec![0];
        let mut corner_verts = Vec::with_capacity(24);
        for quad in quads {
            corner_verts.extend_from_slice(&quad);
            face_offsets.push(corner_verts.len() as u32);
        }
        Self::from_raw(positions, face_offsets, corner_verts)
    }

    #[inline]
    pub fn verts_num(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn faces_num(&self) -> usize {
        self.face_offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn corners_num(&self) -> usize {
        self.corner_verts.len()
    }

    #[inline]
    pub fn edges_num(&self) -> usize {
        self.edges.len()
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
    pub fn corner_verts(&self) -> &[u32] {
        &self.corner_verts
    }

    #[inline]
    pub fn corner_edges(&self) -> &[u32] {
        &self.corner_edges
    }

    #[inline]
    pub fn edges(&self) -> &[[u32; 2]] {
        &self.edges
    }

    /// Corner index range of a face.
    #[inline]
    pub fn face_corners(&self, face: usize) -> Range<usize> {
        self.face_offsets[face] as usize..self.face_offsets[face + 1] as usize
    }

    #[inline]
    pub fn face_size(&self, face: usize) -> usize {
        self.face_corners(face).len()
    }

    #[inline]
    pub fn face_verts(&self, face: usize) -> &[u32] {
        &self.corner_verts[self.face_corners(face)]
    }

    /// Face that owns a corner.
    pub fn corner_face(&self, corner: usize) -> usize {
        self.face_offsets
            .partition_point(|&offset| offset as usize <= corner)
            .saturating_sub(1)
    }

    /// Faces using a vertex.
    #[inline]
    pub fn vert_faces(&self, vert: usize) -> &[u32] {
        let range = self.vert_face_offsets[vert] as usize..self.vert_face_offsets[vert + 1] as usize;
        &self.vert_faces[range]
    }

    /// Edges using a vertex.
    #[inline]
    pub fn vert_edges(&self, vert: usize) -> &[u32] {
        let range = self.vert_edge_offsets[vert] as usize..self.vert_edge_offsets[vert + 1] as usize;
        &self.vert_edges[range]
    }

    /// Vertices connected to `vert` by an edge.
    pub fn vert_neighbors(&self, vert: usize) -> SmallVec<[u32; 8]> {
        self.vert_edges(vert)
            .iter()
            .map(|&edge| {
                let [a, b] = self.edges[edge as usize];
                if a as usize == vert { b } else { a }
            })
            .collect()
    }

    /// An edge used by fewer than two faces.
    #[inline]
    pub fn edge_is_boundary(&self, edge: usize) -> bool {
        self.edge_face_count[edge] < 2
    }

    pub fn vert_is_boundary(&self, vert: usize) -> bool {
        self.vert_edges(vert)
            .iter()
            .any(|&edge| self.edge_is_boundary(edge as usize))
    }

    /// Average of the face's corner positions.
    pub fn face_center(&self, face: usize) -> Vec3 {
        let verts = self.face_verts(face);
        let sum: Vec3 = verts.iter().map(|&v| self.positions[v as usize]).sum();
        sum / verts.len() as f32
    }

    /// Newell normal of a face, normalized (zero for degenerate faces).
    pub fn face_normal(&self, face: usize) -> Vec3 {
        face_normal_newell(self.face_verts(face), &self.positions)
    }

    /// Area-weighted vertex normals computed from the given positions.
    pub fn vert_normals_from(&self, positions: &[Vec3]) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; self.verts_num()];
        for face in 0..self.faces_num() {
            let normal = face_normal_newell(self.face_verts(face), positions);
            for &vert in self.face_verts(face) {
                normals[vert as usize] += normal;
            }
        }
        normals.iter_mut().for_each(|n| *n = n.normalize_or_zero());
        normals
    }

    pub fn vert_normals(&self) -> Vec<Vec3> {
        self.vert_normals_from(&self.positions)
    }

    pub fn hide_vert(&self) -> Option<&[bool]> {
        self.hide_vert.as_deref()
    }

    pub fn hide_poly(&self) -> Option<&[bool]> {
        self.hide_poly.as_deref()
    }

    pub fn mask(&self) -> Option<&[f32]> {
        self.mask.as_deref()
    }

    pub fn mask_mut(&mut self) -> Option<&mut [f32]> {
        self.mask.as_deref_mut()
    }

    pub fn material_index(&self) -> Option<&[i32]> {
        self.material_index.as_deref()
    }

    pub fn face_sets(&self) -> Option<&[i32]> {
        self.face_sets.as_deref()
    }

    #[inline]
    pub fn is_vert_hidden(&self, vert: usize) -> bool {
        self.hide_vert.as_ref().is_some_and(|hide| hide[vert])
    }

    #[inline]
    pub fn is_face_hidden(&self, face: usize) -> bool {
        self.hide_poly.as_ref().is_some_and(|hide| hide[face])
    }

    #[inline]
    pub fn vert_mask(&self, vert: usize) -> f32 {
        self.mask.as_ref().map_or(0.0, |mask| mask[vert])
    }

    #[inline]
    pub fn face_material(&self, face: usize) -> i32 {
        self.material_index.as_ref().map_or(0, |m| m[face])
    }

    pub fn set_hide_vert(&mut self, hide: Option<Vec<bool>>) -> Result<(), MeshError> {
        check_len("hide_vert", hide.as_deref(), self.verts_num())?;
        self.hide_vert = hide;
        Ok(())
    }

    pub fn set_hide_poly(&mut self, hide: Option<Vec<bool>>) -> Result<(), MeshError> {
        check_len("hide_poly", hide.as_deref(), self.faces_num())?;
        self.hide_poly = hide;
        Ok(())
    }

    pub fn set_mask(&mut self, mask: Option<Vec<f32>>) -> Result<(), MeshError> {
        check_len("mask", mask.as_deref(), self.verts_num())?;
        self.mask = mask;
        Ok(())
    }

    pub fn set_material_index(&mut self, material: Option<Vec<i32>>) -> Result<(), MeshError> {
        check_len("material_index", material.as_deref(), self.faces_num())?;
        self.material_index = material;
        Ok(())
    }

    pub fn set_face_sets(&mut self, face_sets: Option<Vec<i32>>) -> Result<(), MeshError> {
        check_len("face_sets", face_sets.as_deref(), self.faces_num())?;
        self.face_sets = face_sets;
        Ok(())
    }

    /// Hide every face that has a hidden vertex; clears face hiding when no
    /// vertex is hidden.
    pub fn sync_face_hide_from_verts(&mut self) {
        let Some(hide_vert) = self.hide_vert.as_ref() else {
            self.hide_poly = None;
            return;
        };
        let hide_poly: Vec<bool> = (0..self.faces_num())
            .map(|face| {
                self.face_verts(face)
                    .iter()
                    .any(|&v| hide_vert[v as usize])
            })
            .collect();
        self.hide_poly = hide_poly.iter().any(|&h| h).then_some(hide_poly);
    }
}

fn check_len<T>(name: &'static str, values: Option<&[T]>, expected: usize) -> Result<(), MeshError> {
    match values {
        Some(values) if values.len() != expected => Err(MeshError::AttributeLength {
            name,
            len: values.len(),
            expected,
        }),
        _ => Ok(()),
    }
}

/// Newell's method, robust for non-planar polygons.
pub fn face_normal_newell(verts: &[u32], positions: &[Vec3]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for (i, &v) in verts.iter().enumerate() {
        let a = positions[v as usize];
        let b = positions[verts[(i + 1) % verts.len()] as usize];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal.normalize_or_zero()
}

/// Build a CSR vertex → element map from each element's vertices.
fn build_vert_map(
    verts_num: usize,
    elems_num: usize,
    elem_verts: impl Fn(usize) -> Vec<u32>,
) -> (Vec<u32>, Vec<u32>) {
    let mut counts = vec![0u32; verts_num + 1];
    for elem in 0..elems_num {
        for v in elem_verts(elem) {
            counts[v as usize + 1] += 1;
        }
    }
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
    let offsets = counts.clone();
    let mut cursor = counts;
    let mut indices = vec![0u32; offsets[verts_num] as usize];
    for elem in 0..elems_num {
        for v in elem_verts(elem) {
            indices[cursor[v as usize] as usize] = elem as u32;
            cursor[v as usize] += 1;
        }
    }
    (offsets, indices)
}
