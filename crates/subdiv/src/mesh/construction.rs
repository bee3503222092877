//! Conversion between Bevy render meshes and the coarse sculpt mesh.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::Mesh as BevyMesh;
use glam::Vec3;
use std::collections::HashMap;

use super::Mesh;
use crate::error::MeshError;

impl Mesh {
    /// Build a coarse mesh from a Bevy triangle mesh.
    ///
    /// Render meshes duplicate vertices along UV seams; those are welded by
    /// quantized position so the sculpt mesh is connected across seams.
    pub fn from_bevy_mesh(mesh: &BevyMesh) -> Result<Self, MeshError> {
        let positions = mesh
            .attribute(BevyMesh::ATTRIBUTE_POSITION)
            .and_then(|attr| attr.as_float3())
            .ok_or(MeshError::NoPositions)?;

        let indices: Vec<u32> = match mesh.indices() {
            Some(Indices::U16(idx)) => idx.iter().map(|&i| i as u32).collect(),
            Some(Indices::U32(idx)) => idx.to_vec(),
            None => return Err(MeshError::NoIndices),
        };

        if indices.len() % 3 != 0 {
            return Err(MeshError::InvalidTopology(
                "Index count not divisible by 3".to_string(),
            ));
        }

        let quantize = |p: &[f32; 3]| -> [i64; 3] {
            [
                (p[0] * 1_000_000.0) as i64,
                (p[1] * 1_000_000.0) as i64,
                (p[2] * 1_000_000.0) as i64,
            ]
        };

        let mut position_to_welded: HashMap<[i64; 3], u32> = HashMap::new();
        let mut welded_positions: Vec<Vec3> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(positions.len());
        for pos in positions {
            let welded = *position_to_welded.entry(quantize(pos)).or_insert_with(|| {
                welded_positions.push(Vec3::from_array(*pos));
                (welded_positions.len() - 1) as u32
            });
            remap.push(welded);
        }

        let welded_count = positions.len() - welded_positions.len();
        if welded_count > 0 {
            tracing::debug!(
                "from_bevy_mesh: welded {} duplicate vertices ({} unique of {} total)",
                welded_count,
                welded_positions.len(),
                positions.len()
            );
        }

        // Drop triangles that collapsed after welding
        let faces: Vec<Vec<u32>> = indices
            .chunks(3)
            .map(|tri| [remap[tri[0] as usize], remap[tri[1] as usize], remap[tri[2] as usize]])
            .filter(|tri| tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2])
            .map(|tri| tri.to_vec())
            .collect();

        Self::new(welded_positions, &faces)
    }

    /// Convert to a flat-shaded Bevy mesh (fan triangulation, unshared vertices).
    pub fn to_bevy_mesh(&self) -> BevyMesh {
        let mut positions: Vec<[f32; 3]> = Vec::with_capacity(self.corners_num());
        let mut normals: Vec<[f32; 3]> = Vec::with_capacity(self.corners_num());
        let mut indices: Vec<u32> = Vec::new();

        for face in 0..self.faces_num() {
            let verts = self.face_verts(face);
            let normal = self.face_normal(face).to_array();
            let base = positions.len() as u32;
            for &v in verts {
                positions.push(self.positions[v as usize].to_array());
                normals.push(normal);
            }
            for i in 1..(verts.len() as u32 - 1) {
                indices.extend_from_slice(&[base, base + i, base + i + 1]);
            }
        }

        let mut mesh = BevyMesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        mesh.insert_attribute(BevyMesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(BevyMesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_indices(Indices::U32(indices));
        mesh
    }
}
