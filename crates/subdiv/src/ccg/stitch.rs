//! Stitching of samples shared between grids.
//!
//! Every sample on a grid rim coincides with samples of other grids:
//! the face centre is shared by all grids of a face, the seams inside a
//! face by two neighbouring corners, coarse edges by the faces using them
//! and coarse vertices by every grid around the vertex. Those sets are
//! precomputed once as stitch groups from the coarse topology alone.

use std::collections::HashMap;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{CcgKey, SubdivCcg, SubdivCcgCoord, SubdivCcgFace};
use crate::bits::BitVector;
use crate::mesh::Mesh;

/// What a stitch group sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StitchKind {
    /// Centre of a coarse face.
    FaceCenter { face: u32 },
    /// Seam between two neighbouring corner grids inside a face.
    InnerEdge { face: u32 },
    /// Sample along a coarse edge.
    MeshEdge { edge: u32 },
    /// Grid corners around a coarse vertex.
    MeshVertex { vert: u32 },
}

/// Coincident samples stored by more than one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchGroup {
    pub kind: StitchKind,
    start: u32,
    len: u32,
}

/// Identity of a rim sample, independent of the grid storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SampleKey {
    FaceCenter(u32),
    InnerEdge { face: u32, corner: u32, step: u32 },
    MeshEdge { edge: u32, step: u32 },
    MeshVertex(u32),
}

#[derive(Debug, Clone, Default)]
pub(super) struct StitchTopology {
    groups: Vec<StitchGroup>,
    coords: Vec<SubdivCcgCoord>,
    /// Element index → group, rim samples only.
    element_group: HashMap<u32, u32>,
}

impl StitchTopology {
    pub(super) fn build(mesh: &Mesh, key: &CcgKey, faces: &[SubdivCcgFace]) -> Self {
        let size = key.grid_size;
        let max = size - 1;
        let mut key_group: HashMap<SampleKey, u32> = HashMap::new();
        let mut members: Vec<(StitchKind, Vec<SubdivCcgCoord>)> = Vec::new();

        for (face, ccg_face) in faces.iter().enumerate() {
            let n = ccg_face.num_grids as usize;
            let start = ccg_face.start_grid_index as usize;
            for local in 0..n {
                let grid = start + local;
                let prev_grid = start + (local + n - 1) % n;
                for y in 0..size {
                    for x in 0..size {
                        let coord = SubdivCcgCoord::new(grid as u32, x, y);
                        if !coord.is_grid_boundary(key) {
                            continue;
                        }
                        let (sample, kind) =
                            classify(mesh, face, grid, prev_grid, (local, n), (x, y), max);
                        let group = *key_group.entry(sample).or_insert_with(|| {
                            members.push((kind, Vec::new()));
                            (members.len() - 1) as u32
                        });
                        members[group as usize].1.push(coord);
                    }
                }
            }
        }

        let mut topology = Self::default();
        for (kind, coords) in members {
            if coords.len() < 2 {
                continue;
            }
            let group = topology.groups.len() as u32;
            for coord in &coords {
                topology.element_group.insert(coord.to_index(key) as u32, group);
            }
            topology.groups.push(StitchGroup {
                kind,
                start: topology.coords.len() as u32,
                len: coords.len() as u32,
            });
            topology.coords.extend(coords);
        }
        topology
    }

    #[inline]
    pub(super) fn groups(&self) -> &[StitchGroup] {
        &self.groups
    }

    #[inline]
    pub(super) fn group_coords(&self, group: usize) -> &[SubdivCcgCoord] {
        let g = &self.groups[group];
        &self.coords[g.start as usize..(g.start + g.len) as usize]
    }

    #[inline]
    pub(super) fn group_of(&self, element: usize) -> Option<usize> {
        self.element_group.get(&(element as u32)).map(|&g| g as usize)
    }
}

/// Key a rim sample of `grid` (local corner `local` of an `n`-gon).
fn classify(
    mesh: &Mesh,
    face: usize,
    grid: usize,
    prev_grid: usize,
    (local, n): (usize, usize),
    (x, y): (usize, usize),
    max: usize,
) -> (SampleKey, StitchKind) {
    let face = face as u32;
    let vert = mesh.corner_verts()[grid];
    if x == max && y == max {
        return (SampleKey::MeshVertex(vert), StitchKind::MeshVertex { vert });
    }
    // Column x=max runs along the edge leaving the corner, row y=max along
    // the edge entering it; both measured in steps from the corner vertex.
    let edge_sample = |edge: u32, steps_from_vert: usize| {
        let [v0, _] = mesh.edges()[edge as usize];
        let step = if v0 == vert {
            steps_from_vert
        } else {
            2 * max - steps_from_vert
        };
        (
            SampleKey::MeshEdge {
                edge,
                step: step as u32,
            },
            StitchKind::MeshEdge { edge },
        )
    };
    if x == max {
        return edge_sample(mesh.corner_edges()[grid], max - y);
    }
    if y == max {
        return edge_sample(mesh.corner_edges()[prev_grid], max - x);
    }
    if x == 0 && y == 0 {
        return (SampleKey::FaceCenter(face), StitchKind::FaceCenter { face });
    }
    // Column x=0 of corner c is row y=0 of corner c-1.
    let (corner, step) = if x == 0 {
        (local, y)
    } else {
        ((local + 1) % n, x)
    };
    (
        SampleKey::InnerEdge {
            face,
            corner: corner as u32,
            step: step as u32,
        },
        StitchKind::InnerEdge { face },
    )
}

/// Mean of the copies, measured relative to the first copy so a group that
/// already agrees maps to exactly the same value.
#[inline]
fn stitched_mean(values: impl ExactSizeIterator<Item = Vec3> + Clone) -> Vec3 {
    let n = values.len() as f32;
    let mut iter = values;
    let Some(first) = iter.next() else {
        return Vec3::ZERO;
    };
    let offset: Vec3 = iter.map(|v| v - first).sum();
    first + offset / n
}

impl SubdivCcg {
    /// Re-synchronize every shared rim sample (positions, normals, masks).
    pub fn average_grids(&mut self) {
        let groups: Vec<usize> = (0..self.topology.groups().len()).collect();
        self.average_groups(&groups);
    }

    /// Re-synchronize only the shared samples that touch the given faces.
    pub fn average_stitch_faces(&mut self, faces: &[usize]) {
        let groups = self.groups_touching_faces(faces);
        trace!(
            "average_stitch_faces: {} faces, {} groups",
            faces.len(),
            groups.len()
        );
        self.average_groups(&groups);
    }

    /// Stitch groups with at least one copy in the grids of `faces`.
    pub(super) fn groups_touching_faces(&self, faces: &[usize]) -> Vec<usize> {
        let mut touched = BitVector::new(self.topology.groups().len(), false);
        let size = self.key.grid_size;
        let max = size - 1;
        for &face in faces {
            for grid in self.faces[face].grids() {
                let base = grid * self.key.grid_area;
                for i in 0..size {
                    for local in [i, i * size, max * size + i, i * size + max] {
                        if let Some(group) = self.topology.group_of(base + local) {
                            touched.set(group, true);
                        }
                    }
                }
            }
        }
        touched.iter_ones().collect()
    }

    /// Grids holding a copy of any sample in the given groups.
    pub fn grids_of_groups(&self, groups: &[usize]) -> Vec<usize> {
        let mut grids = BitVector::new(self.grids_num(), false);
        for &group in groups {
            for coord in self.topology.group_coords(group) {
                grids.set(coord.grid_index as usize, true);
            }
        }
        grids.iter_ones().collect()
    }

    fn average_groups(&mut self, groups: &[usize]) {
        let key = self.key;
        let topology = &self.topology;
        let resolved: Vec<(usize, Vec3, Option<Vec3>, Option<f32>)> = groups
            .par_iter()
            .filter_map(|&group| {
                let coords = topology.group_coords(group);
                let indices = coords.iter().map(|c| c.to_index(&key));
                let first = coords[0].to_index(&key);

                let positions = indices.clone().map(|i| self.positions[i]);
                let normals = key
                    .has_normals()
                    .then(|| indices.clone().map(|i| self.normals[i]));
                let masks = key.has_mask().then(|| indices.clone().map(|i| self.masks[i]));

                let agree = positions.clone().all(|p| p == self.positions[first])
                    && normals
                        .clone()
                        .is_none_or(|mut n| n.all(|v| v == self.normals[first]))
                    && masks
                        .clone()
                        .is_none_or(|mut m| m.all(|v| v == self.masks[first]));
                if agree {
                    return None;
                }

                let position = stitched_mean(positions);
                let normal = normals.map(|n| stitched_mean(n).normalize_or_zero());
                let mask = masks.map(|m| {
                    let n = m.len() as f32;
                    let first = self.masks[first];
                    first + m.map(|v| v - first).sum::<f32>() / n
                });
                Some((group, position, normal, mask))
            })
            .collect();

        for (group, position, normal, mask) in &resolved {
            for coord in self.topology.group_coords(*group) {
                let index = coord.to_index(&key);
                self.positions[index] = *position;
                if let Some(normal) = normal {
                    self.normals[index] = *normal;
                }
                if let Some(mask) = mask {
                    self.masks[index] = *mask;
                }
            }
        }
        trace!("average_groups: {} of {} groups rewritten", resolved.len(), groups.len());
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::build;
    use super::*;

    #[test]
    fn test_group_kinds_on_cube() {
        let mesh = Mesh::cube(2.0);
        let ccg = build(&mesh, 3);
        let count = |pred: fn(&StitchKind) -> bool| {
            ccg.stitch_groups().iter().filter(|g| pred(&g.kind)).count()
        };
        // Every vertex of a cube joins three grids
        assert_eq!(count(|k| matches!(k, StitchKind::MeshVertex { .. })), 8);
        assert_eq!(count(|k| matches!(k, StitchKind::FaceCenter { .. })), 6);
        // 12 edges with 2*max - 1 = 7 interior samples each
        assert_eq!(count(|k| matches!(k, StitchKind::MeshEdge { .. })), 12 * 7);
        let vertex_group = ccg
            .stitch_groups()
            .iter()
            .position(|g| matches!(g.kind, StitchKind::MeshVertex { .. }))
            .unwrap();
        assert_eq!(ccg.topology.group_coords(vertex_group).len(), 3);
    }

    #[test]
    fn test_fresh_grids_agree_on_shared_samples() {
        let mesh = Mesh::cube(2.0);
        let ccg = build(&mesh, 3);
        for group in 0..ccg.stitch_groups().len() {
            let coords = ccg.topology.group_coords(group);
            let first = ccg.position(coords[0]);
            for coord in coords {
                assert!((ccg.position(*coord) - first).length() < 1e-6);
            }
        }
    }

    #[test]
    fn test_average_grids_heals_divergence() {
        let mesh = Mesh::quad_grid(2, 2, 2.0);
        let mut ccg = build(&mesh, 3);
        let group = ccg
            .stitch_groups()
            .iter()
            .position(|g| matches!(g.kind, StitchKind::MeshVertex { .. }) && g.len == 4)
            .unwrap();
        let coords: Vec<_> = ccg.topology.group_coords(group).to_vec();
        let index = coords[0].to_index(ccg.key());
        ccg.positions_mut()[index] += Vec3::new(0.0, 0.0, 0.4);
        ccg.average_grids();
        for coord in &coords {
            assert!((ccg.position(*coord).z - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_average_grids_is_idempotent() {
        let mesh = Mesh::cube(2.0);
        let mut ccg = build(&mesh, 3);
        // Push each grid independently so copies diverge
        for grid in 0..ccg.grids_num() {
            let range = ccg.grid_range(grid);
            for (i, p) in ccg.positions_mut()[range].iter_mut().enumerate() {
                *p += Vec3::splat(0.013 * (grid as f32 + 1.0) + 0.001 * i as f32);
            }
        }
        ccg.average_grids();
        let once = ccg.positions().to_vec();
        let normals_once = ccg.normals().to_vec();
        ccg.average_grids();
        assert_eq!(ccg.positions(), &once[..]);
        assert_eq!(ccg.normals(), &normals_once[..]);
    }

    #[test]
    fn test_average_stitch_faces_limits_scope() {
        let mesh = Mesh::quad_grid(3, 1, 3.0);
        let mut ccg = build(&mesh, 2);
        // Diverge the far right face only
        for grid in ccg.faces()[2].grids() {
            let range = ccg.grid_range(grid);
            for p in &mut ccg.positions_mut()[range] {
                p.z += 1.0;
            }
        }
        let groups = ccg.groups_touching_faces(&[0]);
        assert!(groups.iter().all(|&g| {
            ccg.topology
                .group_coords(g)
                .iter()
                .all(|c| ccg.grid_face(c.grid_index as usize) != 2)
        }));
        ccg.average_stitch_faces(&[0]);
        // Face 2's interior centre is untouched by stitching face 0
        let centre = SubdivCcgCoord::new(ccg.faces()[2].start_grid_index, 0, 0);
        assert_eq!(ccg.position(centre).z, 1.0);
    }
}
