//! Translations of the individual brushes.

use glam::{Mat4, Vec3};
use rayon::prelude::*;
use subdiv::SubdivCcgCoord;

use super::factors::{filter_above_plane_factors, filter_plane_trim_limit_factors, plane_from_point_normal, scale_factors};
use super::kernel::{BrushFrame, NodeVerts};
use super::translations::{
    calc_translations_to_plane, reset_translations_to_original, scale_translations,
    translations_from_offset_and_factors,
};
use super::{BrushKind, Dab};
use crate::dyntopo::DynVertId;
use crate::surface::Surface;
use crate::tree::SpatialTree;

/// Height of the clay plane above the area plane, relative to the radius.
const CLAY_STRIPS_DISPLACEMENT: f32 = 0.18;

/// Averaged surface under the brush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct AreaPlane {
    pub center: Vec3,
    pub normal: Vec3,
}

/// Average position and normal of the visible vertices within the dab.
/// `None` when there are none.
pub(super) fn calc_area_plane(tree: &SpatialTree, surface: &Surface, nodes: &[usize], dab: &Dab) -> Option<AreaPlane> {
    let radius_sq = dab.radius * dab.radius;
    let (position_sum, normal_sum, count) = nodes
        .par_iter()
        .with_min_len(tree.config().parallel_grain)
        .map_init(NodeVerts::default, |data, &node| {
            data.gather(tree, surface, node);
            let mut position_sum = Vec3::ZERO;
            let mut normal_sum = Vec3::ZERO;
            let mut count = 0usize;
            for i in 0..data.len() {
                if data.hide[i] || data.positions[i].distance_squared(dab.location) >= radius_sq {
                    continue;
                }
                position_sum += data.positions[i];
                normal_sum += data.normals[i];
                count += 1;
            }
            (position_sum, normal_sum, count)
        })
        .reduce(
            || (Vec3::ZERO, Vec3::ZERO, 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );
    if count == 0 {
        return None;
    }
    Some(AreaPlane {
        center: position_sum / count as f32,
        normal: normal_sum.try_normalize().unwrap_or(dab.view_normal),
    })
}

/// World to square-tip space for clay strips. The tip is aligned with the
/// area normal and the stroke direction; without a direction there is no
/// tip.
pub(super) fn clay_strips_mat(area: &AreaPlane, dab: &Dab) -> Option<Mat4> {
    let z = area.normal;
    let x = (dab.grab_delta - z * z.dot(dab.grab_delta)).try_normalize()?;
    let y = z.cross(x);
    let to_world = Mat4::from_cols(
        (x * dab.radius).extend(0.0),
        (y * dab.radius).extend(0.0),
        (z * dab.radius).extend(0.0),
        area.center.extend(1.0),
    );
    Some(to_world.inverse())
}

/// Fill `translations` for one leaf. `factors` may be narrowed further.
pub(super) fn calc_translations(
    frame: &BrushFrame<'_>,
    surface: &Surface,
    data: &NodeVerts,
    factors: &mut [f32],
    translations: &mut Vec<Vec3>,
) {
    let dab = frame.dab;
    match frame.settings.kind {
        BrushKind::Draw => {
            let normal = frame.area.map_or(dab.view_normal, |area| area.normal);
            translations_from_offset_and_factors(normal * dab.radius * dab.strength, factors, translations);
        }
        BrushKind::Inflate => {
            let scale = dab.radius * dab.strength;
            translations.clear();
            translations.extend(
                data.normals
                    .iter()
                    .zip(factors.iter())
                    .map(|(&normal, &factor)| normal * scale * factor),
            );
        }
        BrushKind::Flatten => {
            let Some(area) = frame.area else {
                translations.clear();
                translations.resize(data.len(), Vec3::ZERO);
                return;
            };
            let plane = plane_from_point_normal(area.center, area.normal);
            calc_translations_to_plane(&data.positions, plane, translations);
            if let Some(trim) = frame.settings.plane_trim {
                filter_plane_trim_limit_factors(trim * dab.radius, translations, factors);
            }
            scale_factors(factors, dab.strength);
            scale_translations(translations, factors);
        }
        BrushKind::ClayStrips => {
            let Some(area) = frame.area else {
                translations.clear();
                translations.resize(data.len(), Vec3::ZERO);
                return;
            };
            // Negative strength digs below the surface instead
            let normal = if dab.strength < 0.0 { -area.normal } else { area.normal };
            let center = area.center + normal * dab.radius * CLAY_STRIPS_DISPLACEMENT;
            let plane = plane_from_point_normal(center, normal);
            filter_above_plane_factors(plane, &data.positions, factors);
            calc_translations_to_plane(&data.positions, plane, translations);
            scale_factors(factors, dab.strength.abs());
            scale_translations(translations, factors);
        }
        BrushKind::Grab => {
            translations_from_offset_and_factors(dab.stroke_offset * dab.strength, factors, translations);
            reset_translations_to_original(translations, &data.positions, &data.orig_positions);
        }
        BrushKind::Smooth => {
            let strength = dab.strength.clamp(0.0, 1.0);
            translations.clear();
            translations.extend(data.verts.iter().zip(&data.positions).zip(factors.iter()).map(
                |((&vert, &position), &factor)| {
                    if factor == 0.0 {
                        return Vec3::ZERO;
                    }
                    let average = neighbor_average(surface, vert).unwrap_or(position);
                    (average - position) * factor * strength
                },
            ));
        }
    }
}

fn average(positions: impl Iterator<Item = Vec3>) -> Option<Vec3> {
    let (sum, count) = positions.fold((Vec3::ZERO, 0usize), |(sum, count), p| (sum + p, count + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Average of the vertex's neighbours. Boundary vertices only follow other
/// boundary vertices so open edges keep their outline.
fn neighbor_average(surface: &Surface, vert: usize) -> Option<Vec3> {
    match surface {
        Surface::Mesh(surface) => {
            let mesh = surface.mesh();
            let positions = surface.positions();
            let boundary = mesh.vert_is_boundary(vert);
            average(
                mesh.vert_neighbors(vert)
                    .iter()
                    .map(|&n| n as usize)
                    .filter(|&n| !boundary || mesh.vert_is_boundary(n))
                    .map(|n| positions[n]),
            )
        }
        Surface::Grids(surface) => {
            let ccg = surface.ccg();
            let coord = SubdivCcgCoord::from_index(ccg.key(), vert);
            let neighbors = ccg.neighbor_coords_get(coord, false);
            average(neighbors.unique().iter().map(|&n| ccg.position(n)))
        }
        Surface::DynTopo(mesh) => {
            let vert = DynVertId(vert as u32);
            let boundary = mesh.vert_is_boundary(vert);
            average(
                mesh.vert_neighbors(vert)
                    .iter()
                    .copied()
                    .filter(|&n| !boundary || mesh.vert_is_boundary(n))
                    .map(|n| mesh.co(n)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushSettings;
    use crate::dyntopo::DynMesh;
    use crate::surface::MeshSurface;
    use chisel_config::SculptConfig;
    use subdiv::Mesh;

    #[test]
    fn test_area_plane_skips_hidden() {
        let mut mesh = Mesh::quad_grid(4, 4, 4.0);
        let mut hide = vec![false; mesh.verts_num()];
        // Hidden vertex inside the dab, off centre
        hide[13] = true;
        mesh.set_hide_vert(Some(hide)).unwrap();
        let surface = MeshSurface::new(mesh);
        let tree = SpatialTree::from_mesh(&surface, &SculptConfig::default());
        let surface = Surface::Mesh(surface);
        let dab = Dab::new(Vec3::ZERO, Vec3::Z, 1.5, 0.5);
        let area = calc_area_plane(&tree, &surface, &tree.all_leaf_nodes(), &dab).unwrap();
        // Eight visible vertices remain; (1, 0) is missing from the sum
        assert!(area.center.abs_diff_eq(Vec3::new(-1.0 / 8.0, 0.0, 0.0), 1e-5));
        assert!(area.normal.abs_diff_eq(Vec3::Z, 1e-5));

        let empty = Dab::new(Vec3::new(50.0, 0.0, 0.0), Vec3::Z, 1.0, 0.5);
        assert!(calc_area_plane(&tree, &surface, &tree.all_leaf_nodes(), &empty).is_none());
    }

    #[test]
    fn test_clay_strips_mat() {
        let area = AreaPlane {
            center: Vec3::new(1.0, 0.0, 0.0),
            normal: Vec3::Z,
        };
        let mut dab = Dab::new(area.center, Vec3::Z, 0.5, 1.0);
        assert!(clay_strips_mat(&area, &dab).is_none());
        // Movement along the normal has no direction on the plane either
        dab.grab_delta = Vec3::Z;
        assert!(clay_strips_mat(&area, &dab).is_none());

        dab.grab_delta = Vec3::new(0.0, 2.0, 0.3);
        let mat = clay_strips_mat(&area, &dab).unwrap();
        assert!(mat.transform_point3(area.center).abs_diff_eq(Vec3::ZERO, 1e-5));
        // Stroke direction maps onto the tip's X axis
        let ahead = mat.transform_point3(area.center + Vec3::Y * 0.5);
        assert!(ahead.abs_diff_eq(Vec3::X, 1e-5));
    }

    fn smooth_frame<'a>(settings: &'a BrushSettings, dab: &'a Dab) -> BrushFrame<'a> {
        BrushFrame {
            settings,
            dab,
            area: None,
            cube_mat: None,
        }
    }

    #[test]
    fn test_smooth_mesh_boundary_keeps_outline() {
        // Corner vertex 0 of a 2x2 grid sits on the boundary
        let mut mesh = Mesh::quad_grid(2, 2, 2.0);
        mesh.positions_mut()[4].z = 1.0;
        let surface = Surface::Mesh(MeshSurface::new(mesh));

        // Interior vertex follows its four neighbours
        let interior = neighbor_average(&surface, 4).unwrap();
        assert!(interior.abs_diff_eq(Vec3::ZERO, 1e-5));
        // Boundary edge midpoint ignores the raised interior vertex
        let edge = neighbor_average(&surface, 1).unwrap();
        assert!(edge.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_smooth_translations_scale_with_factor() {
        let mut mesh = Mesh::quad_grid(2, 2, 2.0);
        mesh.positions_mut()[4].z = 1.0;
        let surface = Surface::Mesh(MeshSurface::new(mesh));

        let settings = BrushSettings::smooth();
        let dab = Dab::new(Vec3::ZERO, Vec3::Z, 1.0, 2.0);
        let data = NodeVerts {
            verts: vec![4, 1],
            positions: vec![Vec3::Z, Vec3::new(0.0, -1.0, 0.0)],
            orig_positions: vec![Vec3::ZERO; 2],
            normals: vec![Vec3::Z; 2],
            hide: vec![false; 2],
            masks: vec![0.0; 2],
        };
        let mut factors = vec![0.5, 0.0];
        let mut translations = Vec::new();
        calc_translations(&smooth_frame(&settings, &dab), &surface, &data, &mut factors, &mut translations);
        // Strength clamps to 1
        assert!(translations[0].abs_diff_eq(Vec3::new(0.0, 0.0, -0.5), 1e-5));
        assert_eq!(translations[1], Vec3::ZERO);
    }

    #[test]
    fn test_smooth_dyntopo_neighbors() {
        let mut mesh = Mesh::quad_grid(2, 2, 2.0);
        mesh.positions_mut()[4].z = 1.0;
        let surface = Surface::DynTopo(DynMesh::from_mesh(&mesh));
        // Triangulation adds diagonal neighbours, all flat
        let average = neighbor_average(&surface, 4).unwrap();
        assert!(average.z.abs() < 1e-5);
    }

    #[test]
    fn test_clay_strips_inverts_with_negative_strength() {
        let surface = Surface::Mesh(MeshSurface::new(Mesh::quad_grid(2, 2, 2.0)));
        let settings = BrushSettings::clay_strips();
        let dab = Dab::new(Vec3::ZERO, Vec3::Z, 1.0, -0.5);
        let frame = BrushFrame {
            settings: &settings,
            dab: &dab,
            area: Some(AreaPlane {
                center: Vec3::ZERO,
                normal: Vec3::Z,
            }),
            cube_mat: None,
        };
        let data = NodeVerts {
            verts: vec![4],
            positions: vec![Vec3::ZERO],
            orig_positions: vec![Vec3::ZERO],
            normals: vec![Vec3::Z],
            hide: vec![false],
            masks: vec![0.0],
        };
        let mut factors = vec![1.0];
        let mut translations = Vec::new();
        calc_translations(&frame, &surface, &data, &mut factors, &mut translations);
        assert!(translations[0].abs_diff_eq(Vec3::new(0.0, 0.0, -0.18 * 0.5), 1e-5));
    }
}
