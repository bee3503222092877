//! Parallel leaf evaluation and write-back.
//!
//! Leaves are evaluated with rayon against an immutable view of the
//! surface. Each leaf only produces translations for the vertices it owns:
//! the unique prefix of a mesh leaf, every element of its grids, or the
//! unique set of a dynamic-topology leaf. Writing them back afterwards
//! therefore touches every vertex at most once, independent of task order.
//! Owners of shared vertices are evaluated even when the node search skipped
//! them, so a visible vertex moves whichever leaf owns it.

use std::collections::BTreeSet;
use std::f32::consts::SQRT_2;

use glam::{Mat4, Vec3};
use rayon::prelude::*;
use tracing::trace;

use super::automask::{apply_texture_factors, Automasking, TextureSampler};
use super::brushes::{self, AreaPlane};
use super::factors::{
    apply_hardness_to_distances, calc_brush_cube_distances, calc_brush_distances,
    calc_brush_strength_factors, calc_front_face, fill_factor_from_hide_and_mask,
    filter_distances_with_radius, filter_region_clip_factors,
};
use super::falloff::FalloffShape;
use super::nodes::{node_in_box, node_in_cylinder, node_in_sphere};
use super::translations::clip_and_lock_translations;
use super::{BrushKind, BrushSettings, Dab};
use crate::dyntopo::DynVertId;
use crate::error::TreeError;
use crate::spatial::Frustum;
use crate::surface::Surface;
use crate::tree::{NodePayload, SpatialTree};

/// Collaborators contributing extra factors.
#[derive(Clone, Copy, Default)]
pub struct BrushContext<'a> {
    pub automasking: Option<&'a dyn Automasking>,
    pub texture: Option<&'a dyn TextureSampler>,
    /// View clipping region; vertices outside are left alone
    pub region_clip: Option<&'a Frustum>,
}

/// Result of applying one dab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrushStats {
    /// Leaves evaluated
    pub nodes: usize,
    /// Vertices written
    pub verts_moved: usize,
}

/// Vertices a leaf owns, with the attributes brushes read.
#[derive(Debug, Default)]
pub(super) struct NodeVerts {
    /// Backend element indices
    pub verts: Vec<usize>,
    pub positions: Vec<Vec3>,
    pub orig_positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub hide: Vec<bool>,
    pub masks: Vec<f32>,
}

impl NodeVerts {
    fn clear(&mut self) {
        self.verts.clear();
        self.positions.clear();
        self.orig_positions.clear();
        self.normals.clear();
        self.hide.clear();
        self.masks.clear();
    }

    fn push(&mut self, vert: usize, position: Vec3, orig: Vec3, normal: Vec3, hidden: bool, mask: f32) {
        self.verts.push(vert);
        self.positions.push(position);
        self.orig_positions.push(orig);
        self.normals.push(normal);
        self.hide.push(hidden);
        self.masks.push(mask);
    }

    pub(super) fn len(&self) -> usize {
        self.verts.len()
    }

    pub(super) fn gather(&mut self, tree: &SpatialTree, surface: &Surface, node: usize) {
        self.clear();
        match (tree.node(node).payload(), surface) {
            (NodePayload::Mesh(leaf), Surface::Mesh(surface)) => {
                let mesh = surface.mesh();
                let positions = surface.positions();
                let orig = surface.orig_positions();
                let normals = surface.vert_normals();
                for &vert in leaf.unique_verts() {
                    let v = vert as usize;
                    self.push(v, positions[v], orig[v], normals[v], mesh.is_vert_hidden(v), mesh.vert_mask(v));
                }
            }
            (NodePayload::Grids(_), Surface::Grids(surface)) => {
                let ccg = surface.ccg();
                let positions = ccg.positions();
                let orig = surface.orig_positions();
                let normals = ccg.normals();
                let hidden = ccg.grid_hidden();
                for &grid in tree.node_prims(node) {
                    let grid = grid as usize;
                    let grid_hidden = hidden.map(|hidden| &hidden[grid]);
                    for (local, i) in ccg.grid_range(grid).enumerate() {
                        let normal = normals.get(i).copied().unwrap_or(Vec3::Z);
                        let is_hidden = grid_hidden.is_some_and(|bits| bits.get(local));
                        self.push(i, positions[i], orig[i], normal, is_hidden, ccg.mask(i));
                    }
                }
            }
            (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => {
                for &vert in leaf.unique_verts() {
                    self.push(
                        vert.0 as usize,
                        mesh.co(vert),
                        mesh.orig_co(vert),
                        mesh.normal(vert),
                        mesh.is_vert_hidden(vert),
                        mesh.mask(vert),
                    );
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct NodeScratch {
    verts: NodeVerts,
    factors: Vec<f32>,
    distances: Vec<f32>,
    translations: Vec<Vec3>,
}

#[derive(Debug, Default)]
struct NodeTranslations {
    verts: Vec<usize>,
    translations: Vec<Vec3>,
}

/// Brush-wide data shared by every leaf of a dab.
pub(super) struct BrushFrame<'a> {
    pub settings: &'a BrushSettings,
    pub dab: &'a Dab,
    pub area: Option<AreaPlane>,
    /// World to square-tip space
    pub cube_mat: Option<Mat4>,
}

/// Leaves a dab can reach. Fully hidden and fully masked leaves are
/// skipped.
pub fn gather_brush_nodes(tree: &SpatialTree, settings: &BrushSettings, dab: &Dab) -> Vec<usize> {
    let use_original = settings.kind.uses_original();
    let location = if use_original { dab.stroke_start() } else { dab.location };
    // The square tip reaches into the corners
    let radius = if settings.kind == BrushKind::ClayStrips {
        dab.radius * SQRT_2
    } else {
        dab.radius
    };
    let radius_sq = radius * radius;
    let mut nodes = tree.search_nodes(|node| match settings.falloff_shape {
        FalloffShape::Sphere => node_in_sphere(node, location, radius_sq, use_original),
        FalloffShape::ProjectedTube => node_in_cylinder(node, location, dab.view_normal, radius_sq, use_original),
    });
    nodes.retain(|&node| {
        let node = tree.node(node);
        !node.is_fully_hidden() && !node.is_fully_masked()
    });
    nodes
}

/// Add the owners of vertices `nodes` share with other leaves. A shared
/// vertex is only written through its owner, which the node search may have
/// left out, for example as fully hidden.
fn add_shared_vert_owners(tree: &SpatialTree, surface: &Surface, nodes: &mut Vec<usize>) {
    let mut owners = BTreeSet::new();
    for &node in nodes.iter() {
        match (tree.node(node).payload(), surface) {
            (NodePayload::Mesh(leaf), Surface::Mesh(_)) => {
                owners.extend(
                    leaf.shared_verts()
                        .iter()
                        .filter_map(|&vert| tree.mesh_vert_leaf(vert as usize)),
                );
            }
            (NodePayload::DynTopo(leaf), Surface::DynTopo(mesh)) => {
                owners.extend(
                    leaf.other_verts()
                        .iter()
                        .filter_map(|&vert| mesh.vert_owner(vert))
                        .map(|owner| owner as usize),
                );
            }
            _ => {}
        }
    }
    let gathered: BTreeSet<usize> = nodes.iter().copied().collect();
    if owners.is_subset(&gathered) {
        return;
    }
    owners.extend(gathered);
    *nodes = owners.into_iter().collect();
}

fn evaluate_node(
    frame: &BrushFrame<'_>,
    ctx: &BrushContext<'_>,
    tree: &SpatialTree,
    surface: &Surface,
    node: usize,
    scratch: &mut NodeScratch,
) -> Option<NodeTranslations> {
    let NodeScratch {
        verts,
        factors,
        distances,
        translations,
    } = scratch;
    verts.gather(tree, surface, node);
    if verts.len() == 0 {
        return None;
    }
    let data: &NodeVerts = verts;
    let settings = frame.settings;
    let dab = frame.dab;
    let use_original = settings.kind.uses_original();
    let positions = if use_original { &data.orig_positions } else { &data.positions };
    let location = if use_original { dab.stroke_start() } else { dab.location };

    factors.clear();
    factors.resize(data.len(), 0.0);
    fill_factor_from_hide_and_mask(Some(data.hide.as_slice()), Some(data.masks.as_slice()), factors);
    filter_region_clip_factors(ctx.region_clip, positions, factors);
    if settings.front_faces_only {
        calc_front_face(dab.view_normal, &data.normals, factors);
    }

    match &frame.cube_mat {
        Some(mat) => {
            calc_brush_cube_distances(mat, settings.tip_roundness, positions, distances);
            filter_distances_with_radius(1.0, distances, factors);
            apply_hardness_to_distances(1.0, settings.hardness, distances);
            calc_brush_strength_factors(settings.falloff, 1.0, distances, factors);
        }
        None => {
            calc_brush_distances(settings.falloff_shape, location, dab.view_normal, positions, distances);
            filter_distances_with_radius(dab.radius, distances, factors);
            apply_hardness_to_distances(dab.radius, settings.hardness, distances);
            calc_brush_strength_factors(settings.falloff, dab.radius, distances, factors);
        }
    }

    if let Some(automasking) = ctx.automasking {
        automasking.calc_factors(node, &data.verts, positions, factors);
    }
    if let Some(texture) = ctx.texture {
        apply_texture_factors(texture, location, dab.radius, positions, factors);
    }
    if factors.iter().all(|&factor| factor == 0.0) {
        return None;
    }

    brushes::calc_translations(frame, surface, data, factors, translations);
    clip_and_lock_translations(&settings.clip_lock, &data.positions, translations);

    let mut result = NodeTranslations::default();
    for (&vert, &translation) in data.verts.iter().zip(translations.iter()) {
        if translation != Vec3::ZERO {
            result.verts.push(vert);
            result.translations.push(translation);
        }
    }
    (!result.verts.is_empty()).then_some(result)
}

/// Apply one dab to `nodes` and refresh their bounds and normals.
pub fn apply_brush(
    tree: &mut SpatialTree,
    surface: &mut Surface,
    nodes: &[usize],
    settings: &BrushSettings,
    dab: &Dab,
    ctx: &BrushContext<'_>,
) -> Result<BrushStats, TreeError> {
    tree.check_surface(surface)?;
    if nodes.is_empty() || dab.radius <= 0.0 {
        return Ok(BrushStats::default());
    }

    let mut nodes = nodes.to_vec();
    add_shared_vert_owners(tree, surface, &mut nodes);
    let area = if settings.kind.uses_area_plane() {
        let Some(area) = brushes::calc_area_plane(tree, surface, &nodes, dab) else {
            trace!("apply_brush: no visible vertices under the brush");
            return Ok(BrushStats::default());
        };
        Some(area)
    } else {
        None
    };

    let cube_mat = match (settings.kind, &area) {
        (BrushKind::ClayStrips, Some(area)) => {
            let Some(mat) = brushes::clay_strips_mat(area, dab) else {
                trace!("apply_brush: square tip needs a stroke direction");
                return Ok(BrushStats::default());
            };
            nodes.retain(|&node| node_in_box(tree.node(node), &mat, false));
            Some(mat)
        }
        _ => None,
    };

    let frame = BrushFrame {
        settings,
        dab,
        area,
        cube_mat,
    };
    let results: Vec<Option<NodeTranslations>> = {
        let tree: &SpatialTree = tree;
        let surface: &Surface = surface;
        nodes
            .par_iter()
            .with_min_len(tree.config().parallel_grain)
            .map_init(NodeScratch::default, |scratch, &node| {
                evaluate_node(&frame, ctx, tree, surface, node, scratch)
            })
            .collect()
    };

    let mut stats = BrushStats {
        nodes: nodes.len(),
        verts_moved: 0,
    };
    let moved = results.iter().flatten();
    match surface {
        Surface::Mesh(surface) => {
            for result in moved {
                for (&vert, &translation) in result.verts.iter().zip(&result.translations) {
                    surface.translate_vert(vert, translation);
                }
                stats.verts_moved += result.verts.len();
            }
        }
        Surface::Grids(surface) => {
            let positions = surface.ccg_mut().positions_mut();
            for result in moved {
                for (&vert, &translation) in result.verts.iter().zip(&result.translations) {
                    positions[vert] += translation;
                }
                stats.verts_moved += result.verts.len();
            }
        }
        Surface::DynTopo(mesh) => {
            for result in moved {
                for (&vert, &translation) in result.verts.iter().zip(&result.translations) {
                    let vert = DynVertId(vert as u32);
                    mesh.set_co(vert, mesh.co(vert) + translation);
                }
                stats.verts_moved += result.verts.len();
            }
        }
    }

    if stats.verts_moved == 0 {
        return Ok(stats);
    }

    if let Surface::Grids(surface) = surface {
        // Copies of rim samples were moved by their own grids
        let faces: BTreeSet<usize> = nodes
            .iter()
            .flat_map(|&node| tree.node_grid_faces(node, surface.ccg().grid_to_face_map()))
            .collect();
        let faces: Vec<usize> = faces.into_iter().collect();
        surface.ccg_mut().average_stitch_faces(&faces);
    }

    tree.tag_positions_changed(&nodes);
    tree.update_bounds(surface)?;
    tree.flush_bounds_to_parents();
    tree.update_normals(surface)?;

    trace!(
        "apply_brush: {:?} moved {} vertices in {} leaves",
        settings.kind,
        stats.verts_moved,
        stats.nodes
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{ClipLock, HalfSpaceAutomask};
    use crate::dyntopo::DynMesh;
    use crate::surface::{GridsSurface, MeshSurface};
    use chisel_config::SculptConfig;
    use subdiv::{BilinearEvaluator, Mesh, SubdivCcg, SubdivToCcgSettings};

    fn config(leaf_limit: usize) -> SculptConfig {
        SculptConfig {
            leaf_limit,
            ..Default::default()
        }
    }

    /// 8x8 grid in the XY plane spanning [-1, 1], split into many leaves.
    fn mesh_setup() -> (SpatialTree, Surface) {
        let surface = MeshSurface::new(Mesh::quad_grid(8, 8, 2.0));
        let tree = SpatialTree::from_mesh(&surface, &config(4));
        (tree, Surface::Mesh(surface))
    }

    fn positions(surface: &Surface) -> Vec<Vec3> {
        surface.as_mesh().unwrap().positions().to_vec()
    }

    fn dab(settings: &BrushSettings) -> Dab {
        Dab::new(Vec3::ZERO, Vec3::Z, 0.6, settings.strength)
    }

    fn run(tree: &mut SpatialTree, surface: &mut Surface, settings: &BrushSettings, dab: &Dab) -> BrushStats {
        let nodes = gather_brush_nodes(tree, settings, dab);
        apply_brush(tree, surface, &nodes, settings, dab, &BrushContext::default()).unwrap()
    }

    /// Index of the vertex at the grid centre.
    const CENTER: usize = 4 * 9 + 4;

    #[test]
    fn test_draw_moves_each_vertex_once() {
        let (mut tree, mut surface) = mesh_setup();
        let settings = BrushSettings::draw();
        let dab = dab(&settings);
        assert!(gather_brush_nodes(&tree, &settings, &dab).len() > 1);

        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert!(stats.verts_moved > 0);

        let after = positions(&surface);
        // Full strength at the centre: radius * strength along the normal
        assert!((after[CENTER].z - 0.6 * 0.5).abs() < 1e-5);
        for p in &after {
            let planar = p.truncate().length();
            if planar >= 0.6 {
                assert_eq!(p.z, 0.0);
            } else {
                assert!(p.z >= 0.0 && p.z <= 0.3 + 1e-5);
            }
        }
        assert!(tree.bounds().max.z > 0.29);
    }

    #[test]
    fn test_mask_and_hide_protect_vertices() {
        let mut mesh = Mesh::quad_grid(8, 8, 2.0);
        let mut mask = vec![0.0; mesh.verts_num()];
        mask[CENTER] = 1.0;
        mask[CENTER + 1] = 0.5;
        mesh.set_mask(Some(mask)).unwrap();
        let surface = MeshSurface::new(mesh);
        let mut tree = SpatialTree::from_mesh(&surface, &config(4));
        let mut surface = Surface::Mesh(surface);

        let settings = BrushSettings::inflate();
        let dab = dab(&settings);
        run(&mut tree, &mut surface, &settings, &dab);

        let after = positions(&surface);
        assert_eq!(after[CENTER].z, 0.0);
        assert!(after[CENTER + 1].z > 0.0);
        assert!(after[CENTER - 1].z > after[CENTER + 1].z);
    }

    #[test]
    fn test_hidden_owner_leaf_still_moves_shared_vertex() {
        let mut mesh = Mesh::quad_grid(2, 1, 2.0);
        mesh.set_hide_poly(Some(vec![true, false])).unwrap();
        let surface = MeshSurface::new(mesh);
        let mut tree = SpatialTree::from_mesh(&surface, &config(1));
        let mut surface = Surface::Mesh(surface);
        let hidden_leaf = tree.prim_leaf(0).unwrap();
        let visible_leaf = tree.prim_leaf(1).unwrap();
        assert!(tree.node(hidden_leaf).is_fully_hidden());
        // The corner both faces use belongs to the hidden leaf
        assert_eq!(tree.mesh_vert_leaf(1), Some(hidden_leaf));

        let settings = BrushSettings::draw();
        let dab = Dab::new(Vec3::new(0.2, -0.8, 0.0), Vec3::Z, 0.9, settings.strength);
        assert_eq!(gather_brush_nodes(&tree, &settings, &dab), vec![visible_leaf]);
        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert_eq!(stats.nodes, 2);

        let after = positions(&surface);
        assert!(after[1].z > 0.0);
        assert!(after[1].z > after[2].z);
    }

    #[test]
    fn test_dyntopo_shared_vertex_moves_through_owner() {
        let mut mesh = DynMesh::from_mesh(&Mesh::quad_grid(4, 4, 2.0));
        let config = SculptConfig {
            dyntopo_leaf_limit: 4,
            ..Default::default()
        };
        let mut tree = SpatialTree::from_dyntopo(&mut mesh, &config);
        let (leaf, vert) = tree
            .all_leaf_nodes()
            .into_iter()
            .find_map(|leaf| {
                let other = tree.node(leaf).as_dyntopo()?.other_verts();
                other.iter().next().map(|&vert| (leaf, vert))
            })
            .unwrap();
        assert_ne!(mesh.vert_owner(vert).map(|owner| owner as usize), Some(leaf));
        let before = mesh.co(vert);
        let mut surface = Surface::DynTopo(mesh);

        // Only a leaf that uses the vertex without owning it is passed in
        let settings = BrushSettings::draw();
        let dab = Dab::new(before, Vec3::Z, 0.3, settings.strength);
        let stats = apply_brush(&mut tree, &mut surface, &[leaf], &settings, &dab, &BrushContext::default()).unwrap();
        assert!(stats.nodes >= 2);

        let Surface::DynTopo(mesh) = &surface else {
            unreachable!()
        };
        assert!(mesh.co(vert).distance(before) > 0.1);
        assert!(tree.check_dyntopo_ownership(mesh));
    }

    #[test]
    fn test_front_faces_only() {
        let (mut tree, mut surface) = mesh_setup();
        let settings = BrushSettings {
            front_faces_only: true,
            ..BrushSettings::draw()
        };
        let mut dab = dab(&settings);
        dab.view_normal = -Vec3::Z;
        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert_eq!(stats.verts_moved, 0);
    }

    #[test]
    fn test_automask_applies() {
        let (mut tree, mut surface) = mesh_setup();
        let settings = BrushSettings::draw();
        let dab = dab(&settings);
        let automask = HalfSpaceAutomask {
            origin: Vec3::ZERO,
            axis: Vec3::X,
            blend: 0.0,
        };
        let ctx = BrushContext {
            automasking: Some(&automask),
            ..Default::default()
        };
        let nodes = gather_brush_nodes(&tree, &settings, &dab);
        apply_brush(&mut tree, &mut surface, &nodes, &settings, &dab, &ctx).unwrap();
        for p in positions(&surface) {
            if p.x < 0.0 {
                assert_eq!(p.z, 0.0);
            }
        }
        assert!(positions(&surface)[CENTER + 1].z > 0.0);
    }

    #[test]
    fn test_flatten_pulls_to_plane() {
        let (mut tree, mut surface) = mesh_setup();
        if let Surface::Mesh(mesh) = &mut surface {
            mesh.translate_vert(CENTER, Vec3::new(0.0, 0.0, 0.5));
            mesh.recalc_normals();
        }
        let leaves = tree.all_leaf_nodes();
        tree.tag_positions_changed(&leaves);
        tree.update_bounds(&surface).unwrap();
        tree.flush_bounds_to_parents();

        let settings = BrushSettings {
            strength: 1.0,
            ..BrushSettings::flatten()
        };
        let dab = dab(&settings);
        run(&mut tree, &mut surface, &settings, &dab);
        let after = positions(&surface);
        assert!(after[CENTER].z < 0.5);
    }

    #[test]
    fn test_clay_strips_needs_direction() {
        let (mut tree, mut surface) = mesh_setup();
        let settings = BrushSettings::clay_strips();
        let mut dab = dab(&settings);
        let before = positions(&surface);
        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert_eq!(stats, BrushStats::default());
        assert_eq!(positions(&surface), before);

        dab.grab_delta = Vec3::new(0.1, 0.0, 0.0);
        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert!(stats.verts_moved > 0);
        let after = positions(&surface);
        assert!(after.iter().all(|p| p.z >= 0.0));
        assert!(after[CENTER].z > 0.0);
    }

    #[test]
    fn test_grab_is_relative_to_stroke_start() {
        let (mut tree, mut surface) = mesh_setup();
        tree.store_bounds_orig();
        let settings = BrushSettings::grab();
        let offset = Vec3::new(0.0, 0.0, 0.2);
        let mut dab = dab(&settings);
        dab.location += offset;
        dab.stroke_offset = offset;

        run(&mut tree, &mut surface, &settings, &dab);
        let first = positions(&surface);
        assert!((first[CENTER].z - 0.2).abs() < 1e-5);

        // Same offset again leaves the surface where it is
        run(&mut tree, &mut surface, &settings, &dab);
        let second = positions(&surface);
        for (a, b) in first.iter().zip(&second) {
            assert!(a.abs_diff_eq(*b, 1e-5));
        }
    }

    #[test]
    fn test_mirror_clip_keeps_plane() {
        let (mut tree, mut surface) = mesh_setup();
        let settings = BrushSettings {
            clip_lock: ClipLock {
                lock: [false, false, true],
                ..Default::default()
            },
            ..BrushSettings::draw()
        };
        let dab = dab(&settings);
        let stats = run(&mut tree, &mut surface, &settings, &dab);
        assert_eq!(stats.verts_moved, 0);
    }

    #[test]
    fn test_smooth_grids_relaxes_bump() {
        let mesh = Mesh::quad_grid(2, 2, 2.0);
        let settings = SubdivToCcgSettings {
            level: 2,
            need_normal: true,
            need_mask: false,
        };
        let ccg = SubdivCcg::new(&mesh, settings, &BilinearEvaluator, None).unwrap();
        let mut grids = GridsSurface::new(ccg);
        // Centre sample of the first grid
        let bump = 4;
        let raised = grids.ccg().positions()[bump] + Vec3::new(0.0, 0.0, 0.4);
        grids.ccg_mut().positions_mut()[bump] = raised;
        let mut tree = SpatialTree::from_grids(&grids, &mesh, &config(4));
        let mut surface = Surface::Grids(grids);

        let brush = BrushSettings {
            strength: 1.0,
            radius: 3.0,
            falloff: crate::brush::FalloffCurve::Constant,
            ..BrushSettings::smooth()
        };
        let dab = Dab::new(raised, Vec3::Z, 3.0, 1.0);
        let stats = run(&mut tree, &mut surface, &brush, &dab);
        assert!(stats.verts_moved > 0);
        let after = surface.as_grids().unwrap().ccg().positions()[bump];
        assert!(after.z < 0.4 - 1e-3);
    }

    #[test]
    fn test_backend_mismatch() {
        let (mut tree, _) = mesh_setup();
        let mut surface = Surface::DynTopo(crate::dyntopo::DynMesh::new());
        let settings = BrushSettings::draw();
        let result = apply_brush(&mut tree, &mut surface, &[0], &settings, &dab(&settings), &BrushContext::default());
        assert!(matches!(result, Err(TreeError::BackendMismatch { .. })));
    }
}
