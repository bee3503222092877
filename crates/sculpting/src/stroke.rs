//! Stroke orchestration.
//!
//! [`StrokeEngine`] turns pointer samples into evenly spaced dabs and runs
//! each dab through node gathering and the brush kernel. On dynamic-topology
//! surfaces every dab is followed by a local topology update around it.

use glam::Vec3;
use tracing::{debug, trace};

use crate::brush::{apply_brush, gather_brush_nodes, BrushContext, BrushSettings, Dab, FalloffShape};
use crate::error::TreeError;
use crate::surface::Surface;
use crate::tessellation::{update_topology, TopologyMode, TopologyRegion};
use crate::tree::SpatialTree;

/// Pointer sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeInput {
    /// Hit position on the surface
    pub position: Vec3,
    /// Unit direction towards the viewer
    pub view_normal: Vec3,
    /// Pen pressure, 0 to 1
    pub pressure: f32,
}

/// Totals of one update or a whole stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrokeStats {
    pub dabs: usize,
    pub verts_moved: usize,
    pub edges_split: usize,
    pub edges_collapsed: usize,
}

impl StrokeStats {
    fn add(&mut self, other: &StrokeStats) {
        self.dabs += other.dabs;
        self.verts_moved += other.verts_moved;
        self.edges_split += other.edges_split;
        self.edges_collapsed += other.edges_collapsed;
    }
}

#[derive(Debug, Clone)]
struct StrokeState {
    start: Vec3,
    /// Where the last dab landed
    last_dab_position: Vec3,
    /// Previous pointer sample
    last_input: Vec3,
    /// Path length since the last dab
    distance_since_dab: f32,
    totals: StrokeStats,
}

/// Drives dabs of one brush over a surface.
#[derive(Debug)]
pub struct StrokeEngine {
    pub settings: BrushSettings,
    /// Refine and coarsen dynamic-topology surfaces under the brush
    pub topology_mode: TopologyMode,
    active: Option<StrokeState>,
}

impl StrokeEngine {
    pub fn new(settings: BrushSettings) -> Self {
        Self {
            settings,
            topology_mode: TopologyMode::SUBDIVIDE | TopologyMode::COLLAPSE,
            active: None,
        }
    }

    pub fn is_stroking(&self) -> bool {
        self.active.is_some()
    }

    /// Snapshot original positions and bounds and start a stroke at `input`.
    /// No dab is applied yet.
    pub fn begin_stroke(
        &mut self,
        tree: &mut SpatialTree,
        surface: &mut Surface,
        input: StrokeInput,
    ) -> Result<(), TreeError> {
        tree.check_surface(surface)?;
        surface.store_original();
        tree.store_bounds_orig();
        if let Surface::DynTopo(mesh) = surface {
            tree.store_orig_snapshots(mesh);
        }
        self.active = Some(StrokeState {
            start: input.position,
            last_dab_position: input.position,
            last_input: input.position,
            distance_since_dab: 0.0,
            totals: StrokeStats::default(),
        });
        debug!("Stroke started with {:?}", self.settings.kind);
        Ok(())
    }

    /// Emit the dabs the path to `input` covers and apply them.
    pub fn update_stroke(
        &mut self,
        tree: &mut SpatialTree,
        surface: &mut Surface,
        input: StrokeInput,
        ctx: &BrushContext<'_>,
    ) -> Result<StrokeStats, TreeError> {
        let Some(mut stroke) = self.active.take() else {
            return Ok(StrokeStats::default());
        };
        let result = self.apply_path(tree, surface, &mut stroke, input, ctx);
        if let Ok(stats) = &result {
            stroke.totals.add(stats);
        }
        self.active = Some(stroke);
        result
    }

    fn apply_path(
        &self,
        tree: &mut SpatialTree,
        surface: &mut Surface,
        stroke: &mut StrokeState,
        input: StrokeInput,
        ctx: &BrushContext<'_>,
    ) -> Result<StrokeStats, TreeError> {
        let mut stats = StrokeStats::default();
        let spacing_distance = self.settings.effective_radius(input.pressure) * self.settings.spacing;

        // No spacing: one dab per sample
        if spacing_distance <= 0.0 {
            let dab = self.make_dab(stroke, input.position, input);
            stats.add(&self.apply_dab(tree, surface, &dab, ctx)?);
            stroke.last_dab_position = input.position;
            stroke.last_input = input.position;
            return Ok(stats);
        }

        let segment = input.position - stroke.last_input;
        let direction = segment.normalize_or_zero();
        // Offset along the segment of the next dab
        let mut along = spacing_distance - stroke.distance_since_dab;
        let mut remaining = stroke.distance_since_dab + segment.length();
        while remaining >= spacing_distance {
            let position = stroke.last_input + direction * along;
            let dab = self.make_dab(stroke, position, input);
            stats.add(&self.apply_dab(tree, surface, &dab, ctx)?);
            stroke.last_dab_position = position;
            along += spacing_distance;
            remaining -= spacing_distance;
        }
        stroke.distance_since_dab = remaining;
        stroke.last_input = input.position;
        Ok(stats)
    }

    fn make_dab(&self, stroke: &StrokeState, position: Vec3, input: StrokeInput) -> Dab {
        let mut dab = Dab::new(
            position,
            input.view_normal,
            self.settings.effective_radius(input.pressure),
            self.settings.effective_strength(input.pressure),
        );
        dab.grab_delta = position - stroke.last_dab_position;
        dab.stroke_offset = position - stroke.start;
        dab
    }

    fn apply_dab(
        &self,
        tree: &mut SpatialTree,
        surface: &mut Surface,
        dab: &Dab,
        ctx: &BrushContext<'_>,
    ) -> Result<StrokeStats, TreeError> {
        let nodes = gather_brush_nodes(tree, &self.settings, dab);
        let brush = apply_brush(tree, surface, &nodes, &self.settings, dab, ctx)?;
        let mut stats = StrokeStats {
            dabs: 1,
            verts_moved: brush.verts_moved,
            ..Default::default()
        };

        if let Surface::DynTopo(mesh) = surface {
            if self.topology_mode.is_empty() || nodes.is_empty() {
                return Ok(stats);
            }
            tree.mark_topology_update(&nodes);
            let region = TopologyRegion {
                center: dab.location,
                radius: dab.radius,
                view_normal: (self.settings.falloff_shape == FalloffShape::ProjectedTube)
                    .then_some(dab.view_normal),
            };
            let topology = update_topology(tree, mesh, self.topology_mode, &region);
            stats.edges_split = topology.edges_split;
            stats.edges_collapsed = topology.edges_collapsed;
            if topology.modified() {
                tree.update_bounds(surface)?;
                tree.flush_bounds_to_parents();
                tree.update_normals(surface)?;
            }
        }
        trace!("Dab at {:?}: {:?}", dab.location, stats);
        Ok(stats)
    }

    /// Finish the stroke. Dynamic-topology leaves that grew past the leaf
    /// limit are split here. Returns the stroke totals.
    pub fn end_stroke(&mut self, tree: &mut SpatialTree, surface: &mut Surface) -> Option<StrokeStats> {
        let stroke = self.active.take()?;
        if let Surface::DynTopo(mesh) = surface {
            tree.after_stroke(mesh);
        }
        debug!("Stroke finished: {:?}", stroke.totals);
        Some(stroke.totals)
    }

    /// Drop the active stroke. Changes already applied stay.
    pub fn cancel_stroke(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyntopo::DynMesh;
    use crate::surface::MeshSurface;
    use chisel_config::SculptConfig;
    use subdiv::Mesh;

    fn input(x: f32) -> StrokeInput {
        StrokeInput {
            position: Vec3::new(x, 0.0, 0.0),
            view_normal: Vec3::Z,
            pressure: 1.0,
        }
    }

    fn mesh_setup() -> (SpatialTree, Surface) {
        let surface = MeshSurface::new(Mesh::quad_grid(16, 16, 4.0));
        let config = SculptConfig {
            leaf_limit: 8,
            ..Default::default()
        };
        let tree = SpatialTree::from_mesh(&surface, &config);
        (tree, Surface::Mesh(surface))
    }

    #[test]
    fn test_stroke_lifecycle() {
        let (mut tree, mut surface) = mesh_setup();
        let mut engine = StrokeEngine::new(BrushSettings::draw());
        assert!(!engine.is_stroking());
        engine.begin_stroke(&mut tree, &mut surface, input(-1.0)).unwrap();
        assert!(engine.is_stroking());

        // Spacing is radius * spacing = 0.0625
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(-0.5), &BrushContext::default())
            .unwrap();
        assert_eq!(stats.dabs, 8);
        assert!(stats.verts_moved > 0);

        // Below the spacing, nothing happens
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(-0.47), &BrushContext::default())
            .unwrap();
        assert_eq!(stats.dabs, 0);
        // Path length carries over between samples
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(-0.43), &BrushContext::default())
            .unwrap();
        assert_eq!(stats.dabs, 1);

        let totals = engine.end_stroke(&mut tree, &mut surface).unwrap();
        assert_eq!(totals.dabs, 9);
        assert!(!engine.is_stroking());
        assert!(engine.end_stroke(&mut tree, &mut surface).is_none());
    }

    #[test]
    fn test_update_without_stroke_is_noop() {
        let (mut tree, mut surface) = mesh_setup();
        let mut engine = StrokeEngine::new(BrushSettings::draw());
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(0.0), &BrushContext::default())
            .unwrap();
        assert_eq!(stats, StrokeStats::default());
    }

    #[test]
    fn test_grab_dabs_every_sample() {
        let (mut tree, mut surface) = mesh_setup();
        let mut engine = StrokeEngine::new(BrushSettings::grab());
        engine.begin_stroke(&mut tree, &mut surface, input(0.0)).unwrap();
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(0.01), &BrushContext::default())
            .unwrap();
        assert_eq!(stats.dabs, 1);
        assert!(stats.verts_moved > 0);
    }

    #[test]
    fn test_mismatched_surface_rejected() {
        let (mut tree, _) = mesh_setup();
        let mut surface = Surface::DynTopo(DynMesh::new());
        let mut engine = StrokeEngine::new(BrushSettings::draw());
        assert!(engine.begin_stroke(&mut tree, &mut surface, input(0.0)).is_err());
        assert!(!engine.is_stroking());
    }

    #[test]
    fn test_dyntopo_stroke_refines() {
        let mut mesh = DynMesh::from_mesh(&Mesh::quad_grid(4, 4, 2.0));
        let config = SculptConfig {
            dyntopo_leaf_limit: 16,
            dyntopo_detail_size: 0.2,
            ..Default::default()
        };
        let mut tree = SpatialTree::from_dyntopo(&mut mesh, &config);
        let faces_before = mesh.face_ids().count();
        let mut surface = Surface::DynTopo(mesh);

        let settings = BrushSettings {
            radius: 0.5,
            ..BrushSettings::draw()
        };
        let mut engine = StrokeEngine::new(settings);
        engine.begin_stroke(&mut tree, &mut surface, input(-0.2)).unwrap();
        let stats = engine
            .update_stroke(&mut tree, &mut surface, input(0.2), &BrushContext::default())
            .unwrap();
        assert!(stats.dabs > 0);
        assert!(stats.edges_split > 0);
        engine.end_stroke(&mut tree, &mut surface).unwrap();

        let Surface::DynTopo(mesh) = &surface else {
            unreachable!()
        };
        assert!(mesh.face_ids().count() > faces_before);
        assert!(tree.check_dyntopo_ownership(mesh));
    }
}
