//! Brush evaluation over tree leaves.
//!
//! A dab is applied in three steps:
//! 1. [`gather_brush_nodes`] selects the leaves the dab can reach
//! 2. [`apply_brush`] evaluates every leaf in parallel. Factors are seeded
//!    from hide and mask, filtered by clipping, front-face, falloff,
//!    automasking and texture, then turned into per-vertex translations
//! 3. Translations are written back to the surface, each vertex once by
//!    the leaf owning it, and the touched leaves get fresh bounds and normals
//!
//! The building blocks live in [`factors`] and [`translations`]; each brush
//! in [`BrushKind`] combines them differently.

mod automask;
mod brushes;
pub mod factors;
mod falloff;
mod kernel;
mod nodes;
pub mod translations;

use glam::Vec3;
use serde::{Deserialize, Serialize};

pub use automask::{apply_texture_factors, Automasking, HalfSpaceAutomask, TextureSampler};
pub use falloff::{FalloffCurve, FalloffShape};
pub use kernel::{apply_brush, gather_brush_nodes, BrushContext, BrushStats};
pub use nodes::{node_in_box, node_in_cylinder, node_in_sphere};
pub use translations::ClipLock;

/// Brushes built on the shared kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrushKind {
    /// Move along the area normal
    #[default]
    Draw,
    /// Move along each vertex normal
    Inflate,
    /// Pull towards the area plane
    Flatten,
    /// Fill up to a raised plane inside a square tip
    ClayStrips,
    /// Drag stroke-start geometry along with the cursor
    Grab,
    /// Relax towards the neighbour average
    Smooth,
}

impl BrushKind {
    /// Reads stroke-start positions and node bounds.
    pub fn uses_original(&self) -> bool {
        matches!(self, BrushKind::Grab)
    }

    /// Needs the averaged plane under the brush.
    pub fn uses_area_plane(&self) -> bool {
        matches!(self, BrushKind::Draw | BrushKind::Flatten | BrushKind::ClayStrips)
    }
}

/// Brush configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrushSettings {
    pub kind: BrushKind,
    /// Radius in object space
    pub radius: f32,
    /// Negative values invert the brush
    pub strength: f32,
    pub falloff: FalloffCurve,
    pub falloff_shape: FalloffShape,
    /// Fraction of the radius with full strength
    pub hardness: f32,
    /// Corner rounding of square tips
    pub tip_roundness: f32,
    /// Skip vertices further than this fraction of the radius from the plane
    pub plane_trim: Option<f32>,
    /// Ignore vertices facing away from the viewer
    pub front_faces_only: bool,
    pub clip_lock: ClipLock,
    /// Spacing between dabs as a fraction of the radius
    pub spacing: f32,
    pub pressure_affects_radius: bool,
    pub pressure_affects_strength: bool,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            kind: BrushKind::Draw,
            radius: 0.25,
            strength: 0.5,
            falloff: FalloffCurve::Smooth,
            falloff_shape: FalloffShape::Sphere,
            hardness: 0.0,
            tip_roundness: 0.2,
            plane_trim: None,
            front_faces_only: false,
            clip_lock: ClipLock::default(),
            spacing: 0.25,
            pressure_affects_radius: false,
            pressure_affects_strength: true,
        }
    }
}

impl BrushSettings {
    pub fn draw() -> Self {
        Self::default()
    }

    pub fn inflate() -> Self {
        Self {
            kind: BrushKind::Inflate,
            strength: 0.3,
            ..Default::default()
        }
    }

    pub fn flatten() -> Self {
        Self {
            kind: BrushKind::Flatten,
            strength: 0.4,
            ..Default::default()
        }
    }

    pub fn clay_strips() -> Self {
        Self {
            kind: BrushKind::ClayStrips,
            strength: 0.6,
            falloff: FalloffCurve::Sharp,
            spacing: 0.1,
            ..Default::default()
        }
    }

    /// Continuous, no spacing
    pub fn grab() -> Self {
        Self {
            kind: BrushKind::Grab,
            strength: 1.0,
            spacing: 0.0,
            pressure_affects_strength: false,
            ..Default::default()
        }
    }

    pub fn smooth() -> Self {
        Self {
            kind: BrushKind::Smooth,
            strength: 0.5,
            ..Default::default()
        }
    }

    pub fn effective_radius(&self, pressure: f32) -> f32 {
        if self.pressure_affects_radius {
            self.radius * (0.5 + 0.5 * pressure)
        } else {
            self.radius
        }
    }

    pub fn effective_strength(&self, pressure: f32) -> f32 {
        if self.pressure_affects_strength {
            self.strength * pressure
        } else {
            self.strength
        }
    }
}

/// One brush sample along a stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dab {
    /// Brush centre on the surface
    pub location: Vec3,
    /// Unit direction from the surface towards the viewer
    pub view_normal: Vec3,
    pub radius: f32,
    pub strength: f32,
    /// Cursor movement since the previous dab
    pub grab_delta: Vec3,
    /// Cursor movement since the stroke started
    pub stroke_offset: Vec3,
}

impl Dab {
    pub fn new(location: Vec3, view_normal: Vec3, radius: f32, strength: f32) -> Self {
        Self {
            location,
            view_normal,
            radius,
            strength,
            grab_delta: Vec3::ZERO,
            stroke_offset: Vec3::ZERO,
        }
    }

    /// Where the stroke started; grab measures falloff from here.
    pub fn stroke_start(&self) -> Vec3 {
        self.location - self.stroke_offset
    }
}
