//! Per-vertex influence factors.
//!
//! Every helper works on parallel slices indexed by the node-local vertex:
//! factors start at `1 - mask` (0 for hidden vertices) and each filter
//! scales them down. Distances are filled once and shared by the filters.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use super::falloff::{FalloffCurve, FalloffShape};
use crate::spatial::Frustum;

/// Signed distance of `point` to `plane` (`normal`, `d`).
#[inline]
pub fn plane_point_side(plane: Vec4, point: Vec3) -> f32 {
    plane.xyz().dot(point) + plane.w
}

/// Plane through `point` with the given normal.
#[inline]
pub fn plane_from_point_normal(point: Vec3, normal: Vec3) -> Vec4 {
    normal.extend(-normal.dot(point))
}

/// Seed factors: hidden vertices get 0, others `1 - mask`.
pub fn fill_factor_from_hide_and_mask(hide: Option<&[bool]>, mask: Option<&[f32]>, factors: &mut [f32]) {
    factors.fill(1.0);
    if let Some(mask) = mask {
        for (factor, mask) in factors.iter_mut().zip(mask) {
            *factor -= mask.clamp(0.0, 1.0);
        }
    }
    if let Some(hide) = hide {
        for (factor, &hidden) in factors.iter_mut().zip(hide) {
            if hidden {
                *factor = 0.0;
            }
        }
    }
}

/// Fade out vertices facing away from the viewer.
pub fn calc_front_face(view_normal: Vec3, normals: &[Vec3], factors: &mut [f32]) {
    for (factor, normal) in factors.iter_mut().zip(normals) {
        *factor *= view_normal.dot(*normal).max(0.0);
    }
}

/// Zero vertices outside the view clipping region.
pub fn filter_region_clip_factors(clip: Option<&Frustum>, positions: &[Vec3], factors: &mut [f32]) {
    let Some(clip) = clip else {
        return;
    };
    for (factor, &position) in factors.iter_mut().zip(positions) {
        if !clip.contains_point(position) {
            *factor = 0.0;
        }
    }
}

/// Distances to the brush centre, or to the view ray through it for
/// [`FalloffShape::ProjectedTube`].
pub fn calc_brush_distances(
    shape: FalloffShape,
    location: Vec3,
    view_normal: Vec3,
    positions: &[Vec3],
    distances: &mut Vec<f32>,
) {
    distances.clear();
    match shape {
        FalloffShape::Sphere => {
            distances.extend(positions.iter().map(|p| p.distance(location)));
        }
        FalloffShape::ProjectedTube => {
            distances.extend(positions.iter().map(|p| {
                let offset = *p - location;
                (offset - view_normal * view_normal.dot(offset)).length()
            }));
        }
    }
}

/// Zero vertices at or beyond the brush radius.
pub fn filter_distances_with_radius(radius: f32, distances: &[f32], factors: &mut [f32]) {
    for (factor, &distance) in factors.iter_mut().zip(distances) {
        if distance >= radius {
            *factor = 0.0;
        }
    }
}

/// Remap distances so everything inside `hardness * radius` counts as the
/// centre.
pub fn apply_hardness_to_distances(radius: f32, hardness: f32, distances: &mut [f32]) {
    if hardness <= 0.0 {
        return;
    }
    let threshold = hardness * radius;
    if hardness >= 1.0 {
        for distance in distances {
            *distance = if *distance < threshold { 0.0 } else { radius };
        }
        return;
    }
    for distance in distances {
        *distance = if *distance < threshold {
            0.0
        } else {
            (*distance - threshold) / (radius - threshold) * radius
        };
    }
}

/// Multiply in the falloff curve.
pub fn calc_brush_strength_factors(curve: FalloffCurve, radius: f32, distances: &[f32], factors: &mut [f32]) {
    for (factor, &distance) in factors.iter_mut().zip(distances) {
        if *factor == 0.0 {
            continue;
        }
        *factor *= curve.evaluate(distance / radius);
    }
}

/// Distances inside a square brush tip. `mat` maps world space into the
/// tip, whose footprint is the unit square on X/Y. Vertices outside get
/// `f32::MAX`. `roundness` rounds the corners off.
pub fn calc_brush_cube_distances(mat: &Mat4, roundness: f32, positions: &[Vec3], distances: &mut Vec<f32>) {
    let hardness = 1.0 - roundness.clamp(0.0, 1.0);
    distances.clear();
    distances.extend(positions.iter().map(|&p| {
        let local = mat.transform_point3(p).abs();
        if local.x >= 1.0 || local.y >= 1.0 {
            return f32::MAX;
        }
        if local.x <= hardness || local.y <= hardness {
            return local.x.max(local.y);
        }
        let corner = (local.x - hardness).hypot(local.y - hardness);
        hardness + corner
    }));
}

/// Zero vertices whose translation to the plane exceeds the trim limit.
pub fn filter_plane_trim_limit_factors(trim_limit: f32, translations: &[Vec3], factors: &mut [f32]) {
    let limit_sq = trim_limit * trim_limit;
    for (factor, translation) in factors.iter_mut().zip(translations) {
        if translation.length_squared() > limit_sq {
            *factor = 0.0;
        }
    }
}

/// Zero vertices below `plane`.
pub fn filter_below_plane_factors(plane: Vec4, positions: &[Vec3], factors: &mut [f32]) {
    for (factor, &position) in factors.iter_mut().zip(positions) {
        if plane_point_side(plane, position) < 0.0 {
            *factor = 0.0;
        }
    }
}

/// Zero vertices above `plane`.
pub fn filter_above_plane_factors(plane: Vec4, positions: &[Vec3], factors: &mut [f32]) {
    for (factor, &position) in factors.iter_mut().zip(positions) {
        if plane_point_side(plane, position) > 0.0 {
            *factor = 0.0;
        }
    }
}

pub fn scale_factors(factors: &mut [f32], strength: f32) {
    if strength == 1.0 {
        return;
    }
    for factor in factors {
        *factor *= strength;
    }
}
