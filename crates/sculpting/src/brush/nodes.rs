//! Node filters used to gather the leaves a dab can touch.

use glam::{Mat4, Vec3};

use crate::spatial::Bounds;
use crate::tree::SpatialNode;

fn node_bounds(node: &SpatialNode, use_original: bool) -> &Bounds {
    if use_original { node.bounds_orig() } else { node.bounds() }
}

/// The node's box comes within `sqrt(radius_sq)` of `location`.
pub fn node_in_sphere(node: &SpatialNode, location: Vec3, radius_sq: f32, use_original: bool) -> bool {
    let bounds = node_bounds(node, use_original);
    !bounds.is_empty() && bounds.closest_point(location).distance_squared(location) <= radius_sq
}

/// The node's box comes within `sqrt(radius_sq)` of the line through
/// `location` along `view_normal`.
pub fn node_in_cylinder(
    node: &SpatialNode,
    location: Vec3,
    view_normal: Vec3,
    radius_sq: f32,
    use_original: bool,
) -> bool {
    let bounds = node_bounds(node, use_original);
    let (forward, _) = bounds.dist_sq_to_ray(location, view_normal);
    let (backward, _) = bounds.dist_sq_to_ray(location, -view_normal);
    forward.min(backward) <= radius_sq
}

/// The node's box may overlap the brush box. `mat` maps world space into
/// the brush box, which is the cube `[-1, 1]³`.
///
/// Separating-axis test on the face axes of both boxes. Boxes that only
/// touch are kept.
pub fn node_in_box(node: &SpatialNode, mat: &Mat4, use_original: bool) -> bool {
    let bounds = node_bounds(node, use_original);
    if bounds.is_empty() {
        return false;
    }
    let center = bounds.center();
    let extent = bounds.max - center;

    // Brush box axes
    let center_local = mat.transform_point3(center);
    let axes_local = [
        mat.transform_vector3(Vec3::X * extent.x).abs(),
        mat.transform_vector3(Vec3::Y * extent.y).abs(),
        mat.transform_vector3(Vec3::Z * extent.z).abs(),
    ];
    let extent_local = axes_local[0] + axes_local[1] + axes_local[2];
    for axis in 0..3 {
        if center_local[axis].abs() > 1.0 + extent_local[axis] {
            return false;
        }
    }

    // World axes
    let inverse = mat.inverse();
    let box_center = inverse.transform_point3(Vec3::ZERO);
    let box_extent = inverse.transform_vector3(Vec3::X).abs()
        + inverse.transform_vector3(Vec3::Y).abs()
        + inverse.transform_vector3(Vec3::Z).abs();
    for axis in 0..3 {
        if (box_center[axis] - center[axis]).abs() > extent[axis] + box_extent[axis] {
            return false;
        }
    }
    true
}
