//! Ray/triangle primitives for node-level ray casting.

use glam::Vec3;

/// Ray parameter of the hit with triangle `(v0, v1, v2)`, two-sided.
pub fn ray_triangle(origin: Vec3, direction: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

/// Update `depth` with a nearer triangle hit; true if it improved.
pub fn ray_face_intersection_tri(
    origin: Vec3,
    direction: Vec3,
    tri: [Vec3; 3],
    depth: &mut f32,
) -> bool {
    match ray_triangle(origin, direction, tri[0], tri[1], tri[2]) {
        Some(t) if t < *depth => {
            *depth = t;
            true
        }
        _ => false,
    }
}

/// Closest point of triangle `tri` to `point`.
pub fn closest_on_tri_to_point(point: Vec3, tri: [Vec3; 3]) -> Vec3 {
    let [a, b, c] = tri;
    let ab = b - a;
    let ac = c - a;
    let ap = point - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }
    let bp = point - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }
    let cp = point - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }
    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Squared distance between the ray and segment `(a, b)` with the ray
/// parameter of the closest approach.
fn ray_segment_dist_sq(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3) -> (f32, f32) {
    let d1 = direction;
    let d2 = b - a;
    let r = origin - a;
    let aa = d1.dot(d1);
    let ee = d2.dot(d2);
    let f = d2.dot(r);
    let (s, t) = if ee <= f32::EPSILON {
        ((-d1.dot(r) / aa).max(0.0), 0.0)
    } else {
        let c = d1.dot(r);
        let bb = d1.dot(d2);
        let denom = aa * ee - bb * bb;
        let mut s = if denom > f32::EPSILON {
            ((bb * f - c * ee) / denom).max(0.0)
        } else {
            0.0
        };
        let mut t = (bb * s + f) / ee;
        if t < 0.0 {
            t = 0.0;
            s = (-c / aa).max(0.0);
        } else if t > 1.0 {
            t = 1.0;
            s = ((bb - c) / aa).max(0.0);
        }
        (s, t)
    };
    let p = origin + d1 * s;
    let q = a + d2 * t;
    (p.distance_squared(q), s)
}

/// Track the triangle nearest to the ray. A hit counts as distance zero.
/// Returns true when `dist_sq` (and `depth`) improved.
pub fn ray_face_nearest_tri(
    origin: Vec3,
    direction: Vec3,
    tri: [Vec3; 3],
    depth: &mut f32,
    dist_sq: &mut f32,
) -> bool {
    let candidate = if let Some(t) = ray_triangle(origin, direction, tri[0], tri[1], tri[2]) {
        (0.0, t)
    } else {
        let origin_closest = closest_on_tri_to_point(origin, tri);
        let mut best = (origin_closest.distance_squared(origin), 0.0);
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let edge = ray_segment_dist_sq(origin, direction, a, b);
            if edge.0 < best.0 {
                best = edge;
            }
        }
        best
    };
    if candidate.0 < *dist_sq || (candidate.0 == *dist_sq && candidate.1 < *depth) {
        *dist_sq = candidate.0;
        *depth = candidate.1;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRI: [Vec3; 3] = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let t = ray_triangle(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z, TRI[0], TRI[1], TRI[2]);
        assert!((t.unwrap() - 1.0).abs() < 1e-6);
        assert!(ray_triangle(Vec3::new(0.8, 0.8, 1.0), -Vec3::Z, TRI[0], TRI[1], TRI[2]).is_none());
        assert!(ray_triangle(Vec3::new(0.2, 0.2, 1.0), Vec3::Z, TRI[0], TRI[1], TRI[2]).is_none());
    }

    #[test]
    fn test_depth_only_shrinks() {
        let mut depth = 0.5;
        assert!(!ray_face_intersection_tri(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z, TRI, &mut depth));
        assert_eq!(depth, 0.5);
        let mut depth = f32::MAX;
        assert!(ray_face_intersection_tri(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z, TRI, &mut depth));
        assert!((depth - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_tri() {
        let mut depth = f32::MAX;
        let mut dist_sq = f32::MAX;
        // Passes 0.5 beside the edge along x = 0.
        assert!(ray_face_nearest_tri(
            Vec3::new(-0.5, 0.25, 1.0),
            -Vec3::Z,
            TRI,
            &mut depth,
            &mut dist_sq
        ));
        assert!((dist_sq - 0.25).abs() < 1e-5);
        assert!((depth - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_closest_on_tri() {
        assert_eq!(closest_on_tri_to_point(Vec3::new(-1.0, -1.0, 0.0), TRI), TRI[0]);
        let p = closest_on_tri_to_point(Vec3::new(0.2, 0.2, 3.0), TRI);
        assert!(p.distance(Vec3::new(0.2, 0.2, 0.0)) < 1e-6);
    }
}
