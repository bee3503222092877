//! Axis-aligned bounds used by tree nodes and brush tests.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
///
/// [`Bounds::empty`] is inverted (min > max) so it acts as the identity for
/// [`Bounds::union`]; every query treats it as containing nothing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Degenerate box at the origin, used for leaves with no geometry.
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.include_point(point);
        }
        bounds
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    #[inline]
    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Axis of greatest extent; ties resolve towards the later axis.
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x > size.y {
            if size.x > size.z { 0 } else { 2 }
        } else if size.y > size.z {
            1
        } else {
            2
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// `other` lies entirely inside `self` (boundaries included).
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (self.min.cmple(other.min).all() && self.max.cmpge(other.max).all())
    }

    /// Point of the box closest to `point`.
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.max(self.min).min(self.max)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        if self.is_empty() {
            return false;
        }
        self.closest_point(center).distance_squared(center) <= radius * radius
    }

    /// Slab test against the infinite line through `origin`; returns the
    /// entry and exit parameters when the ray (`t >= 0`) reaches the box.
    pub fn ray_intersect(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }
        let inv = direction.recip();
        let mut t_near = f32::MIN;
        let mut t_far = f32::MAX;
        for axis in 0..3 {
            if direction[axis] == 0.0 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin[axis]) * inv[axis];
            let t1 = (self.max[axis] - origin[axis]) * inv[axis];
            let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
            t_near = t_near.max(lo);
            t_far = t_far.min(hi);
            if t_near > t_far {
                return None;
            }
        }
        (t_far >= 0.0).then_some((t_near, t_far))
    }

    /// Squared distance between the ray `origin + t * direction` (`t >= 0`)
    /// and the box, together with the ray parameter where it is reached.
    ///
    /// The distance is a convex piecewise quadratic in `t` whose pieces
    /// change where the ray crosses a slab plane, so the minimum is found
    /// exactly by minimizing each piece.
    pub fn dist_sq_to_ray(&self, origin: Vec3, direction: Vec3) -> (f32, f32) {
        if self.is_empty() {
            return (f32::MAX, 0.0);
        }
        let mut breaks: smallvec::SmallVec<[f32; 8]> = smallvec::smallvec![0.0];
        for axis in 0..3 {
            if direction[axis] != 0.0 {
                for bound in [self.min[axis], self.max[axis]] {
                    let t = (bound - origin[axis]) / direction[axis];
                    if t > 0.0 {
                        breaks.push(t);
                    }
                }
            }
        }
        breaks.sort_by(f32::total_cmp);

        let mut best = (self.point_dist_sq(origin), 0.0);
        for (i, &start) in breaks.iter().enumerate() {
            let end = breaks.get(i + 1).copied();
            let sample_t = match end {
                Some(end) => (start + end) * 0.5,
                None => start + 1.0,
            };
            // Quadratic a*t^2 + b*t + c of the axes outside the box on this piece.
            let (mut a, mut b) = (0.0_f32, 0.0_f32);
            let p = origin + direction * sample_t;
            for axis in 0..3 {
                let bound = if p[axis] < self.min[axis] {
                    self.min[axis]
                } else if p[axis] > self.max[axis] {
                    self.max[axis]
                } else {
                    continue;
                };
                let e = origin[axis] - bound;
                a += direction[axis] * direction[axis];
                b += 2.0 * e * direction[axis];
            }
            let mut t = if a > 0.0 { -b / (2.0 * a) } else { start };
            t = t.max(start);
            if let Some(end) = end {
                t = t.min(end);
            }
            let dist_sq = self.point_dist_sq(origin + direction * t);
            if dist_sq < best.0 {
                best = (dist_sq, t);
            }
        }
        best
    }

    fn point_dist_sq(&self, point: Vec3) -> f32 {
        self.closest_point(point).distance_squared(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Bounds {
        Bounds::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_empty_is_union_identity() {
        let b = unit();
        assert!(Bounds::empty().is_empty());
        assert_eq!(Bounds::empty().union(&b), b);
        assert!(!Bounds::empty().intersects_sphere(Vec3::ZERO, 100.0));
    }

    #[test]
    fn test_longest_axis() {
        let b = Bounds::new(Vec3::ZERO, Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(b.longest_axis(), 1);
        assert_eq!(Bounds::ZERO.longest_axis(), 2);
    }

    #[test]
    fn test_ray_intersect() {
        let b = unit();
        let (t0, t1) = b
            .ray_intersect(Vec3::new(0.5, 0.5, -2.0), Vec3::Z)
            .unwrap();
        assert!((t0 - 2.0).abs() < 1e-6);
        assert!((t1 - 3.0).abs() < 1e-6);
        assert!(b.ray_intersect(Vec3::new(0.5, 0.5, 2.0), Vec3::Z).is_none());
        assert!(b.ray_intersect(Vec3::new(2.0, 0.5, -2.0), Vec3::Z).is_none());
        // Origin inside: entry behind the origin, exit ahead.
        let (t0, _) = b.ray_intersect(Vec3::splat(0.5), Vec3::X).unwrap();
        assert!(t0 < 0.0);
    }

    #[test]
    fn test_dist_sq_to_ray() {
        let b = unit();
        // Passes 1 unit above the top face.
        let (d, t) = b.dist_sq_to_ray(Vec3::new(-5.0, 0.5, 2.0), Vec3::X);
        assert!((d - 1.0).abs() < 1e-5);
        assert!((5.0..=6.0).contains(&t));
        // Hits the box.
        let (d, _) = b.dist_sq_to_ray(Vec3::new(0.5, 0.5, -3.0), Vec3::Z);
        assert_eq!(d, 0.0);
        // Points away: nearest at the origin.
        let (d, t) = b.dist_sq_to_ray(Vec3::new(0.5, 0.5, 3.0), Vec3::Z);
        assert!((d - 4.0).abs() < 1e-5);
        assert_eq!(t, 0.0);
        // Diagonal miss past the corner (1,1,z).
        let (d, _) = b.dist_sq_to_ray(Vec3::new(3.0, 0.0, 0.5), Vec3::new(-1.0, 1.0, 0.0));
        let expected = 0.5_f32; // distance from (1,1) to the line x + y = 3 is 1/sqrt(2)
        assert!((d - expected).abs() < 1e-4, "{d}");
    }

    #[test]
    fn test_contains() {
        let outer = Bounds::new(Vec3::splat(-1.0), Vec3::splat(2.0));
        assert!(outer.contains(&unit()));
        assert!(!unit().contains(&outer));
        assert!(unit().contains(&Bounds::empty()));
    }
}
