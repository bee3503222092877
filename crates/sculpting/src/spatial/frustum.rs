//! View-frustum culling of node bounds.

use glam::{Vec3, Vec4, Vec4Swizzles};

use super::Bounds;

/// Result of testing a box against every plane of a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Intersect,
    Inside,
}

/// Side planes of a view frustum as `(normal, d)` with the inside where
/// `normal · p + d >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 4],
}

impl Frustum {
    pub fn new(planes: [Vec4; 4]) -> Self {
        Self { planes }
    }

    /// Box frustum bounded by `min`/`max` on X and Y, open along Z.
    pub fn from_box_xy(min: Vec3, max: Vec3) -> Self {
        Self::new([
            Vec4::new(1.0, 0.0, 0.0, -min.x),
            Vec4::new(-1.0, 0.0, 0.0, max.x),
            Vec4::new(0.0, 1.0, 0.0, -min.y),
            Vec4::new(0.0, -1.0, 0.0, max.y),
        ])
    }

    pub fn test_aabb(&self, bounds: &Bounds) -> FrustumTest {
        let mut result = FrustumTest::Inside;
        for plane in &self.planes {
            let normal = plane.xyz();
            let mut vmin = Vec3::ZERO;
            let mut vmax = Vec3::ZERO;
            for axis in 0..3 {
                if normal[axis] < 0.0 {
                    vmin[axis] = bounds.min[axis];
                    vmax[axis] = bounds.max[axis];
                } else {
                    vmin[axis] = bounds.max[axis];
                    vmax[axis] = bounds.min[axis];
                }
            }
            if normal.dot(vmin) + plane.w < 0.0 {
                return FrustumTest::Outside;
            }
            if normal.dot(vmax) + plane.w <= 0.0 {
                result = FrustumTest::Intersect;
            }
        }
        result
    }

    /// Any part of the box may be inside
    pub fn contains_aabb(&self, bounds: &Bounds) -> bool {
        self.test_aabb(bounds) != FrustumTest::Outside
    }

    /// Any part of the box may be outside
    pub fn excludes_aabb(&self, bounds: &Bounds) -> bool {
        self.test_aabb(bounds) != FrustumTest::Inside
    }

    /// The point lies on the inner side of every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(point) + plane.w >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frustum_classification() {
        let frustum = Frustum::from_box_xy(Vec3::splat(-1.0), Vec3::splat(1.0));

        let inside = Bounds::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let straddling = Bounds::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(2.0, 0.5, 1.0));
        let outside = Bounds::new(Vec3::new(2.0, 2.0, 0.0), Vec3::new(3.0, 3.0, 1.0));

        assert_eq!(frustum.test_aabb(&inside), FrustumTest::Inside);
        assert_eq!(frustum.test_aabb(&straddling), FrustumTest::Intersect);
        assert_eq!(frustum.test_aabb(&outside), FrustumTest::Outside);

        assert!(frustum.contains_aabb(&inside) && !frustum.excludes_aabb(&inside));
        assert!(frustum.contains_aabb(&straddling) && frustum.excludes_aabb(&straddling));
        assert!(!frustum.contains_aabb(&outside) && frustum.excludes_aabb(&outside));
    }

    #[test]
    fn test_contains_point() {
        let frustum = Frustum::from_box_xy(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, 50.0)));
        assert!(!frustum.contains_point(Vec3::new(1.5, 0.0, 0.0)));
    }
}
