//! Extra factor contributors plugged into the brush kernel.
//!
//! Both traits are called from the parallel node pass and must be `Sync`.

use glam::Vec3;

/// Scales brush factors per vertex, for example to keep a stroke on one
/// face set or away from open boundaries.
pub trait Automasking: Sync {
    /// Multiply `factors` in place. `verts` holds the backend element
    /// indices of the node's vertices (mesh vertex, grid element or
    /// dynamic vertex id), `positions` their current positions.
    fn calc_factors(&self, node: usize, verts: &[usize], positions: &[Vec3], factors: &mut [f32]);
}

/// Brush texture lookup.
pub trait TextureSampler: Sync {
    /// Texture strength at `position` in brush space, where the brush
    /// centre is the origin and its radius is 1.
    fn sample(&self, position: Vec3) -> f32;
}

/// Multiply in the texture strength of each vertex.
pub fn apply_texture_factors(
    sampler: &dyn TextureSampler,
    location: Vec3,
    radius: f32,
    positions: &[Vec3],
    factors: &mut [f32],
) {
    let inv_radius = if radius > 0.0 { radius.recip() } else { 0.0 };
    for (factor, &position) in factors.iter_mut().zip(positions) {
        if *factor == 0.0 {
            continue;
        }
        *factor *= sampler.sample((position - location) * inv_radius);
    }
}

/// Fades the brush out along a world axis; vertices on the negative side of
/// `origin` along `axis` are left alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfSpaceAutomask {
    pub origin: Vec3,
    pub axis: Vec3,
    /// Distance over which the factor ramps from 0 to 1
    pub blend: f32,
}

impl Automasking for HalfSpaceAutomask {
    fn calc_factors(&self, _node: usize, _verts: &[usize], positions: &[Vec3], factors: &mut [f32]) {
        for (factor, &position) in factors.iter_mut().zip(positions) {
            let side = self.axis.dot(position - self.origin);
            let weight = if self.blend > 0.0 {
                (side / self.blend).clamp(0.0, 1.0)
            } else if side >= 0.0 {
                1.0
            } else {
                0.0
            };
            *factor *= weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stripes;

    impl TextureSampler for Stripes {
        fn sample(&self, position: Vec3) -> f32 {
            if position.x > 0.0 { 1.0 } else { 0.5 }
        }
    }

    #[test]
    fn test_texture_factors_in_brush_space() {
        let positions = [Vec3::new(3.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO];
        let mut factors = vec![1.0, 1.0, 0.0];
        apply_texture_factors(&Stripes, Vec3::new(2.0, 0.0, 0.0), 2.0, &positions, &mut factors);
        assert_eq!(factors, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_half_space_automask() {
        let mask = HalfSpaceAutomask {
            origin: Vec3::ZERO,
            axis: Vec3::X,
            blend: 1.0,
        };
        let positions = [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)];
        let mut factors = vec![1.0; 3];
        mask.calc_factors(0, &[0, 1, 2], &positions, &mut factors);
        assert_eq!(factors, vec![0.0, 0.5, 1.0]);

        let hard = HalfSpaceAutomask { blend: 0.0, ..mask };
        let mut factors = vec![1.0; 3];
        hard.calc_factors(0, &[0, 1, 2], &positions, &mut factors);
        assert_eq!(factors, vec![0.0, 1.0, 1.0]);
    }
}
