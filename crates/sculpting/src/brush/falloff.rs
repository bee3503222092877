//! Brush falloff curves and shapes.

use serde::{Deserialize, Serialize};

/// How brush strength decreases from the centre to the rim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FalloffCurve {
    /// strength = 1 - d
    Linear = 0,
    /// Hermite smoothstep
    #[default]
    Smooth = 1,
    /// Quadratic decay
    Sharp = 2,
    /// Full strength up to the rim
    Constant = 3,
    /// sqrt(1 - d²)
    Sphere = 4,
    /// Sharp centre with a long tail
    Root = 5,
}

impl FalloffCurve {
    /// Strength at a normalized distance (0 = centre, 1 = rim).
    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        let d = normalized_distance.clamp(0.0, 1.0);
        match self {
            FalloffCurve::Linear => 1.0 - d,
            FalloffCurve::Smooth => {
                let t = 1.0 - d;
                t * t * (3.0 - 2.0 * t)
            }
            FalloffCurve::Sharp => {
                let t = 1.0 - d;
                t * t
            }
            FalloffCurve::Constant => 1.0,
            FalloffCurve::Sphere => (1.0 - d * d).max(0.0).sqrt(),
            FalloffCurve::Root => (1.0 - d).sqrt(),
        }
    }
}

/// Volume distances are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FalloffShape {
    /// Euclidean distance to the brush centre
    #[default]
    Sphere,
    /// Distance to the view ray through the brush centre
    ProjectedTube,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [FalloffCurve; 6] = [
        FalloffCurve::Linear,
        FalloffCurve::Smooth,
        FalloffCurve::Sharp,
        FalloffCurve::Constant,
        FalloffCurve::Sphere,
        FalloffCurve::Root,
    ];

    #[test]
    fn test_falloff_endpoints() {
        for curve in CURVES {
            assert!((curve.evaluate(0.0) - 1.0).abs() < 0.001, "{curve:?}");
            let rim = if curve == FalloffCurve::Constant { 1.0 } else { 0.0 };
            assert!((curve.evaluate(1.0) - rim).abs() < 0.001, "{curve:?}");
        }
        // Out of range distances clamp
        assert_eq!(FalloffCurve::Linear.evaluate(2.0), 0.0);
        assert_eq!(FalloffCurve::Linear.evaluate(-1.0), 1.0);
    }

    #[test]
    fn test_falloff_monotonic() {
        for curve in CURVES {
            let mut last = curve.evaluate(0.0);
            for i in 1..=20 {
                let value = curve.evaluate(i as f32 / 20.0);
                assert!(value <= last + 1e-6, "{curve:?} rises at {i}");
                last = value;
            }
        }
    }

    #[test]
    fn test_smooth_flat_at_ends() {
        assert!(FalloffCurve::Smooth.evaluate(0.01) > 0.99);
        assert!(FalloffCurve::Smooth.evaluate(0.99) < 0.01);
    }
}
