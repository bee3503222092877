//! Per-vertex translations and the final clip/lock pass.

use glam::{Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};

use super::factors::plane_point_side;

/// Mirror clipping and axis locks applied to every translation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipLock {
    /// Vertices on a mirror plane stay on it
    pub mirror_clip: [bool; 3],
    /// Distance to a mirror plane that counts as on it
    pub clip_tolerance: Vec3,
    /// Axes translations may not move along
    pub lock: [bool; 3],
}

impl ClipLock {
    pub fn is_noop(&self) -> bool {
        !self.mirror_clip.iter().chain(&self.lock).any(|&flag| flag)
    }
}

pub fn translations_from_offset_and_factors(offset: Vec3, factors: &[f32], translations: &mut Vec<Vec3>) {
    translations.clear();
    translations.extend(factors.iter().map(|&factor| offset * factor));
}

pub fn scale_translations(translations: &mut [Vec3], factors: &[f32]) {
    for (translation, &factor) in translations.iter_mut().zip(factors) {
        *translation *= factor;
    }
}

/// Translations moving each vertex onto `plane`.
pub fn calc_translations_to_plane(positions: &[Vec3], plane: Vec4, translations: &mut Vec<Vec3>) {
    let normal = plane.xyz();
    translations.clear();
    translations.extend(positions.iter().map(|&p| -normal * plane_point_side(plane, p)));
}

/// Drop the component of each translation along `normal`.
pub fn project_translations(translations: &mut [Vec3], normal: Vec3) {
    for translation in translations {
        *translation -= normal * normal.dot(*translation);
    }
}

/// Rebase translations computed from original positions onto the current
/// ones.
pub fn reset_translations_to_original(translations: &mut [Vec3], positions: &[Vec3], orig_positions: &[Vec3]) {
    for ((translation, &position), &orig) in translations.iter_mut().zip(positions).zip(orig_positions) {
        *translation += orig - position;
    }
}

pub fn clip_and_lock_translations(clip: &ClipLock, positions: &[Vec3], translations: &mut [Vec3]) {
    if clip.is_noop() {
        return;
    }
    for axis in 0..3 {
        if clip.lock[axis] {
            for translation in translations.iter_mut() {
                translation[axis] = 0.0;
            }
            continue;
        }
        if !clip.mirror_clip[axis] {
            continue;
        }
        let tolerance = clip.clip_tolerance[axis];
        for (translation, position) in translations.iter_mut().zip(positions) {
            if position[axis].abs() <= tolerance {
                translation[axis] = -position[axis];
            }
        }
    }
}
