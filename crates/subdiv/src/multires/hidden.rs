//! Hidden-bitmap resampling between displacement levels.
//!
//! Bitmaps are row-major `grid_size(level)^2` bits. Upsampling fans each
//! low-res bit out over the high-res cells it covers; downsampling point
//! samples at the level stride, so fine hidden detail is dropped.

use tracing::trace;

use super::grid_size;
use crate::bits::BitVector;

/// Grow a hidden bitmap from `lo_level` to `hi_level`.
///
/// With `prev_hidden` (the bitmap that existed at `hi_level` before the low
/// level was edited), only cells whose low-res state actually changed are
/// overwritten, so high-res hiding without a low-res counterpart survives.
pub fn upsample_hidden(
    lo_hidden: &BitVector,
    lo_level: u32,
    hi_level: u32,
    prev_hidden: Option<&BitVector>,
) -> BitVector {
    debug_assert!(lo_level <= hi_level);
    let lo_size = grid_size(lo_level);
    let hi_size = grid_size(hi_level);
    debug_assert_eq!(lo_hidden.len(), lo_size * lo_size);

    if lo_level == hi_level {
        return lo_hidden.clone();
    }

    let factor = 1usize << (hi_level - lo_level);
    let offset = factor / 2;

    let mut hi_hidden = match prev_hidden {
        Some(prev) => {
            debug_assert_eq!(prev.len(), hi_size * hi_size);
            prev.clone()
        }
        None => BitVector::new(hi_size * hi_size, false),
    };

    // Cells halfway between two low-res centres are covered twice; clears run
    // before sets so a hidden neighbour wins the shared cells.
    let mut changed = 0usize;
    for pass_value in [false, true] {
        for yl in 0..lo_size {
            for xl in 0..lo_size {
                let lo_val = lo_hidden.get(yl * lo_size + xl);
                if lo_val != pass_value {
                    continue;
                }
                let xc = xl * factor;
                let yc = yl * factor;

                match prev_hidden {
                    Some(prev) if prev.get(yc * hi_size + xc) == lo_val => continue,
                    None if !lo_val => continue,
                    _ => {}
                }

                let y_range = yc.saturating_sub(offset)..=(yc + offset).min(hi_size - 1);
                let x_range = xc.saturating_sub(offset)..=(xc + offset).min(hi_size - 1);
                for yh in y_range {
                    for xh in x_range.clone() {
                        hi_hidden.set(yh * hi_size + xh, lo_val);
                    }
                }
                changed += 1;
            }
        }
    }

    trace!(
        "upsample_hidden: level {} -> {}, {} low-res cells written",
        lo_level, hi_level, changed
    );
    hi_hidden
}

/// Shrink a hidden bitmap from `hi_level` to `lo_level` by point sampling.
pub fn downsample_hidden(hi_hidden: &BitVector, lo_level: u32, hi_level: u32) -> BitVector {
    debug_assert!(lo_level <= hi_level);
    let lo_size = grid_size(lo_level);
    let hi_size = grid_size(hi_level);
    debug_assert_eq!(hi_hidden.len(), hi_size * hi_size);

    let factor = 1usize << (hi_level - lo_level);
    let mut lo_hidden = BitVector::new(lo_size * lo_size, false);
    for yl in 0..lo_size {
        for xl in 0..lo_size {
            let value = hi_hidden.get(yl * factor * hi_size + xl * factor);
            lo_hidden.set(yl * lo_size + xl, value);
        }
    }
    lo_hidden
}

/// Resample a bitmap in either direction.
pub fn resample_hidden(hidden: &BitVector, from_level: u32, to_level: u32) -> BitVector {
    if to_level >= from_level {
        upsample_hidden(hidden, from_level, to_level, None)
    } else {
        downsample_hidden(hidden, to_level, from_level)
    }
}
