//! Compact bit vector used for hidden bitmaps and per-node dirty tracking.

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;

/// Fixed-length bit vector backed by `u64` words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    words: Vec<u64>,
    len: usize,
}

impl BitVector {
    /// Create a bit vector of `len` bits, all set to `value`.
    pub fn new(len: usize, value: bool) -> Self {
        let fill = if value { u64::MAX } else { 0 };
        let mut bits = Self {
            words: vec![fill; len.div_ceil(WORD_BITS)],
            len,
        };
        bits.clear_tail();
        bits
    }

    pub fn from_bools(values: &[bool]) -> Self {
        let mut bits = Self::new(values.len(), false);
        for (i, &value) in values.iter().enumerate() {
            bits.set(i, value);
        }
        bits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit {index} out of range {}", self.len);
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "bit {index} out of range {}", self.len);
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Set every bit to `value`.
    pub fn fill(&mut self, value: bool) {
        let fill = if value { u64::MAX } else { 0 };
        self.words.iter_mut().for_each(|w| *w = fill);
        self.clear_tail();
    }

    /// Grow or shrink to `len` bits; new bits take `value`.
    pub fn resize(&mut self, len: usize, value: bool) {
        let old_len = self.len;
        self.words.resize(len.div_ceil(WORD_BITS), 0);
        self.len = len;
        if len > old_len {
            for i in old_len..len {
                self.set(i, value);
            }
        }
        self.clear_tail();
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn all(&self) -> bool {
        self.count_ones() == self.len
    }

    /// Indices of set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(w * WORD_BITS + bit)
            })
        })
    }

    fn clear_tail(&mut self) {
        let tail = self.len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}
