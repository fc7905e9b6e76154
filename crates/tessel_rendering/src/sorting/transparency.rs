//! Back-to-front ordering of transparent draw calls.
//!
//! Count-aware: only the first `count` draw calls (the survivors) take part.
//! Entries past the count are never read or written.

use crate::instancing::DrawCall;

const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;
const PASSES: u32 = u64::BITS / RADIX_BITS;

/// Maps an `f32` onto a `u32` with the same ordering.
#[inline]
#[must_use]
pub fn ordered_f32_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Sort key for a transparent draw call: farther first, then ascending
/// draw-call index among equal depths.
#[inline]
#[must_use]
pub fn depth_sort_key(view_depth: f32, draw_call_index: u32) -> u64 {
    (u64::from(ordered_f32_bits(view_depth)) << 32) | u64::from(!draw_call_index)
}

/// Reorders draw calls by descending key with a stable LSD radix sort.
///
/// Scratch buffers are kept between frames.
#[derive(Debug, Default)]
pub struct TransparencyOrderer {
    keys: Vec<u64>,
    keys_scratch: Vec<u64>,
    order: Vec<u32>,
    order_scratch: Vec<u32>,
    draws_scratch: Vec<DrawCall>,
    passes_run: u32,
}

impl TransparencyOrderer {
    /// Creates an orderer with empty scratch space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Radix passes actually executed by the last sort. Passes whose digit
    /// is the same for every key are skipped.
    #[must_use]
    pub const fn passes_run(&self) -> u32 {
        self.passes_run
    }

    /// Permutation that orders `keys[..count]` by descending key, ties in
    /// original order.
    pub fn sort_order(&mut self, keys: &[u64], count: usize) -> &[u32] {
        let count = count.min(keys.len());
        // Ascending on the complement is descending on the key.
        self.keys.clear();
        self.keys.extend(keys[..count].iter().map(|&k| !k));
        self.order.clear();
        self.order.extend(0..count as u32);
        self.keys_scratch.resize(count, 0);
        self.order_scratch.resize(count, 0);
        self.passes_run = 0;

        let mut histogram = [0usize; RADIX];
        for pass in 0..PASSES {
            let shift = pass * RADIX_BITS;
            histogram.fill(0);
            for &key in &self.keys {
                histogram[digit(key, shift)] += 1;
            }
            if histogram.iter().any(|&n| n == count) {
                continue;
            }

            let mut offset = 0;
            for bucket in &mut histogram {
                let n = *bucket;
                *bucket = offset;
                offset += n;
            }
            for (&key, &index) in self.keys.iter().zip(&self.order) {
                let slot = &mut histogram[digit(key, shift)];
                self.keys_scratch[*slot] = key;
                self.order_scratch[*slot] = index;
                *slot += 1;
            }
            std::mem::swap(&mut self.keys, &mut self.keys_scratch);
            std::mem::swap(&mut self.order, &mut self.order_scratch);
            self.passes_run += 1;
        }
        &self.order
    }

    /// Reorders `draws[..count]` so `keys` (parallel to `draws`) are
    /// non-increasing. Returns the number of draw calls sorted.
    pub fn sort(&mut self, draws: &mut [DrawCall], keys: &[u64], count: usize) -> usize {
        let count = count.min(draws.len()).min(keys.len());
        if count < 2 {
            return count;
        }
        self.sort_order(keys, count);
        self.draws_scratch.clear();
        self.draws_scratch
            .extend(self.order.iter().map(|&i| draws[i as usize]));
        draws[..count].copy_from_slice(&self.draws_scratch);
        count
    }
}

#[inline]
fn digit(key: u64, shift: u32) -> usize {
    ((key >> shift) as usize) & (RADIX - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(first_instance: u32) -> DrawCall {
        DrawCall {
            index_count: 3,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance,
        }
    }

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn test_ordered_bits_preserve_order() {
        let values = [-100.0f32, -1.5, -0.0, 0.0, 0.25, 3.0, 1e9];
        for pair in values.windows(2) {
            assert!(ordered_f32_bits(pair[0]) <= ordered_f32_bits(pair[1]));
        }
    }

    #[test]
    fn test_farther_sorts_first() {
        let mut orderer = TransparencyOrderer::new();
        let mut draws = vec![draw(0), draw(1), draw(2)];
        let keys = [depth_sort_key(5.0, 0), depth_sort_key(50.0, 1), depth_sort_key(20.0, 2)];
        orderer.sort(&mut draws, &keys, 3);
        let order: Vec<u32> = draws.iter().map(|d| d.first_instance).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_equal_depths_keep_index_order() {
        let mut orderer = TransparencyOrderer::new();
        let mut draws: Vec<DrawCall> = (0..4).map(draw).collect();
        let keys: Vec<u64> = (0..4).map(|i| depth_sort_key(7.0, i)).collect();
        orderer.sort(&mut draws, &keys, 4);
        assert_eq!(draws.iter().map(|d| d.first_instance).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_equal_keys_are_stable() {
        let mut orderer = TransparencyOrderer::new();
        let keys = [9, 3, 9, 3, 9];
        assert_eq!(orderer.sort_order(&keys, 5), &[0, 2, 4, 1, 3]);
    }

    #[test]
    fn test_entries_beyond_count_untouched() {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        let mut orderer = TransparencyOrderer::new();
        for count in [0usize, 1, 2, 17, 300] {
            let total = count + 25;
            let keys: Vec<u64> = (0..total).map(|_| rng.next()).collect();
            let mut draws: Vec<DrawCall> = (0..total as u32).map(draw).collect();
            let before = draws.clone();

            orderer.sort(&mut draws, &keys, count);

            let sorted_keys: Vec<u64> = draws[..count]
                .iter()
                .map(|d| keys[d.first_instance as usize])
                .collect();
            assert!(sorted_keys.windows(2).all(|w| w[0] >= w[1]));
            assert_eq!(
                bytemuck::cast_slice::<DrawCall, u8>(&draws[count..]),
                bytemuck::cast_slice::<DrawCall, u8>(&before[count..])
            );
            let mut seen: Vec<u32> = draws[..count].iter().map(|d| d.first_instance).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..count as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_constant_digits_are_skipped() {
        let mut orderer = TransparencyOrderer::new();
        let keys = [1u64, 2, 3, 4];
        orderer.sort_order(&keys, 4);
        assert_eq!(orderer.passes_run(), 1);
    }
}
