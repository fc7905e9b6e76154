//! Bitmask compaction.
//!
//! Turns a visibility bitmask into the dense, ascending list of set bit
//! indices. Two passes over blocks of words:
//!
//! ```text
//!   words   [....|....|....|....]
//!   pass 1  popcount per block      (parallel)
//!   scan    exclusive prefix sum    (serial, one entry per block)
//!   pass 2  scatter indices         (parallel, disjoint output slices)
//! ```

use rayon::prelude::*;

/// Words per parallel block.
const BLOCK_WORDS: usize = 256;

/// Number of 32-bit words needed for `bits` bits.
#[inline]
#[must_use]
pub const fn mask_words(bits: usize) -> usize {
    bits.div_ceil(32)
}

/// Word `index` of a mask over `bits` bits, with bits at or beyond `bits`
/// cleared.
#[inline]
fn masked_word(words: &[u32], index: usize, bits: usize) -> u32 {
    let word = words[index];
    let first = index * 32;
    if first + 32 <= bits {
        word
    } else if first >= bits {
        0
    } else {
        word & ((1u32 << (bits - first)) - 1)
    }
}

/// Set bits among the first `bits` bits.
#[must_use]
pub fn popcount(words: &[u32], bits: usize) -> usize {
    let len = mask_words(bits).min(words.len());
    (0..len).map(|i| masked_word(words, i, bits).count_ones() as usize).sum()
}

/// Indices of the set bits among the first `bits` bits of `words`, in
/// ascending order.
#[must_use]
pub fn compact(words: &[u32], bits: usize) -> Vec<u32> {
    let mut out = Vec::new();
    compact_into(words, bits, &mut out);
    out
}

/// [`compact`] into a reused buffer. Returns the number of indices written.
pub fn compact_into(words: &[u32], bits: usize, out: &mut Vec<u32>) -> usize {
    let len = mask_words(bits).min(words.len());
    let words = &words[..len];

    let counts: Vec<usize> = words
        .par_chunks(BLOCK_WORDS)
        .enumerate()
        .map(|(block, chunk)| {
            let base = block * BLOCK_WORDS;
            (0..chunk.len())
                .map(|i| masked_word(words, base + i, bits).count_ones() as usize)
                .sum()
        })
        .collect();
    let total: usize = counts.iter().sum();

    out.clear();
    out.resize(total, 0);

    let mut slices = Vec::with_capacity(counts.len());
    let mut rest = out.as_mut_slice();
    for &count in &counts {
        let (head, tail) = rest.split_at_mut(count);
        slices.push(head);
        rest = tail;
    }

    slices
        .into_par_iter()
        .zip(words.par_chunks(BLOCK_WORDS))
        .enumerate()
        .for_each(|(block, (slot, chunk))| {
            let base = block * BLOCK_WORDS;
            let mut cursor = 0;
            for i in 0..chunk.len() {
                let mut word = masked_word(words, base + i, bits);
                while word != 0 {
                    let bit = word.trailing_zeros();
                    slot[cursor] = ((base + i) * 32) as u32 + bit;
                    cursor += 1;
                    word &= word - 1;
                }
            }
        });
    total
}

/// Sets bit `index`.
#[inline]
pub fn set_bit(words: &mut [u32], index: usize) {
    words[index / 32] |= 1 << (index % 32);
}

/// Whether bit `index` is set.
#[inline]
#[must_use]
pub fn test_bit(words: &[u32], index: usize) -> bool {
    words.get(index / 32).is_some_and(|w| w & (1 << (index % 32)) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(bits: usize, set: &[usize]) -> Vec<u32> {
        let mut words = vec![0; mask_words(bits)];
        for &i in set {
            set_bit(&mut words, i);
        }
        words
    }

    #[test]
    fn test_compact_forty_instances() {
        let words = mask(40, &[0, 5, 13, 39]);
        assert_eq!(compact(&words, 40), vec![0, 5, 13, 39]);
        assert_eq!(popcount(&words, 40), 4);
    }

    #[test]
    fn test_empty_mask() {
        assert!(compact(&[0, 0, 0], 96).is_empty());
        assert!(compact(&[], 0).is_empty());
    }

    #[test]
    fn test_bits_beyond_count_are_ignored() {
        let words = vec![u32::MAX, u32::MAX];
        assert_eq!(compact(&words, 35), (0..35).collect::<Vec<_>>());
        assert_eq!(popcount(&words, 35), 35);
        assert_eq!(popcount(&words, 32), 32);
    }

    #[test]
    fn test_compact_across_blocks() {
        let bits = BLOCK_WORDS * 32 * 3 + 17;
        let set: Vec<usize> = (0..bits).filter(|i| i % 7 == 3 || i % 1000 == 0).collect();
        let words = mask(bits, &set);

        let result = compact(&words, bits);
        assert_eq!(result.len(), popcount(&words, bits));
        assert_eq!(result, set.iter().map(|&i| i as u32).collect::<Vec<_>>());
        assert!(result.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_compact_into_reuses_buffer() {
        let mut out = vec![99; 10];
        let n = compact_into(&mask(8, &[1, 2]), 8, &mut out);
        assert_eq!(n, 2);
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_bit_helpers() {
        let words = mask(64, &[33]);
        assert!(test_bit(&words, 33));
        assert!(!test_bit(&words, 32));
        assert!(!test_bit(&words, 4000));
    }
}
