// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Re-chunking of arbitrary sized sample pushes into whole sample groups.
//!
//! Tuners and applications hand over buffers of any length. The pipeline only
//! accepts complete groups, so a trailing partial group is carried over and
//! completed by the next push.

/// Carries the partial group left over between pushes.
#[derive(Debug, Clone)]
pub struct Normalizer<T, const GROUP: usize> {
    carry: [T; GROUP],
    carried: usize,
}

/// Four bytes: two interleaved unsigned 8-bit I/Q pairs.
pub type Cu8Normalizer = Normalizer<u8, 4>;
/// Two interleaved signed 16-bit components.
pub type Cs16Normalizer = Normalizer<i16, 2>;

impl<T: Copy + Default, const GROUP: usize> Default for Normalizer<T, GROUP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const GROUP: usize> Normalizer<T, GROUP> {
    pub fn new() -> Self {
        Self {
            carry: [T::default(); GROUP],
            carried: 0,
        }
    }

    /// Number of elements currently held back.
    pub fn carried(&self) -> usize {
        self.carried
    }

    /// Drop any partial group.
    pub fn clear(&mut self) {
        self.carried = 0;
    }

    /// Forward every whole group in `carry ++ data`, keeping the remainder.
    ///
    /// `forward` is called at most twice: once for the completed carry and
    /// once with all whole groups of `data` as a single slice.
    pub fn push<F>(&mut self, mut data: &[T], mut forward: F)
    where
        F: FnMut(&[T]),
    {
        if self.carried > 0 {
            let need = GROUP - self.carried;
            if data.len() < need {
                self.carry[self.carried..self.carried + data.len()].copy_from_slice(data);
                self.carried += data.len();
                return;
            }
            self.carry[self.carried..].copy_from_slice(&data[..need]);
            self.carried = 0;
            forward(&self.carry);
            data = &data[need..];
        }

        let whole = data.len() - data.len() % GROUP;
        if whole > 0 {
            forward(&data[..whole]);
        }

        let rest = &data[whole..];
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carried = rest.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_cu8(chunks: &[&[u8]]) -> (Vec<u8>, Vec<usize>, usize) {
        let mut norm = Cu8Normalizer::new();
        let mut out = Vec::new();
        let mut sizes = Vec::new();
        for chunk in chunks {
            norm.push(chunk, |groups| {
                sizes.push(groups.len());
                out.extend_from_slice(groups);
            });
        }
        (out, sizes, norm.carried())
    }

    #[test]
    fn cu8_carries_across_pushes() {
        let (out, sizes, carried) = run_cu8(&[&[1, 2, 3, 4, 5, 6], &[7, 8, 9, 10]]);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(sizes, vec![4, 4]);
        assert_eq!(carried, 2);
    }

    #[test]
    fn cs16_single_components() {
        let mut norm = Cs16Normalizer::new();
        let mut out = Vec::new();
        for c in [-1i16, 2, -3] {
            norm.push(&[c], |g| out.extend_from_slice(g));
        }
        assert_eq!(out, vec![-1, 2]);
        assert_eq!(norm.carried(), 1);
        norm.push(&[4, 5, 6], |g| out.extend_from_slice(g));
        assert_eq!(out, vec![-1, 2, -3, 4, 5, 6]);
        assert_eq!(norm.carried(), 0);
    }

    #[test]
    fn concatenation_is_split_invariant() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1031).collect();
        let expected_len = data.len() - data.len() % 4;

        for step in [1usize, 2, 3, 5, 7, 64, 1000, 1031] {
            let chunks: Vec<&[u8]> = data.chunks(step).collect();
            let (out, sizes, carried) = run_cu8(&chunks);
            assert_eq!(out, data[..expected_len], "step {step}");
            assert!(sizes.iter().all(|n| n % 4 == 0), "step {step}");
            assert_eq!(carried, data.len() % 4);
        }
    }

    #[test]
    fn clear_drops_partial_group() {
        let mut norm = Cu8Normalizer::new();
        norm.push(&[9, 9, 9], |_| panic!("nothing complete yet"));
        norm.clear();
        let mut out = Vec::new();
        norm.push(&[1, 2, 3, 4], |g| out.extend_from_slice(g));
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_push_is_noop() {
        let mut norm = Cu8Normalizer::new();
        norm.push(&[1], |_| panic!("partial"));
        norm.push(&[], |_| panic!("empty"));
        assert_eq!(norm.carried(), 1);
    }
}
