/* MIT License
 *
 * Copyright (c) 2023-2024 Andrew Smith
 *
 * Permission is hereby granted, free of charge, to any person
 * obtaining a copy of this software and associated documentation
 * files (the "Software"), to deal in the Software without
 * restriction, including without limitation the rights to use, copy,
 * modify, merge, publish, distribute, sublicense, and/or sell copies
 * of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be
 * included in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
 * EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
 * BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
 * ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
 * CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use statrs::distribution::{Binomial, DiscreteCDF};

/// Complement of a single nucleotide; anything unrecognized maps to N.
#[inline(always)]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        _ => b'N',
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Probability that one of the four bases matches by chance.
pub const RANDOM_BASE_PROB: f64 = 0.25;

/// Probability that a uniformly random sequence of length `size` matches a
/// fixed reference in at least `matches` positions: the upper tail of
/// Binomial(size, 1/4). Values are memoized by `(matches, size)` and the
/// table is shared by every aligner in a run.
#[derive(Debug, Clone, Default)]
pub struct RandomMatchProbability {
    cache: Arc<Mutex<HashMap<(usize, usize), f64>>>,
}

impl RandomMatchProbability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prob(&self, matches: usize, size: usize) -> f64 {
        if matches == 0 || size == 0 {
            return 1.0;
        }
        let matches = matches.min(size);
        let mut cache = self.cache.lock().unwrap();
        *cache.entry((matches, size)).or_insert_with(|| {
            Binomial::new(RANDOM_BASE_PROB, size as u64)
                .map(|d| d.sf(matches as u64 - 1))
                .unwrap_or(1.0)
        })
    }
}

/// Mean base quality of the first `window` scores, relative to `base`.
pub fn mean_quality(qualities: &[u8], window: usize, base: u8) -> f64 {
    let window = window.min(qualities.len());
    if window == 0 {
        return 0.0;
    }
    let total: i64 = qualities[..window]
        .iter()
        .map(|&q| q as i64 - base as i64)
        .sum();
    total as f64 / window as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revcomp_roundtrip() {
        let seq = b"AACGTGNT";
        assert_eq!(reverse_complement(&reverse_complement(seq)), seq);
        assert_eq!(reverse_complement(b"AGATCGGAA"), b"TTCCGATCT");
    }

    #[test]
    fn perfect_match_probability() {
        let rmp = RandomMatchProbability::new();
        let p = rmp.prob(8, 8);
        assert!((p - RANDOM_BASE_PROB.powi(8)).abs() < 1e-12);
    }

    #[test]
    fn tail_is_monotone_in_matches() {
        let rmp = RandomMatchProbability::new();
        let mut last = 1.0;
        for m in 1..=20 {
            let p = rmp.prob(m, 20);
            assert!(p <= last + 1e-12);
            last = p;
        }
    }

    #[test]
    fn few_matches_are_likely() {
        let rmp = RandomMatchProbability::new();
        assert_eq!(rmp.prob(0, 100), 1.0);
        assert!(rmp.prob(10, 100) > 0.999);
        assert!(rmp.prob(90, 100) < 1e-6);
    }

    #[test]
    fn memoized_values_are_stable() {
        let rmp = RandomMatchProbability::new();
        let first = rmp.prob(12, 30);
        assert_eq!(rmp.prob(12, 30), first);
        let clone = rmp.clone();
        assert_eq!(clone.prob(12, 30), first);
    }
}
