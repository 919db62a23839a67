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

//! Adaptor detection through paired-end insert matching.
//!
//! With a short insert, both mates read through it into the adaptor on
//! their 3' ends. Overlapping read 1 with the reverse complement of read 2
//! provides far more evidence per decision than aligning a short adaptor
//! tail, so weak single-end matches can be replaced by a statistically
//! gated overlap test.

use crate::align::{
    compare_prefixes, AlignSpan, Aligner, START_WITHIN_SEQ1, STOP_WITHIN_SEQ2,
};
use crate::util::{reverse_complement, RandomMatchProbability};

/// Overlapping mates share indels, so insert matching never pays for one.
const FORBIDDEN_INDEL_COST: usize = 100_000;

/// Result of [`InsertAligner::match_insert`]: the insert overlap (if any)
/// and the derived per-read adaptor occurrences (if justified).
#[derive(Debug, Clone, Default)]
pub struct InsertMatch {
    pub insert: Option<AlignSpan>,
    pub insert_size: usize,
    pub adapter1: Option<AlignSpan>,
    pub adapter2: Option<AlignSpan>,
}

/// Insert matcher for paired-end reads with 3' adaptors.
#[derive(Debug, Clone)]
pub struct InsertAligner {
    adapter1: Vec<u8>,
    adapter2: Vec<u8>,
    rmp: RandomMatchProbability,
    pub insert_max_rmp: f64,
    pub adapter_max_rmp: f64,
    pub min_insert_overlap: usize,
    pub max_insert_mismatch_frac: f64,
    pub min_adapter_overlap: usize,
    pub min_adapter_match_frac: f64,
    pub adapter_check_cutoff: usize,
}

impl InsertAligner {
    pub fn new(adapter1: &[u8], adapter2: &[u8], rmp: RandomMatchProbability) -> Self {
        InsertAligner {
            adapter1: adapter1.to_vec(),
            adapter2: adapter2.to_vec(),
            rmp,
            insert_max_rmp: 1e-6,
            adapter_max_rmp: 1e-3,
            min_insert_overlap: 1,
            max_insert_mismatch_frac: 0.2,
            min_adapter_overlap: 1,
            min_adapter_match_frac: 0.8,
            adapter_check_cutoff: 9,
        }
    }

    fn insert_is_random_match(&self, matches: usize, size: usize) -> bool {
        self.rmp.prob(matches, size) > self.insert_max_rmp
    }

    /// Find the insert overlap between the mates, then check whether the
    /// trailing segments look like the configured adaptors.
    pub fn match_insert(&self, seq1: &[u8], seq2: &[u8]) -> InsertMatch {
        let l1 = seq1.len();
        let l2 = seq2.len();
        let seq_len = l1.min(l2);
        let s1 = &seq1[..seq_len];
        let s2 = &seq2[..seq_len];

        let mut result = InsertMatch::default();
        if seq_len == 0 {
            return result;
        }

        let seq2_rc = reverse_complement(s2);
        let mut aligner = Aligner::new(
            &seq2_rc,
            self.max_insert_mismatch_frac,
            START_WITHIN_SEQ1 | STOP_WITHIN_SEQ2,
            false,
            false,
        );
        aligner.min_overlap = self.min_insert_overlap;
        aligner.indel_cost = FORBIDDEN_INDEL_COST;

        let Some(insert) = aligner.locate(s1) else {
            return result;
        };

        let offset = insert.refstart.min(seq_len - insert.querystop);
        let insert_size = seq_len - offset;
        if self.insert_is_random_match(insert.matches, insert_size) {
            return result;
        }
        result.insert = Some(insert);
        result.insert_size = insert_size;

        if offset < self.min_adapter_overlap {
            return result;
        }

        let a1 = compare_prefixes(&s1[insert_size..], &self.adapter1, false, false);
        let a2 = compare_prefixes(&s2[insert_size..], &self.adapter2, false, false);
        let adapter_len = offset.min(self.adapter1.len()).min(self.adapter2.len());
        let min_adapter_matches =
            (adapter_len as f64 * self.min_adapter_match_frac).ceil() as usize;
        if a1.matches < min_adapter_matches && a2.matches < min_adapter_matches {
            return result;
        }
        let a1_prob = self.rmp.prob(a1.matches, adapter_len);
        let a2_prob = self.rmp.prob(a2.matches, adapter_len);
        if adapter_len > self.adapter_check_cutoff && a1_prob * a2_prob > self.adapter_max_rmp
        {
            return result;
        }

        let adapter_len1 = self.adapter1.len().min(l1 - insert_size);
        let adapter_len2 = self.adapter2.len().min(l2 - insert_size);
        let best = if a1_prob < a2_prob { a1 } else { a2 };
        result.adapter1 = Some(AlignSpan {
            refstart: 0,
            refstop: adapter_len1,
            querystart: insert_size,
            querystop: l1,
            matches: best.matches,
            errors: best.errors,
        });
        result.adapter2 = Some(AlignSpan {
            refstart: 0,
            refstop: adapter_len2,
            querystart: insert_size,
            querystop: l2,
            matches: best.matches,
            errors: best.errors,
        });
        result
    }
}
