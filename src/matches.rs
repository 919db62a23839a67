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

use crate::adapters::Adapter;
use crate::align::WILDCARD_CHAR;
use crate::record::SeqRead;

/// One adaptor occurrence in one read. Holds non-owning references to both;
/// a `Match` lives only as long as the record it was found in is being
/// processed. Immutable after construction.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub astart: usize,
    pub astop: usize,
    pub rstart: usize,
    pub rstop: usize,
    pub matches: usize,
    pub errors: usize,
    pub front: bool,
    pub adapter: &'a Adapter,
    pub read: &'a SeqRead,
}

impl<'a> Match<'a> {
    /// `front` defaults to whether the first base of the read takes part in
    /// the alignment.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        astart: usize,
        astop: usize,
        rstart: usize,
        rstop: usize,
        matches: usize,
        errors: usize,
        front: Option<bool>,
        adapter: &'a Adapter,
        read: &'a SeqRead,
    ) -> Self {
        debug_assert!(astart < astop && astop <= adapter.sequence.len());
        debug_assert!(rstart <= rstop && rstop <= read.len());
        debug_assert!(astop - astart > errors);
        Match {
            astart,
            astop,
            rstart,
            rstop,
            matches,
            errors,
            front: front.unwrap_or(rstart == 0),
            adapter,
            read,
        }
    }

    /// Number of aligned positions in the adaptor. With indels this can
    /// differ from the aligned span in the read.
    pub fn length(&self) -> usize {
        self.astop - self.astart
    }

    /// For each wildcard position of the adaptor inside the aligned span,
    /// the read base it matched. ATNGNA against ATCGTA gives "CT". Not
    /// reliable when the alignment contains indels.
    pub fn wildcards(&self, wildcard_char: u8) -> Vec<u8> {
        (0..self.length())
            .filter(|i| {
                self.adapter.sequence[self.astart + i] == wildcard_char
                    && self.rstart + i < self.read.len()
            })
            .map(|i| self.read.sequence[self.rstart + i])
            .collect()
    }

    /// The part of the read before the match for a 5' adaptor, after it for
    /// a 3' adaptor. Can be empty.
    pub fn rest(&self) -> &'a [u8] {
        if self.front {
            &self.read.sequence[..self.rstart]
        } else {
            &self.read.sequence[self.rstop..]
        }
    }

    /// Owned snapshot of everything the formatters need once the borrows on
    /// the adaptor and read are gone.
    pub fn info_record(&self) -> MatchInfo {
        let seq = &self.read.sequence;
        let empty: &[u8] = b"";
        let qual = self.read.qualities.as_deref().unwrap_or(empty);
        let (qb, qa, qp) = if qual.is_empty() {
            (Vec::new(), Vec::new(), Vec::new())
        } else {
            (
                qual[..self.rstart].to_vec(),
                qual[self.rstart..self.rstop].to_vec(),
                qual[self.rstop..].to_vec(),
            )
        };
        let rsize = self.rstop - self.rstart;
        let rsize_total = if self.front && self.rstart > 0 {
            self.rstop
        } else if !self.front && self.rstop < seq.len() {
            seq.len() - self.rstart
        } else {
            rsize
        };
        MatchInfo {
            read_name: self.read.name.clone(),
            errors: self.errors,
            rstart: self.rstart,
            rstop: self.rstop,
            seq_before: seq[..self.rstart].to_vec(),
            seq_adapter: seq[self.rstart..self.rstop].to_vec(),
            seq_after: seq[self.rstop..].to_vec(),
            adapter_name: self.adapter.name.clone(),
            qual_before: qb,
            qual_adapter: qa,
            qual_after: qp,
            is_front: self.front,
            asize: self.length(),
            rsize_adapter: rsize,
            rsize_total,
            wildcards: self.wildcards(WILDCARD_CHAR),
        }
    }
}

/// Owned description of an adaptor match, carried on the trimmed read for
/// the rest-file, info-file and wildcard-file formatters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchInfo {
    pub read_name: Vec<u8>,
    pub errors: usize,
    pub rstart: usize,
    pub rstop: usize,
    pub seq_before: Vec<u8>,
    pub seq_adapter: Vec<u8>,
    pub seq_after: Vec<u8>,
    pub adapter_name: String,
    pub qual_before: Vec<u8>,
    pub qual_adapter: Vec<u8>,
    pub qual_after: Vec<u8>,
    pub is_front: bool,
    pub asize: usize,
    pub rsize_adapter: usize,
    pub rsize_total: usize,
    pub wildcards: Vec<u8>,
}

impl MatchInfo {
    /// The unmatched remainder on the far side of the adaptor.
    pub fn rest(&self) -> &[u8] {
        if self.is_front {
            &self.seq_before
        } else {
            &self.seq_after
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, Where};

    fn back_adapter(seq: &[u8]) -> Adapter {
        Adapter::new("adapter1", seq, Where::Back)
    }

    #[test]
    fn rest_depends_on_side() {
        let adapter = back_adapter(b"AGATCGGAAGA");
        let read = SeqRead::new(b"r", b"ACGTACGTAAAAGATCGGAAGA", None);
        let m = Match::new(0, 11, 11, 22, 11, 0, None, &adapter, &read);
        assert!(!m.front);
        assert_eq!(m.rest(), b"");
        let m = Match::new(0, 11, 11, 22, 11, 0, Some(false), &adapter, &read);
        assert_eq!(&read.sequence[..m.rstart], b"ACGTACGTAAA");

        let front = Match::new(0, 11, 0, 11, 11, 0, None, &adapter, &read);
        assert!(front.front);
        assert_eq!(front.rest(), b"");
    }

    #[test]
    fn wildcards_collects_matched_bases() {
        let adapter = back_adapter(b"ATNGNA");
        let read = SeqRead::new(b"r", b"ATCGTA", None);
        let m = Match::new(0, 6, 0, 6, 6, 0, Some(false), &adapter, &read);
        assert_eq!(m.wildcards(b'N'), b"CT");
    }

    #[test]
    fn info_record_slices() {
        let adapter = back_adapter(b"AGATCGGAAGA");
        let read = SeqRead::new(
            b"read1",
            b"ACGTACGTAAAAGATCGGAAGA",
            Some(b"IIIIIIIIIIIJJJJJJJJJJJ"),
        );
        let m = Match::new(0, 11, 11, 22, 11, 0, Some(false), &adapter, &read);
        let info = m.info_record();
        assert_eq!(info.seq_before, b"ACGTACGTAAA");
        assert_eq!(info.seq_adapter, b"AGATCGGAAGA");
        assert_eq!(info.seq_after, b"");
        assert_eq!(info.qual_adapter, b"JJJJJJJJJJJ");
        assert_eq!(info.adapter_name, "adapter1");
        assert_eq!(info.asize, 11);
        assert_eq!(info.rsize_adapter, 11);
        assert!(!info.is_front);
        assert_eq!(info.rest(), b"");
    }
}
