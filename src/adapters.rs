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

use crate::align::{
    compare_prefixes, compare_suffixes, AlignSpan, Aligner, NoIndelAligner, SEMIGLOBAL,
    START_WITHIN_SEQ1, START_WITHIN_SEQ2, STOP_WITHIN_SEQ1, STOP_WITHIN_SEQ2,
};
use crate::util::RandomMatchProbability;

/// Where an adaptor is expected relative to the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Where {
    Front,
    Back,
    Anywhere,
    AnchoredFront,
    AnchoredBack,
}

impl Where {
    fn flags(self) -> u8 {
        match self {
            Where::Front => START_WITHIN_SEQ1 | START_WITHIN_SEQ2 | STOP_WITHIN_SEQ2,
            Where::Back => START_WITHIN_SEQ2 | STOP_WITHIN_SEQ1 | STOP_WITHIN_SEQ2,
            Where::Anywhere => SEMIGLOBAL,
            Where::AnchoredFront => STOP_WITHIN_SEQ2,
            Where::AnchoredBack => START_WITHIN_SEQ2,
        }
    }

    /// Whether a match at this placement acts on the 5' end; `None` means
    /// the decision is made per match from the aligned position.
    pub fn front_hint(self) -> Option<bool> {
        match self {
            Where::Front | Where::AnchoredFront => Some(true),
            Where::Back | Where::AnchoredBack => Some(false),
            Where::Anywhere => None,
        }
    }
}

/// A single adaptor and its matching configuration. The aligners are built
/// on first use and reused for every read after that.
#[derive(Debug, Clone)]
pub struct Adapter {
    pub name: String,
    pub sequence: Vec<u8>,
    pub location: Where,
    pub max_error_rate: f64,
    pub min_overlap: usize,
    pub indels: bool,
    pub indel_cost: usize,
    pub read_wildcards: bool,
    pub adapter_wildcards: bool,
    pub max_rmp: Option<f64>,
    rmp: RandomMatchProbability,
    aligner: Option<Aligner>,
    gapless: Option<NoIndelAligner>,
}

impl Adapter {
    pub fn new(name: &str, sequence: &[u8], location: Where) -> Self {
        Adapter {
            name: name.to_string(),
            sequence: sequence.to_vec(),
            location,
            max_error_rate: 0.1,
            min_overlap: 3,
            indels: true,
            indel_cost: 1,
            read_wildcards: false,
            adapter_wildcards: true,
            max_rmp: None,
            rmp: RandomMatchProbability::new(),
            aligner: None,
            gapless: None,
        }
    }

    pub fn max_error_rate(mut self, rate: f64) -> Self {
        debug_assert!(rate > 0.0 && rate < 1.0);
        self.max_error_rate = rate;
        self
    }

    pub fn min_overlap(mut self, min_overlap: usize) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    pub fn indels(mut self, indels: bool, indel_cost: usize) -> Self {
        self.indels = indels;
        self.indel_cost = indel_cost;
        self
    }

    pub fn wildcards(mut self, read_wildcards: bool, adapter_wildcards: bool) -> Self {
        self.read_wildcards = read_wildcards;
        self.adapter_wildcards = adapter_wildcards;
        self
    }

    pub fn max_rmp(mut self, max_rmp: Option<f64>, rmp: RandomMatchProbability) -> Self {
        self.max_rmp = max_rmp;
        self.rmp = rmp;
        self
    }

    /// Locate this adaptor in `sequence`. Returns the best acceptable
    /// occurrence or `None`; never fails.
    pub fn match_to(&mut self, sequence: &[u8]) -> Option<AlignSpan> {
        if self.min_overlap > self.sequence.len() {
            return None;
        }
        let span = if self.indels {
            let reference = &self.sequence;
            let rate = self.max_error_rate;
            let flags = self.location.flags();
            let (wr, wq) = (self.adapter_wildcards, self.read_wildcards);
            let min_overlap = self.min_overlap;
            let indel_cost = self.indel_cost;
            let aligner = self.aligner.get_or_insert_with(|| {
                let mut a = Aligner::new(reference, rate, flags, wr, wq);
                a.min_overlap = min_overlap;
                a.indel_cost = indel_cost;
                a
            });
            aligner.locate(sequence)
        } else {
            match self.location {
                Where::AnchoredFront => self.accept(compare_prefixes(
                    &self.sequence,
                    sequence,
                    self.adapter_wildcards,
                    self.read_wildcards,
                )),
                Where::AnchoredBack => self.accept(compare_suffixes(
                    &self.sequence,
                    sequence,
                    self.adapter_wildcards,
                    self.read_wildcards,
                )),
                _ => {
                    let reference = &self.sequence;
                    let rate = self.max_error_rate;
                    let flags = self.location.flags();
                    let (wr, wq) = (self.adapter_wildcards, self.read_wildcards);
                    let min_overlap = self.min_overlap;
                    let gapless = self.gapless.get_or_insert_with(|| {
                        let mut a = NoIndelAligner::new(reference, rate, flags, wr, wq);
                        a.min_overlap = min_overlap;
                        a
                    });
                    gapless.locate(sequence)
                }
            }
        }?;
        if let Some(max_rmp) = self.max_rmp {
            if self.rmp.prob(span.matches, span.length()) > max_rmp {
                return None;
            }
        }
        Some(span)
    }

    fn accept(&self, span: AlignSpan) -> Option<AlignSpan> {
        let length = span.length();
        if length < self.min_overlap
            || span.errors as f64 > length as f64 * self.max_error_rate
        {
            return None;
        }
        Some(span)
    }
}
