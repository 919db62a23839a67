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

use crate::matches::MatchInfo;

/// One sequenced read: name, bases, and optional quality scores of the same
/// length. The clip counters accumulate bases removed from each end so that
/// later stages can reason about what earlier stages already cut.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqRead {
    pub name: Vec<u8>,
    pub sequence: Vec<u8>,
    pub qualities: Option<Vec<u8>>,
    pub match_info: Option<MatchInfo>,
    pub merged: bool,
    pub clipped_front: usize,
    pub clipped_back: usize,
}

impl SeqRead {
    pub fn new(name: &[u8], sequence: &[u8], qualities: Option<&[u8]>) -> Self {
        debug_assert!(qualities.map_or(true, |q| q.len() == sequence.len()));
        SeqRead {
            name: name.to_vec(),
            sequence: sequence.to_vec(),
            qualities: qualities.map(|q| q.to_vec()),
            match_info: None,
            merged: false,
            clipped_front: 0,
            clipped_back: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Keep only `[start, stop)` of the sequence and qualities, updating the
    /// clip counters. Returns the number of bases removed.
    pub fn trim_to(&mut self, start: usize, stop: usize) -> usize {
        let len = self.len();
        let stop = stop.min(len);
        let start = start.min(stop);
        let removed = len - (stop - start);
        self.clipped_front += start;
        self.clipped_back += len - stop;
        self.sequence.drain(stop..);
        self.sequence.drain(..start);
        if let Some(q) = self.qualities.as_mut() {
            q.drain(stop..);
            q.drain(..start);
        }
        removed
    }

    /// Count of `N` bases in the sequence.
    pub fn n_count(&self) -> usize {
        self.sequence.iter().filter(|&&b| b == b'N').count()
    }
}

/// A possibly-paired record; `r2` is absent in single-end mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub r1: SeqRead,
    pub r2: Option<SeqRead>,
}

impl Record {
    pub fn single(r1: SeqRead) -> Self {
        Record { r1, r2: None }
    }

    pub fn pair(r1: SeqRead, r2: SeqRead) -> Self {
        Record { r1, r2: Some(r2) }
    }

    pub fn is_paired(&self) -> bool {
        self.r2.is_some()
    }
}

/// An ordered group of records, processed atomically by one worker. Batches
/// are numbered 1..=N by the reader.
pub type Batch = Vec<Record>;
