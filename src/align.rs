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

//! Semi-global alignment of an adaptor against a read.
//!
//! The flags control which ends of which sequence may carry free gaps.
//! `START_WITHIN_SEQ1` means an initial portion of seq1 (the reference)
//! may be skipped at no cost, which is the same as saying gaps at the
//! beginning of seq2 are free. The other flags read the same way.

/// An initial portion of the reference may be skipped at no cost.
pub const START_WITHIN_SEQ1: u8 = 1;
/// An initial portion of the query may be skipped at no cost.
pub const START_WITHIN_SEQ2: u8 = 2;
/// A trailing portion of the reference may be ignored at no cost.
pub const STOP_WITHIN_SEQ1: u8 = 4;
/// A trailing portion of the query may be ignored at no cost.
pub const STOP_WITHIN_SEQ2: u8 = 8;

/// All gaps at the beginning or end of either sequence are free.
pub const SEMIGLOBAL: u8 =
    START_WITHIN_SEQ1 | START_WITHIN_SEQ2 | STOP_WITHIN_SEQ1 | STOP_WITHIN_SEQ2;

pub const WILDCARD_CHAR: u8 = b'N';

/// Location of an alignment: half-open intervals in the reference and the
/// query, plus the number of matching positions and the total error cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignSpan {
    pub refstart: usize,
    pub refstop: usize,
    pub querystart: usize,
    pub querystop: usize,
    pub matches: usize,
    pub errors: usize,
}

impl AlignSpan {
    /// Aligned span in the reference.
    pub fn length(&self) -> usize {
        self.refstop - self.refstart
    }
}

#[inline(always)]
fn bases_match(r: u8, q: u8, wildcard_ref: bool, wildcard_query: bool) -> bool {
    r == q || (wildcard_ref && r == WILDCARD_CHAR) || (wildcard_query && q == WILDCARD_CHAR)
}

/// Compare the overlapping prefixes of `s1` and `s2` base by base, without
/// indels. A position counts as a match when the bases are equal or when the
/// wildcard flag of its side accepts an `N`. Never fails.
pub fn compare_prefixes(
    s1: &[u8],
    s2: &[u8],
    wildcard_ref: bool,
    wildcard_query: bool,
) -> AlignSpan {
    let length = s1.len().min(s2.len());
    let mut matches = 0;
    for i in 0..length {
        if bases_match(s1[i], s2[i], wildcard_ref, wildcard_query) {
            matches += 1;
        }
    }
    AlignSpan {
        refstart: 0,
        refstop: length,
        querystart: 0,
        querystop: length,
        matches,
        errors: length - matches,
    }
}

/// Same as [`compare_prefixes`] on the reversed inputs, with the resulting
/// positions expressed relative to the original strings.
pub fn compare_suffixes(
    s1: &[u8],
    s2: &[u8],
    wildcard_ref: bool,
    wildcard_query: bool,
) -> AlignSpan {
    let length = s1.len().min(s2.len());
    let mut matches = 0;
    for i in 0..length {
        let r = s1[s1.len() - 1 - i];
        let q = s2[s2.len() - 1 - i];
        if bases_match(r, q, wildcard_ref, wildcard_query) {
            matches += 1;
        }
    }
    AlignSpan {
        refstart: s1.len() - length,
        refstop: s1.len(),
        querystart: s2.len() - length,
        querystop: s2.len(),
        matches,
        errors: length - matches,
    }
}

/// One cell of the rolling DP column. `origin` encodes where the alignment
/// entered the matrix: non-negative values are a query start position,
/// negative values are the negated reference start position.
#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    cost: usize,
    matches: usize,
    origin: isize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    span: AlignSpan,
}

/// Decision rule shared by both aligners: most matches win, ties go to the
/// fewest errors, then the longest reference span, then the smallest
/// reference start.
pub(crate) fn span_better(new: &AlignSpan, best: &AlignSpan) -> bool {
    if new.matches != best.matches {
        return new.matches > best.matches;
    }
    if new.errors != best.errors {
        return new.errors < best.errors;
    }
    if new.length() != best.length() {
        return new.length() > best.length();
    }
    new.refstart < best.refstart
}

/// Edit-distance aligner that locates a reference inside a query under a
/// bounded error rate, with per-side start/stop freeness. The DP column is
/// allocated once and reused across `locate` calls.
#[derive(Debug, Clone)]
pub struct Aligner {
    reference: Vec<u8>,
    max_error_rate: f64,
    flags: u8,
    wildcard_ref: bool,
    wildcard_query: bool,
    pub min_overlap: usize,
    pub indel_cost: usize,
    column: Vec<Entry>,
}

impl Aligner {
    pub fn new(
        reference: &[u8],
        max_error_rate: f64,
        flags: u8,
        wildcard_ref: bool,
        wildcard_query: bool,
    ) -> Self {
        Aligner {
            reference: reference.to_vec(),
            max_error_rate,
            flags,
            wildcard_ref,
            wildcard_query,
            min_overlap: 1,
            indel_cost: 1,
            column: Vec::new(),
        }
    }

    pub fn reference(&self) -> &[u8] {
        &self.reference
    }

    fn consider(&self, best: &mut Option<Candidate>, entry: Entry, i: usize, j: usize) {
        let (refstart, querystart) = if entry.origin >= 0 {
            (0, entry.origin as usize)
        } else {
            ((-entry.origin) as usize, 0)
        };
        let length = i - refstart;
        if length < self.min_overlap || length == 0 {
            return;
        }
        if entry.cost as f64 > length as f64 * self.max_error_rate {
            return;
        }
        let span = AlignSpan {
            refstart,
            refstop: i,
            querystart,
            querystop: j,
            matches: entry.matches,
            errors: entry.cost,
        };
        match best {
            Some(b) if !span_better(&span, &b.span) => {}
            _ => *best = Some(Candidate { span }),
        }
    }

    /// Find the best location of the reference within `query`, or `None`
    /// when no candidate satisfies the error rate and overlap constraints.
    pub fn locate(&mut self, query: &[u8]) -> Option<AlignSpan> {
        let m = self.reference.len();
        let n = query.len();
        if m == 0 || n == 0 {
            return None;
        }
        let start_in_ref = self.flags & START_WITHIN_SEQ1 != 0;
        let start_in_query = self.flags & START_WITHIN_SEQ2 != 0;
        let stop_in_ref = self.flags & STOP_WITHIN_SEQ1 != 0;
        let stop_in_query = self.flags & STOP_WITHIN_SEQ2 != 0;

        let mut column = std::mem::take(&mut self.column);
        column.clear();
        column.reserve(m + 1);
        for i in 0..=m {
            column.push(if start_in_ref {
                Entry { cost: 0, matches: 0, origin: -(i as isize) }
            } else {
                Entry { cost: i * self.indel_cost, matches: 0, origin: 0 }
            });
        }

        let mut best: Option<Candidate> = None;
        for j in 1..=n {
            let q = query[j - 1];
            let mut diag = column[0];
            column[0] = if start_in_query {
                Entry { cost: 0, matches: 0, origin: j as isize }
            } else {
                Entry { cost: j * self.indel_cost, matches: 0, origin: 0 }
            };
            for i in 1..=m {
                let prev = column[i]; // cell (i, j-1)
                let is_match =
                    bases_match(self.reference[i - 1], q, self.wildcard_ref, self.wildcard_query);
                let cost_diag = diag.cost + usize::from(!is_match);
                let cost_del = column[i - 1].cost + self.indel_cost;
                let cost_ins = prev.cost + self.indel_cost;
                column[i] = if cost_diag <= cost_del && cost_diag <= cost_ins {
                    Entry {
                        cost: cost_diag,
                        matches: diag.matches + usize::from(is_match),
                        origin: diag.origin,
                    }
                } else if cost_del <= cost_ins {
                    Entry { cost: cost_del, matches: column[i - 1].matches, origin: column[i - 1].origin }
                } else {
                    Entry { cost: cost_ins, matches: prev.matches, origin: prev.origin }
                };
                diag = prev;
            }
            if stop_in_query {
                self.consider(&mut best, column[m], m, j);
            }
        }
        if stop_in_ref {
            for i in 1..=m {
                self.consider(&mut best, column[i], i, n);
            }
        } else if !stop_in_query {
            self.consider(&mut best, column[m], m, n);
        }
        self.column = column;
        best.map(|c| c.span)
    }
}

/// Ungapped variant: a sliding-window scan over every diagonal the freeness
/// flags permit, with the same decision rule as [`Aligner`].
#[derive(Debug, Clone)]
pub struct NoIndelAligner {
    reference: Vec<u8>,
    max_error_rate: f64,
    flags: u8,
    wildcard_ref: bool,
    wildcard_query: bool,
    pub min_overlap: usize,
}

impl NoIndelAligner {
    pub fn new(
        reference: &[u8],
        max_error_rate: f64,
        flags: u8,
        wildcard_ref: bool,
        wildcard_query: bool,
    ) -> Self {
        NoIndelAligner {
            reference: reference.to_vec(),
            max_error_rate,
            flags,
            wildcard_ref,
            wildcard_query,
            min_overlap: 1,
        }
    }

    fn scan(&self, query: &[u8], refstart: usize, querystart: usize) -> Option<AlignSpan> {
        let m = self.reference.len();
        let n = query.len();
        let length = (m - refstart).min(n - querystart);
        if length < self.min_overlap || length == 0 {
            return None;
        }
        // The diagonal runs until one sequence is exhausted; the other side
        // then needs its stop flag.
        if refstart + length < m && self.flags & STOP_WITHIN_SEQ1 == 0 {
            return None;
        }
        if querystart + length < n && self.flags & STOP_WITHIN_SEQ2 == 0 {
            return None;
        }
        let max_errors = (length as f64 * self.max_error_rate) as usize;
        let mut matches = 0;
        let mut errors = 0;
        for i in 0..length {
            if bases_match(
                self.reference[refstart + i],
                query[querystart + i],
                self.wildcard_ref,
                self.wildcard_query,
            ) {
                matches += 1;
            } else {
                errors += 1;
                if errors > max_errors {
                    return None;
                }
            }
        }
        Some(AlignSpan {
            refstart,
            refstop: refstart + length,
            querystart,
            querystop: querystart + length,
            matches,
            errors,
        })
    }

    pub fn locate(&self, query: &[u8]) -> Option<AlignSpan> {
        let m = self.reference.len();
        let n = query.len();
        if m == 0 || n == 0 {
            return None;
        }
        let mut best: Option<AlignSpan> = None;
        let keep = |span: Option<AlignSpan>, best: &mut Option<AlignSpan>| {
            if let Some(span) = span {
                match best {
                    Some(b) if !span_better(&span, b) => {}
                    _ => *best = Some(span),
                }
            }
        };
        keep(self.scan(query, 0, 0), &mut best);
        if self.flags & START_WITHIN_SEQ2 != 0 {
            for qs in 1..n {
                keep(self.scan(query, 0, qs), &mut best);
            }
        }
        if self.flags & START_WITHIN_SEQ1 != 0 {
            for rs in 1..m {
                keep(self.scan(query, rs, 0), &mut best);
            }
        }
        best
    }
}
