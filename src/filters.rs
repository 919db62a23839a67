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

use crate::record::{Record, SeqRead};

/// Destination label assigned to each record after trimming. Every record
/// gets exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dest {
    Merged,
    TooShort,
    TooLong,
    NContent,
    Trimmed,
    Untrimmed,
    None,
}

impl Dest {
    pub fn label(self) -> &'static str {
        match self {
            Dest::Merged => "merged",
            Dest::TooShort => "too-short",
            Dest::TooLong => "too-long",
            Dest::NContent => "n-content",
            Dest::Trimmed => "trimmed",
            Dest::Untrimmed => "untrimmed",
            Dest::None => "none",
        }
    }
}

/// One registered filter predicate.
#[derive(Debug, Clone)]
pub enum FilterKind {
    Merged,
    TooShort(usize),
    TooLong(usize),
    /// Values below one are a fraction of the read length, otherwise an
    /// absolute count of N bases.
    NContent(f64),
    Trimmed,
    Untrimmed,
}

impl FilterKind {
    fn dest(&self) -> Dest {
        match self {
            FilterKind::Merged => Dest::Merged,
            FilterKind::TooShort(_) => Dest::TooShort,
            FilterKind::TooLong(_) => Dest::TooLong,
            FilterKind::NContent(_) => Dest::NContent,
            FilterKind::Trimmed => Dest::Trimmed,
            FilterKind::Untrimmed => Dest::Untrimmed,
        }
    }

    fn fires(&self, read: &SeqRead) -> bool {
        match self {
            FilterKind::Merged => read.merged,
            FilterKind::TooShort(min) => read.len() < *min,
            FilterKind::TooLong(max) => read.len() > *max,
            FilterKind::NContent(limit) => {
                let n = read.n_count();
                if *limit < 1.0 {
                    !read.is_empty() && n as f64 / read.len() as f64 > *limit
                } else {
                    n as f64 > *limit
                }
            }
            FilterKind::Trimmed => read.match_info.is_some(),
            FilterKind::Untrimmed => read.match_info.is_none(),
        }
    }
}

/// Ordered filter chain: the first filter firing on at least `min_affected`
/// sides of the record decides the destination.
#[derive(Debug, Clone)]
pub struct Filters {
    min_affected: usize,
    chain: Vec<FilterKind>,
}

impl Filters {
    /// `min_affected` is 1 to fire when any side matches, 2 to require both
    /// mates.
    pub fn new(min_affected: usize) -> Self {
        debug_assert!(min_affected == 1 || min_affected == 2);
        Filters { min_affected, chain: Vec::new() }
    }

    pub fn add_filter(&mut self, filter: FilterKind) {
        self.chain.push(filter);
    }

    pub fn classify(&self, record: &Record) -> Dest {
        for filter in &self.chain {
            let mut affected = usize::from(filter.fires(&record.r1));
            let mut sides = 1;
            if let Some(r2) = record.r2.as_ref() {
                affected += usize::from(filter.fires(r2));
                sides = 2;
            }
            if affected >= self.min_affected.min(sides) {
                return filter.dest();
            }
        }
        Dest::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::MatchInfo;

    fn read(seq: &[u8]) -> SeqRead {
        SeqRead::new(b"r", seq, None)
    }

    #[test]
    fn first_matching_filter_wins() {
        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::TooShort(5));
        filters.add_filter(FilterKind::NContent(0.0));
        let record = Record::single(read(b"NNN"));
        assert_eq!(filters.classify(&record), Dest::TooShort);
    }

    #[test]
    fn unfiltered_records_go_to_none() {
        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::TooShort(2));
        assert_eq!(filters.classify(&Record::single(read(b"ACGT"))), Dest::None);
    }

    #[test]
    fn pair_filter_any_versus_both() {
        let short = read(b"AC");
        let long = read(b"ACGTACGT");

        let mut any = Filters::new(1);
        any.add_filter(FilterKind::TooShort(5));
        let record = Record::pair(short.clone(), long.clone());
        assert_eq!(any.classify(&record), Dest::TooShort);

        let mut both = Filters::new(2);
        both.add_filter(FilterKind::TooShort(5));
        assert_eq!(both.classify(&record), Dest::None);
        let record = Record::pair(short.clone(), short);
        assert_eq!(both.classify(&record), Dest::TooShort);
    }

    #[test]
    fn min_affected_clamps_for_single_end() {
        let mut both = Filters::new(2);
        both.add_filter(FilterKind::TooShort(5));
        assert_eq!(both.classify(&Record::single(read(b"AC"))), Dest::TooShort);
    }

    #[test]
    fn n_content_fraction_and_count() {
        let mut frac = Filters::new(1);
        frac.add_filter(FilterKind::NContent(0.25));
        assert_eq!(frac.classify(&Record::single(read(b"ANNA"))), Dest::NContent);
        assert_eq!(frac.classify(&Record::single(read(b"ANAA"))), Dest::None);

        let mut count = Filters::new(1);
        count.add_filter(FilterKind::NContent(2.0));
        assert_eq!(count.classify(&Record::single(read(b"NNNA"))), Dest::NContent);
        assert_eq!(count.classify(&Record::single(read(b"NNAA"))), Dest::None);
    }

    #[test]
    fn trimmed_and_untrimmed() {
        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::Trimmed);
        let mut trimmed = read(b"ACGT");
        trimmed.match_info = Some(MatchInfo::default());
        assert_eq!(filters.classify(&Record::single(trimmed)), Dest::Trimmed);
        assert_eq!(filters.classify(&Record::single(read(b"ACGT"))), Dest::None);

        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::Untrimmed);
        assert_eq!(filters.classify(&Record::single(read(b"ACGT"))), Dest::Untrimmed);
    }

    #[test]
    fn merged_filter() {
        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::Merged);
        let mut merged = read(b"ACGT");
        merged.merged = true;
        assert_eq!(filters.classify(&Record::single(merged)), Dest::Merged);
    }
}
