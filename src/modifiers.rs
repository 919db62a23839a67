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

//! Per-read modifiers and the chain that threads records through them.

use regex::bytes::Regex;

use crate::adapters::Adapter;
use crate::align::{
    span_better, AlignSpan, Aligner, START_WITHIN_SEQ2, STOP_WITHIN_SEQ1, STOP_WITHIN_SEQ2,
};
use crate::insert::InsertAligner;
use crate::matches::Match;
use crate::record::{Record, SeqRead};
use crate::util::{mean_quality, reverse_complement, RandomMatchProbability};
use crate::{Error, Result};

/// Which side(s) of a pair a modifier is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
    Both,
}

impl Side {
    fn covers_first(self) -> bool {
        self != Side::Second
    }

    fn covers_second(self) -> bool {
        self != Side::First
    }
}

/// What an adaptor cutter does with a matched region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Trim,
    Mask,
}

/// Configurable trimming stages; the remaining modifiers run in a fixed
/// order after these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOp {
    OverwriteLowQuality,
    AdapterCut,
    UnconditionalCut,
    TwoColorQualityTrim,
    QualityTrim,
}

impl TrimOp {
    /// Parse an operation-order string such as "WCGQA".
    pub fn parse_order(order: &str) -> Result<Vec<TrimOp>> {
        order
            .chars()
            .map(|c| match c {
                'W' => Ok(TrimOp::OverwriteLowQuality),
                'A' => Ok(TrimOp::AdapterCut),
                'C' => Ok(TrimOp::UnconditionalCut),
                'G' => Ok(TrimOp::TwoColorQualityTrim),
                'Q' => Ok(TrimOp::QualityTrim),
                other => Err(Error::Config(format!(
                    "unknown trimming operation: {other}"
                ))),
            })
            .collect()
    }
}

/// Cuts the best-matching adaptor out of a read, up to `times` rounds.
#[derive(Debug, Clone)]
pub struct AdapterCutter {
    adapters: Vec<Adapter>,
    times: usize,
    action: Action,
}

impl AdapterCutter {
    pub fn new(adapters: Vec<Adapter>, times: usize, action: Action) -> Self {
        AdapterCutter { adapters, times: times.max(1), action }
    }

    fn best_match(&mut self, sequence: &[u8]) -> Option<(usize, AlignSpan)> {
        let mut best: Option<(usize, AlignSpan)> = None;
        for (i, adapter) in self.adapters.iter_mut().enumerate() {
            if let Some(span) = adapter.match_to(sequence) {
                match &best {
                    Some((_, b)) if !span_better(&span, b) => {}
                    _ => best = Some((i, span)),
                }
            }
        }
        best
    }

    pub fn apply(&mut self, mut read: SeqRead) -> (SeqRead, usize) {
        let untouched = (self.action == Action::Mask).then(|| {
            (
                read.sequence.clone(),
                read.qualities.clone(),
                read.clipped_front,
                read.clipped_back,
            )
        });
        let mut removed_total = 0;
        let mut info = None;
        for _ in 0..self.times {
            let Some((idx, span)) = self.best_match(&read.sequence) else {
                break;
            };
            let front = {
                let adapter = &self.adapters[idx];
                let m = Match::new(
                    span.refstart,
                    span.refstop,
                    span.querystart,
                    span.querystop,
                    span.matches,
                    span.errors,
                    adapter.location.front_hint(),
                    adapter,
                    &read,
                );
                info = Some(m.info_record());
                m.front
            };
            let removed = if front {
                read.trim_to(span.querystop, read.len())
            } else {
                read.trim_to(0, span.querystart)
            };
            removed_total += removed;
            if removed == 0 {
                break;
            }
        }
        if let Some(info) = info {
            read.match_info = Some(info);
        }
        if removed_total > 0 {
            if let Some((mut sequence, qualities, clipped_front, clipped_back)) = untouched
            {
                // Restore the original bases with the cut ends masked out.
                let masked_front = read.clipped_front - clipped_front;
                let masked_back = read.clipped_back - clipped_back;
                let len = sequence.len();
                sequence[..masked_front].fill(b'N');
                sequence[len - masked_back..].fill(b'N');
                read.sequence = sequence;
                read.qualities = qualities;
                read.clipped_front = clipped_front;
                read.clipped_back = clipped_back;
                return (read, 0);
            }
        }
        (read, removed_total)
    }
}

/// Trims 3' adaptors from both mates at once using the insert overlap.
#[derive(Debug, Clone)]
pub struct InsertAdapterCutter {
    aligner: InsertAligner,
    adapter1: Adapter,
    adapter2: Adapter,
    action: Action,
}

impl InsertAdapterCutter {
    pub fn new(
        adapter1: Adapter,
        adapter2: Adapter,
        action: Action,
        rmp: RandomMatchProbability,
    ) -> Self {
        let aligner = InsertAligner::new(&adapter1.sequence, &adapter2.sequence, rmp);
        InsertAdapterCutter { aligner, adapter1, adapter2, action }
    }

    pub fn aligner_mut(&mut self) -> &mut InsertAligner {
        &mut self.aligner
    }

    fn cut(read: &mut SeqRead, adapter: &Adapter, span: AlignSpan, action: Action) -> usize {
        let info = {
            let m = Match::new(
                span.refstart,
                span.refstop,
                span.querystart,
                span.querystop,
                span.matches,
                span.errors,
                Some(false),
                adapter,
                read,
            );
            m.info_record()
        };
        read.match_info = Some(info);
        match action {
            Action::Trim => read.trim_to(0, span.querystart),
            Action::Mask => {
                read.sequence[span.querystart..].fill(b'N');
                0
            }
        }
    }

    pub fn apply_pair(
        &mut self,
        mut r1: SeqRead,
        mut r2: SeqRead,
    ) -> (SeqRead, Option<SeqRead>, usize, usize) {
        let result = self.aligner.match_insert(&r1.sequence, &r2.sequence);
        let (mut removed1, mut removed2) = (0, 0);
        if let (Some(s1), Some(s2)) = (result.adapter1, result.adapter2) {
            removed1 = Self::cut(&mut r1, &self.adapter1, s1, self.action);
            removed2 = Self::cut(&mut r2, &self.adapter2, s2, self.action);
        }
        (r1, Some(r2), removed1, removed2)
    }
}

/// Removes fixed-length pieces from the ends; positive lengths count from
/// the 5' end, negative from the 3' end.
#[derive(Debug, Clone)]
pub struct UnconditionalCutter {
    pub lengths: Vec<i64>,
}

impl UnconditionalCutter {
    pub fn new(lengths: Vec<i64>) -> Self {
        UnconditionalCutter { lengths }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let mut removed = 0;
        for &length in &self.lengths {
            let len = read.len();
            removed += if length >= 0 {
                read.trim_to((length as usize).min(len), len)
            } else {
                read.trim_to(0, len.saturating_sub(length.unsigned_abs() as usize))
            };
        }
        (read, removed)
    }
}

/// Like [`UnconditionalCutter`], but bases already clipped from an end by
/// earlier stages count toward the guarantee.
#[derive(Debug, Clone)]
pub struct MinCutter {
    pub lengths: Vec<i64>,
}

impl MinCutter {
    pub fn new(lengths: Vec<i64>) -> Self {
        MinCutter { lengths }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let mut removed = 0;
        for &length in &self.lengths {
            let len = read.len();
            removed += if length >= 0 {
                let need = (length as usize).saturating_sub(read.clipped_front);
                read.trim_to(need.min(len), len)
            } else {
                let need =
                    (length.unsigned_abs() as usize).saturating_sub(read.clipped_back);
                read.trim_to(0, len.saturating_sub(need))
            };
        }
        (read, removed)
    }
}

/// Quality trimming with the partial-sum walk used by cutadapt: from each
/// end, accumulate (cutoff - quality) and cut at the maximum.
#[derive(Debug, Clone)]
pub struct QualityTrimmer {
    pub cutoff_front: u8,
    pub cutoff_back: u8,
    pub base: u8,
}

impl QualityTrimmer {
    pub fn new(cutoff_front: u8, cutoff_back: u8, base: u8) -> Self {
        QualityTrimmer { cutoff_front, cutoff_back, base }
    }

    fn trim_index(&self, qual: &[u8]) -> (usize, usize) {
        let n = qual.len();

        // find trim position for the 5' end
        let mut start = 0usize;
        let mut s = 0i32;
        let mut max_qual = 0i32;
        if self.cutoff_front > 0 {
            let cutoff = self.cutoff_front as i32 + self.base as i32;
            for (i, &q) in qual.iter().enumerate() {
                s += cutoff - q as i32;
                if s < 0 {
                    break;
                }
                if s > max_qual {
                    max_qual = s;
                    start = i + 1;
                }
            }
        }
        // same for the 3' end
        let mut stop = n;
        s = 0;
        max_qual = 0;
        if self.cutoff_back > 0 {
            let cutoff = self.cutoff_back as i32 + self.base as i32;
            for i in (0..n).rev() {
                s += cutoff - qual[i] as i32;
                if s < 0 {
                    break;
                }
                if s > max_qual {
                    max_qual = s;
                    stop = i;
                }
            }
        }
        if start >= stop {
            (0, 0)
        } else {
            (start, stop)
        }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let Some(qual) = read.qualities.as_deref() else {
            return (read, 0);
        };
        let (start, stop) = self.trim_index(qual);
        let removed = read.trim_to(start, stop);
        (read, removed)
    }
}

/// 3' quality trimming for two-color chemistry, where a dark cycle reads as
/// a high-confidence G: G bases are pinned just below the cutoff.
#[derive(Debug, Clone)]
pub struct TwoColorQualityTrimmer {
    pub cutoff: u8,
    pub base: u8,
}

impl TwoColorQualityTrimmer {
    pub fn new(cutoff: u8, base: u8) -> Self {
        TwoColorQualityTrimmer { cutoff, base }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let Some(qual) = read.qualities.as_deref() else {
            return (read, 0);
        };
        let cutoff = self.cutoff as i32;
        let mut stop = read.len();
        let mut s = 0i32;
        let mut max_qual = 0i32;
        for i in (0..read.len()).rev() {
            let q = if read.sequence[i] == b'G' {
                cutoff - 1
            } else {
                qual[i] as i32 - self.base as i32
            };
            s += cutoff - q;
            if s < 0 {
                break;
            }
            if s > max_qual {
                max_qual = s;
                stop = i;
            }
        }
        let removed = read.trim_to(0, stop);
        (read, removed)
    }
}

/// Trims runs of N from both ends.
#[derive(Debug, Clone, Default)]
pub struct NEndTrimmer;

impl NEndTrimmer {
    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let start = read
            .sequence
            .iter()
            .position(|&b| b != b'N')
            .unwrap_or(0);
        let stop = read
            .sequence
            .iter()
            .rposition(|&b| b != b'N')
            .map_or(0, |p| p + 1);
        let removed = read.trim_to(start, stop);
        (read, removed)
    }
}

/// Rewrites a `length=` style token in the read name to the current read
/// length.
#[derive(Debug, Clone)]
pub struct LengthTagModifier {
    tag: Vec<u8>,
    pattern: Regex,
}

impl LengthTagModifier {
    pub fn new(length_tag: &str) -> Result<Self> {
        let pattern = Regex::new(&format!("{}[0-9]*", regex::escape(length_tag)))
            .map_err(|e| Error::Config(format!("bad length tag: {e}")))?;
        Ok(LengthTagModifier { tag: length_tag.as_bytes().to_vec(), pattern })
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let mut replacement = self.tag.clone();
        replacement.extend_from_slice(read.len().to_string().as_bytes());
        read.name = self
            .pattern
            .replace(&read.name, replacement.as_slice())
            .into_owned();
        (read, 0)
    }
}

/// Removes any of the given suffixes from the read name.
#[derive(Debug, Clone)]
pub struct SuffixRemover {
    pub suffixes: Vec<Vec<u8>>,
}

impl SuffixRemover {
    pub fn new(suffixes: Vec<Vec<u8>>) -> Self {
        SuffixRemover { suffixes }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        for suffix in &self.suffixes {
            if read.name.ends_with(suffix) {
                let keep = read.name.len() - suffix.len();
                read.name.truncate(keep);
            }
        }
        (read, 0)
    }
}

/// Adds a prefix and/or suffix to the read name.
#[derive(Debug, Clone, Default)]
pub struct PrefixSuffixAdder {
    pub prefix: Vec<u8>,
    pub suffix: Vec<u8>,
}

impl PrefixSuffixAdder {
    pub fn new(prefix: &[u8], suffix: &[u8]) -> Self {
        PrefixSuffixAdder { prefix: prefix.to_vec(), suffix: suffix.to_vec() }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        let mut name = self.prefix.clone();
        name.extend_from_slice(&read.name);
        name.extend_from_slice(&self.suffix);
        read.name = name;
        (read, 0)
    }
}

/// Caps quality scores from below so none encode negative values.
#[derive(Debug, Clone)]
pub struct ZeroCapper {
    pub base: u8,
}

impl ZeroCapper {
    pub fn new(base: u8) -> Self {
        ZeroCapper { base }
    }

    pub fn apply(&self, mut read: SeqRead) -> (SeqRead, usize) {
        if let Some(qual) = read.qualities.as_mut() {
            for q in qual.iter_mut() {
                *q = (*q).max(self.base);
            }
        }
        (read, 0)
    }
}

/// Replaces a low-quality read with the reverse complement of its
/// high-quality mate. Mates read opposite strands of the same insert, so
/// the replacement is re-oriented.
#[derive(Debug, Clone)]
pub struct OverwriteRead {
    pub worse_read_min_quality: f64,
    pub better_read_min_quality: f64,
    pub window_size: usize,
    pub base: u8,
}

impl OverwriteRead {
    pub fn new(
        worse_read_min_quality: f64,
        better_read_min_quality: f64,
        window_size: usize,
        base: u8,
    ) -> Self {
        OverwriteRead { worse_read_min_quality, better_read_min_quality, window_size, base }
    }

    fn overwrite(src: &SeqRead, dst: &mut SeqRead) {
        dst.sequence = reverse_complement(&src.sequence);
        dst.qualities =
            src.qualities.as_ref().map(|q| q.iter().rev().copied().collect());
    }

    pub fn apply_pair(
        &mut self,
        mut r1: SeqRead,
        mut r2: SeqRead,
    ) -> (SeqRead, Option<SeqRead>, usize, usize) {
        if let (Some(q1), Some(q2)) = (r1.qualities.as_deref(), r2.qualities.as_deref()) {
            let mean1 = mean_quality(q1, self.window_size, self.base);
            let mean2 = mean_quality(q2, self.window_size, self.base);
            if mean1 < self.worse_read_min_quality && mean2 >= self.better_read_min_quality
            {
                Self::overwrite(&r2, &mut r1);
            } else if mean2 < self.worse_read_min_quality
                && mean1 >= self.better_read_min_quality
            {
                Self::overwrite(&r1, &mut r2);
            }
        }
        (r1, Some(r2), 0, 0)
    }
}

/// Collapses a fully overlapping pair into one read; the merged read keeps
/// read 1's bases over the overlap and extends with read 2's unseen tail.
#[derive(Debug, Clone)]
pub struct MergeOverlapping {
    pub min_overlap: usize,
    pub error_rate: f64,
}

impl MergeOverlapping {
    pub fn new(min_overlap: usize, error_rate: f64) -> Self {
        MergeOverlapping { min_overlap, error_rate }
    }

    pub fn apply_pair(
        &mut self,
        mut r1: SeqRead,
        r2: SeqRead,
    ) -> (SeqRead, Option<SeqRead>, usize, usize) {
        let r2_rc = reverse_complement(&r2.sequence);
        let mut aligner = Aligner::new(
            &r2_rc,
            self.error_rate,
            START_WITHIN_SEQ2 | STOP_WITHIN_SEQ1 | STOP_WITHIN_SEQ2,
            false,
            false,
        );
        aligner.min_overlap = self.min_overlap;
        aligner.indel_cost = 100_000;
        let Some(span) = aligner.locate(&r1.sequence) else {
            return (r1, Some(r2), 0, 0);
        };
        if span.querystop == r1.len() && span.refstop < r2_rc.len() {
            // Mate extends past the end of read 1. Position p of the
            // reverse complement reads mate base len-1-p, so its qualities
            // are the reversed mate qualities from refstop on.
            r1.sequence.extend_from_slice(&r2_rc[span.refstop..]);
            if let (Some(q1), Some(q2)) = (r1.qualities.as_mut(), r2.qualities.as_ref()) {
                q1.extend(q2.iter().rev().skip(span.refstop).copied());
            }
        }
        r1.merged = true;
        (r1, None, 0, 0)
    }
}

#[derive(Debug, Clone)]
pub enum SingleOp {
    AdapterCut(AdapterCutter),
    Cut(UnconditionalCutter),
    MinCut(MinCutter),
    Quality(QualityTrimmer),
    TwoColor(TwoColorQualityTrimmer),
    NEnd(NEndTrimmer),
    LengthTag(LengthTagModifier),
    StripSuffix(SuffixRemover),
    AddFix(PrefixSuffixAdder),
    ZeroCap(ZeroCapper),
}

impl SingleOp {
    fn apply(&mut self, read: SeqRead) -> (SeqRead, usize) {
        match self {
            SingleOp::AdapterCut(m) => m.apply(read),
            SingleOp::Cut(m) => m.apply(read),
            SingleOp::MinCut(m) => m.apply(read),
            SingleOp::Quality(m) => m.apply(read),
            SingleOp::TwoColor(m) => m.apply(read),
            SingleOp::NEnd(m) => m.apply(read),
            SingleOp::LengthTag(m) => m.apply(read),
            SingleOp::StripSuffix(m) => m.apply(read),
            SingleOp::AddFix(m) => m.apply(read),
            SingleOp::ZeroCap(m) => m.apply(read),
        }
    }
}

macro_rules! impl_into_single_op {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for SingleOp {
            fn from(m: $ty) -> Self {
                SingleOp::$variant(m)
            }
        })*
    };
}

impl_into_single_op!(
    AdapterCutter => AdapterCut,
    UnconditionalCutter => Cut,
    MinCutter => MinCut,
    QualityTrimmer => Quality,
    TwoColorQualityTrimmer => TwoColor,
    NEndTrimmer => NEnd,
    LengthTagModifier => LengthTag,
    SuffixRemover => StripSuffix,
    PrefixSuffixAdder => AddFix,
    ZeroCapper => ZeroCap,
);

#[derive(Debug, Clone)]
pub enum PairOp {
    Overwrite(OverwriteRead),
    InsertCut(InsertAdapterCutter),
    Merge(MergeOverlapping),
}

impl PairOp {
    fn apply_pair(
        &mut self,
        r1: SeqRead,
        r2: SeqRead,
    ) -> (SeqRead, Option<SeqRead>, usize, usize) {
        match self {
            PairOp::Overwrite(m) => m.apply_pair(r1, r2),
            PairOp::InsertCut(m) => m.apply_pair(r1, r2),
            PairOp::Merge(m) => m.apply_pair(r1, r2),
        }
    }
}

impl From<OverwriteRead> for PairOp {
    fn from(m: OverwriteRead) -> Self {
        PairOp::Overwrite(m)
    }
}

impl From<InsertAdapterCutter> for PairOp {
    fn from(m: InsertAdapterCutter) -> Self {
        PairOp::InsertCut(m)
    }
}

impl From<MergeOverlapping> for PairOp {
    fn from(m: MergeOverlapping) -> Self {
        PairOp::Merge(m)
    }
}

#[derive(Debug, Clone)]
enum ChainLink {
    Single { side: Side, op: SingleOp },
    Paired(PairOp),
}

/// Ordered, paired-aware chain of modifiers. Registration order is
/// application order.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    paired: bool,
    chain: Vec<ChainLink>,
}

impl Modifiers {
    pub fn new(paired: bool) -> Self {
        Modifiers { paired, chain: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Register one modifier instance for the given side(s).
    pub fn add_single<M: Into<SingleOp>>(&mut self, side: Side, modifier: M) {
        let side = if self.paired { side } else { Side::First };
        self.chain.push(ChainLink::Single { side, op: modifier.into() });
    }

    /// Register up to one independently configured modifier per side,
    /// skipping sides whose configuration is absent.
    pub fn add_single_pair<M: Into<SingleOp>>(&mut self, m1: Option<M>, m2: Option<M>) {
        if let Some(m) = m1 {
            self.add_single(Side::First, m);
        }
        if let Some(m) = m2 {
            self.add_single(Side::Second, m);
        }
    }

    /// Register a modifier that sees both mates at once. Only meaningful
    /// for paired input.
    pub fn add_paired<P: Into<PairOp>>(&mut self, modifier: P) -> Result<()> {
        if !self.paired {
            return Err(Error::Config(
                "paired-read modifier requires paired-end input".to_string(),
            ));
        }
        self.chain.push(ChainLink::Paired(modifier.into()));
        Ok(())
    }

    /// Thread a record through every modifier in registration order.
    /// Returns the modified record and the per-side input lengths.
    pub fn modify(&mut self, record: Record) -> (Record, (u64, u64)) {
        let bp = (
            record.r1.len() as u64,
            record.r2.as_ref().map_or(0, |r| r.len() as u64),
        );
        let Record { mut r1, mut r2 } = record;
        for link in &mut self.chain {
            match link {
                ChainLink::Single { side, op } => {
                    if side.covers_first() {
                        r1 = op.apply(r1).0;
                    }
                    if side.covers_second() {
                        if let Some(read) = r2.take() {
                            r2 = Some(op.apply(read).0);
                        }
                    }
                }
                ChainLink::Paired(op) => {
                    if let Some(read) = r2.take() {
                        let (a, b, _, _) = op.apply_pair(r1, read);
                        r1 = a;
                        r2 = b;
                    }
                }
            }
        }
        (Record { r1, r2 }, bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Where;

    fn read(seq: &[u8], qual: Option<&[u8]>) -> SeqRead {
        SeqRead::new(b"read1", seq, qual)
    }

    fn back_adapter() -> Adapter {
        Adapter::new("a1", b"AGATCGGAAGA", Where::Back)
    }

    #[test]
    fn adapter_cutter_trims_back() {
        let mut cutter = AdapterCutter::new(vec![back_adapter()], 1, Action::Trim);
        let (out, removed) = cutter.apply(read(b"ACGTACGTAAAAGATCGGAAGA", None));
        assert_eq!(out.sequence, b"ACGTACGTAAA");
        assert_eq!(removed, 11);
        let info = out.match_info.unwrap();
        assert_eq!(info.seq_adapter, b"AGATCGGAAGA");
        assert!(!info.is_front);
    }

    #[test]
    fn adapter_cutter_mask_keeps_length() {
        let mut cutter = AdapterCutter::new(vec![back_adapter()], 1, Action::Mask);
        let (out, removed) = cutter.apply(read(b"ACGTACGTAAAAGATCGGAAGA", None));
        assert_eq!(removed, 0);
        assert_eq!(out.sequence, b"ACGTACGTAAANNNNNNNNNNN");
        assert!(out.match_info.is_some());
    }

    #[test]
    fn adapter_cutter_runs_multiple_times() {
        let adapter = Adapter::new("a1", b"AGATCGGAAGA", Where::Front);
        let mut cutter = AdapterCutter::new(vec![adapter.clone()], 2, Action::Trim);
        let tandem = b"AGATCGGAAGAAGATCGGAAGACGTACGT";
        let (out, _) = cutter.apply(read(tandem, None));
        assert_eq!(out.sequence, b"CGTACGT");

        let mut once = AdapterCutter::new(vec![adapter], 1, Action::Trim);
        let (out, _) = once.apply(read(tandem, None));
        assert_eq!(out.sequence, b"AGATCGGAAGACGTACGT");
    }

    #[test]
    fn unmatched_read_is_untouched() {
        let mut cutter = AdapterCutter::new(vec![back_adapter()], 1, Action::Trim);
        let (out, removed) = cutter.apply(read(b"ACGTACGTACGTACGT", None));
        assert_eq!(removed, 0);
        assert!(out.match_info.is_none());
    }

    #[test]
    fn unconditional_cut_both_ends() {
        let cutter = UnconditionalCutter::new(vec![2, -3]);
        let (out, removed) = cutter.apply(read(b"AACGTACGTTT", None));
        assert_eq!(out.sequence, b"CGTACG");
        assert_eq!(removed, 5);
    }

    #[test]
    fn min_cut_counts_prior_clips() {
        let cutter = MinCutter::new(vec![4]);
        let mut r = read(b"ACGTACGT", None);
        r.trim_to(3, 8);
        let (out, removed) = cutter.apply(r);
        // Three bases already gone from the front, so only one more.
        assert_eq!(removed, 1);
        assert_eq!(out.sequence, b"ACGT");
    }

    #[test]
    fn quality_trim_cuts_low_quality_tail() {
        let trimmer = QualityTrimmer::new(0, 20, 33);
        // Qualities 40,40,40,40,10,10 with base 33.
        let qual: Vec<u8> = [40, 40, 40, 40, 10, 10].iter().map(|q| q + 33).collect();
        let (out, removed) = trimmer.apply(read(b"ACGTAC", Some(&qual)));
        assert_eq!(out.sequence, b"ACGT");
        assert_eq!(removed, 2);
    }

    #[test]
    fn quality_trim_drops_fully_bad_read() {
        let trimmer = QualityTrimmer::new(20, 20, 33);
        let qual: Vec<u8> = vec![2 + 33; 6];
        let (out, _) = trimmer.apply(read(b"ACGTAC", Some(&qual)));
        assert!(out.is_empty());
    }

    #[test]
    fn two_color_trim_treats_g_as_dark() {
        let trimmer = TwoColorQualityTrimmer::new(20, 33);
        // High-quality run of G at the 3' end is an artifact, not signal.
        let qual: Vec<u8> = vec![40 + 33; 8];
        let (out, removed) = trimmer.apply(read(b"ACGTGGGG", Some(&qual)));
        assert_eq!(out.sequence, b"ACGT");
        assert_eq!(removed, 4);
    }

    #[test]
    fn n_end_trimmer() {
        let t = NEndTrimmer;
        let (out, removed) = t.apply(read(b"NNACGTNN", None));
        assert_eq!(out.sequence, b"ACGT");
        assert_eq!(removed, 4);

        let (out, _) = t.apply(read(b"NNNN", None));
        assert!(out.is_empty());
    }

    #[test]
    fn length_tag_is_rewritten() {
        let m = LengthTagModifier::new("length=").unwrap();
        let mut r = read(b"ACGTAC", None);
        r.name = b"read1 length=100".to_vec();
        let (out, _) = m.apply(r);
        assert_eq!(out.name, b"read1 length=6");
    }

    #[test]
    fn suffix_removed_and_fixes_added() {
        let strip = SuffixRemover::new(vec![b"/1".to_vec()]);
        let mut r = read(b"ACGT", None);
        r.name = b"read1/1".to_vec();
        let (r, _) = strip.apply(r);
        assert_eq!(r.name, b"read1");

        let add = PrefixSuffixAdder::new(b"pre_", b"_post");
        let (r, _) = add.apply(r);
        assert_eq!(r.name, b"pre_read1_post");
    }

    #[test]
    fn zero_capper_floors_qualities() {
        let cap = ZeroCapper::new(33);
        let (out, _) = cap.apply(read(b"ACGT", Some(&[20, 33, 40, 50])));
        assert_eq!(out.qualities.unwrap(), vec![33, 33, 40, 50]);
    }

    #[test]
    fn overwrite_replaces_bad_mate() {
        let mut ow = OverwriteRead::new(10.0, 30.0, 4, 33);
        let good_qual = vec![40 + 33; 8];
        let bad_qual = vec![2 + 33; 8];
        let r1 = read(b"ACGTACGT", Some(&bad_qual));
        let r2 = read(b"TTTTAAAA", Some(&good_qual));
        let (r1, r2, _, _) = ow.apply_pair(r1, r2);
        assert_eq!(r1.sequence, reverse_complement(b"TTTTAAAA"));
        assert_eq!(r2.unwrap().sequence, b"TTTTAAAA");
    }

    #[test]
    fn overwrite_leaves_balanced_pairs_alone() {
        let mut ow = OverwriteRead::new(10.0, 30.0, 4, 33);
        let qual = vec![40 + 33; 8];
        let (r1, _, _, _) =
            ow.apply_pair(read(b"ACGTACGT", Some(&qual)), read(b"TTTTAAAA", Some(&qual)));
        assert_eq!(r1.sequence, b"ACGTACGT");
    }

    #[test]
    fn merge_collapses_full_overlap() {
        let insert = b"ACGATTTTGGGGCCCCAT";
        let r1 = read(insert, None);
        let r2 = read(&reverse_complement(insert), None);
        let mut merge = MergeOverlapping::new(10, 0.1);
        let (merged, r2, _, _) = merge.apply_pair(r1, r2);
        assert!(merged.merged);
        assert!(r2.is_none());
        assert_eq!(merged.sequence, insert);
    }

    #[test]
    fn insert_cutter_trims_both_mates() {
        let insert = b"AAAATTTTCCCCGGGG";
        let mut seq1 = insert.to_vec();
        seq1.extend_from_slice(b"AGATCGGAA");
        let mut seq2 = reverse_complement(insert);
        seq2.extend_from_slice(b"AGATCGGAA");
        let mut cutter = InsertAdapterCutter::new(
            back_adapter(),
            back_adapter(),
            Action::Trim,
            RandomMatchProbability::new(),
        );
        let (r1, r2, removed1, removed2) =
            cutter.apply_pair(read(&seq1, None), read(&seq2, None));
        assert_eq!(r1.sequence, insert);
        assert_eq!(r2.as_ref().unwrap().sequence, reverse_complement(insert));
        assert_eq!(removed1, 9);
        assert_eq!(removed2, 9);
        assert!(r1.match_info.is_some());
    }

    #[test]
    fn chain_applies_in_registration_order() {
        let mut modifiers = Modifiers::new(false);
        modifiers.add_single(Side::Both, UnconditionalCutter::new(vec![2]));
        modifiers.add_single(
            Side::Both,
            AdapterCutter::new(vec![back_adapter()], 1, Action::Trim),
        );
        let record = Record::single(read(b"TTACGTACGTAAAAGATCGGAAGA", None));
        let (out, bp) = modifiers.modify(record);
        assert_eq!(out.r1.sequence, b"ACGTACGTAAA");
        assert_eq!(bp, (24, 0));
    }

    #[test]
    fn chain_respects_sides() {
        let mut modifiers = Modifiers::new(true);
        modifiers
            .add_single_pair(Some(UnconditionalCutter::new(vec![1])), None::<UnconditionalCutter>);
        let record = Record::pair(read(b"AAAA", None), read(b"CCCC", None));
        let (out, bp) = modifiers.modify(record);
        assert_eq!(out.r1.sequence, b"AAA");
        assert_eq!(out.r2.unwrap().sequence, b"CCCC");
        assert_eq!(bp, (4, 4));
    }

    #[test]
    fn pair_modifier_rejected_for_single_end() {
        let mut modifiers = Modifiers::new(false);
        let err = modifiers.add_paired(OverwriteRead::new(10.0, 30.0, 4, 33));
        assert!(err.is_err());
    }
}
