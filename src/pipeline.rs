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

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::filters::{Dest, Filters};
use crate::format::{Formatters, ResultMap, WriteMap};
use crate::modifiers::Modifiers;
use crate::record::Record;
use crate::seqio::{BatchReader, Writers};
use crate::{Error, Result};

/// Read tallies taken around each record by the statistics-gathering
/// pipeline variant. Purely observational.
#[derive(Debug, Clone, Default)]
pub struct ReadStatistics {
    pub pre_records: u64,
    pub pre_bp1: u64,
    pub pre_bp2: u64,
    pub post_records: BTreeMap<Dest, u64>,
    pub post_bp1: u64,
    pub post_bp2: u64,
}

impl ReadStatistics {
    fn pre_trim(&mut self, record: &Record) {
        self.pre_records += 1;
        self.pre_bp1 += record.r1.len() as u64;
        self.pre_bp2 += record.r2.as_ref().map_or(0, |r| r.len() as u64);
    }

    fn post_trim(&mut self, dest: Dest, record: &Record) {
        *self.post_records.entry(dest).or_insert(0) += 1;
        self.post_bp1 += record.r1.len() as u64;
        self.post_bp2 += record.r2.as_ref().map_or(0, |r| r.len() as u64);
    }
}

/// Trimming pipeline: the modifier chain followed by the filter chain.
/// Cloning gives a worker its own counters while the (immutable)
/// configuration is shared.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub modifiers: Modifiers,
    pub filters: Filters,
    pub total_bp1: u64,
    pub total_bp2: u64,
    stats: Option<ReadStatistics>,
}

impl Pipeline {
    pub fn new(modifiers: Modifiers, filters: Filters) -> Self {
        Pipeline { modifiers, filters, total_bp1: 0, total_bp2: 0, stats: None }
    }

    /// Variant that additionally tallies reads before and after trimming.
    pub fn with_read_stats(modifiers: Modifiers, filters: Filters) -> Self {
        Pipeline { stats: Some(ReadStatistics::default()), ..Pipeline::new(modifiers, filters) }
    }

    pub fn read_stats(&self) -> Option<&ReadStatistics> {
        self.stats.as_ref()
    }

    /// Modify the record, account for the bases seen, classify the result.
    pub fn process(&mut self, record: Record) -> (Dest, Record) {
        if let Some(stats) = self.stats.as_mut() {
            stats.pre_trim(&record);
        }
        let (record, bp) = self.modifiers.modify(record);
        self.total_bp1 += bp.0;
        self.total_bp2 += bp.1;
        let dest = self.filters.classify(&record);
        if let Some(stats) = self.stats.as_mut() {
            stats.post_trim(dest, &record);
        }
        (dest, record)
    }
}

/// What one worker did, reported once when it exits. A worker that died
/// mid-run reports `failed` and the main thread turns that into an error.
#[derive(Debug, Clone, Default)]
pub struct WorkerSummary {
    pub index: usize,
    pub seen_batches: BTreeSet<usize>,
    pub records: u64,
    pub total_bp1: u64,
    pub total_bp2: u64,
    pub destinations: BTreeMap<Dest, u64>,
    pub failed: bool,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub mode: &'static str,
    pub threads: usize,
    pub batches: usize,
    pub records: u64,
    pub total_bp1: u64,
    pub total_bp2: u64,
    pub destinations: BTreeMap<Dest, u64>,
}

impl Summary {
    pub fn fold(&mut self, worker: &WorkerSummary) {
        self.records += worker.records;
        self.total_bp1 += worker.total_bp1;
        self.total_bp2 += worker.total_bp2;
        for (dest, count) in &worker.destinations {
            *self.destinations.entry(*dest).or_insert(0) += count;
        }
    }
}

pub(crate) fn interrupted(flag: Option<&AtomicBool>) -> bool {
    flag.map_or(false, |f| f.load(Ordering::Relaxed))
}

pub(crate) fn join_chunks(result: ResultMap) -> WriteMap {
    result
        .into_iter()
        .map(|(path, chunks)| (path, chunks.concat()))
        .collect()
}

/// Run the whole pipeline on the current thread. Produces the same output
/// bytes as the order-preserving parallel runner.
pub fn run_serial<R: BatchReader>(
    reader: &mut R,
    pipeline: &mut Pipeline,
    formatters: &Formatters,
    writers: &mut Writers,
    interrupt: Option<&AtomicBool>,
) -> Result<Summary> {
    let mut summary = Summary { mode: "serial", threads: 1, ..Summary::default() };
    let outcome = (|| -> Result<()> {
        while let Some(batch) = reader.next_batch()? {
            if interrupted(interrupt) {
                return Err(Error::Interrupted);
            }
            summary.batches += 1;
            let mut result = ResultMap::new();
            for record in batch {
                let (dest, record) = pipeline.process(record);
                summary.records += 1;
                *summary.destinations.entry(dest).or_insert(0) += 1;
                formatters.format(&mut result, dest, &record);
            }
            writers.write_result(&join_chunks(result), false)?;
        }
        Ok(())
    })();
    let closed_reader = reader.close();
    let closed_writers = writers.close();
    outcome?;
    closed_reader?;
    closed_writers?;
    summary.total_bp1 = pipeline.total_bp1;
    summary.total_bp2 = pipeline.total_bp2;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, Where};
    use crate::filters::FilterKind;
    use crate::modifiers::{Action, AdapterCutter, Side};
    use crate::record::SeqRead;
    use crate::seqio::MemoryReader;

    fn pipeline() -> Pipeline {
        let mut modifiers = Modifiers::new(false);
        modifiers.add_single(
            Side::Both,
            AdapterCutter::new(
                vec![Adapter::new("a1", b"AGATCGGAAGA", Where::Back)],
                1,
                Action::Trim,
            ),
        );
        let mut filters = Filters::new(1);
        filters.add_filter(FilterKind::TooShort(5));
        Pipeline::new(modifiers, filters)
    }

    #[test]
    fn process_trims_and_classifies() {
        let mut p = pipeline();
        let record =
            Record::single(SeqRead::new(b"r1", b"ACGTACGTAAAAGATCGGAAGA", None));
        let (dest, out) = p.process(record);
        assert_eq!(dest, Dest::None);
        assert_eq!(out.r1.sequence, b"ACGTACGTAAA");
        assert_eq!(p.total_bp1, 22);

        let record = Record::single(SeqRead::new(b"r2", b"ACGAGATCGGAAGA", None));
        let (dest, out) = p.process(record);
        assert_eq!(dest, Dest::TooShort);
        assert_eq!(out.r1.sequence, b"ACG");
    }

    #[test]
    fn serial_run_writes_per_destination() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.fasta");
        let short = dir.path().join("short.fasta");

        let mut formatters = Formatters::new(false);
        formatters.add_seq_formatter(Dest::None, out.clone(), None);
        formatters.add_seq_formatter(Dest::TooShort, short.clone(), None);

        let mut reader = MemoryReader::new(vec![
            vec![Record::single(SeqRead::new(b"r1", b"ACGTACGTAAAAGATCGGAAGA", None))],
            vec![Record::single(SeqRead::new(b"r2", b"ACGAGATCGGAAGA", None))],
        ]);
        let mut writers = Writers::new();
        let mut p = pipeline();
        let summary =
            run_serial(&mut reader, &mut p, &formatters, &mut writers, None).unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.mode, "serial");
        assert_eq!(summary.destinations[&Dest::None], 1);
        assert_eq!(summary.destinations[&Dest::TooShort], 1);
        assert_eq!(summary.total_bp1, 36);

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, ">r1\nACGTACGTAAA\n");
        let text = std::fs::read_to_string(&short).unwrap();
        assert_eq!(text, ">r2\nACG\n");
    }

    #[test]
    fn read_stats_observe_without_interfering() {
        let mut plain = pipeline();
        let mut with_stats =
            Pipeline::with_read_stats(plain.modifiers.clone(), plain.filters.clone());
        let record =
            Record::single(SeqRead::new(b"r1", b"ACGTACGTAAAAGATCGGAAGA", None));
        let (dest_a, out_a) = plain.process(record.clone());
        let (dest_b, out_b) = with_stats.process(record);
        assert_eq!(dest_a, dest_b);
        assert_eq!(out_a, out_b);

        let stats = with_stats.read_stats().unwrap();
        assert_eq!(stats.pre_records, 1);
        assert_eq!(stats.pre_bp1, 22);
        assert_eq!(stats.post_bp1, 11);
        assert_eq!(stats.post_records[&Dest::None], 1);
        assert!(plain.read_stats().is_none());
    }

    #[test]
    fn interrupt_flag_stops_the_run() {
        let flag = AtomicBool::new(true);
        let mut reader = MemoryReader::new(vec![vec![Record::single(SeqRead::new(
            b"r1", b"ACGT", None,
        ))]]);
        let mut writers = Writers::new();
        let mut p = pipeline();
        let formatters = Formatters::new(false);
        let err = run_serial(&mut reader, &mut p, &formatters, &mut writers, Some(&flag));
        assert!(matches!(err, Err(Error::Interrupted)));
    }
}
