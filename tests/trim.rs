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

use std::path::Path;

use trimado_rs::modifiers::{Action, AdapterCutter, InsertAdapterCutter};
use trimado_rs::{
    reverse_complement, run_parallel, run_serial, Adapter, Batch, Compression, Dest,
    FastqReader, FilterKind, Filters, Formatters, MemoryReader, Modifiers,
    ParallelOptions, Pipeline, RandomMatchProbability, Record, SeqRead, Side, Where,
    Writers,
};

const ADAPTER: &[u8] = b"AGATCGGAAGA";
const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn base(&mut self) -> u8 {
        BASES[(self.next() % 4) as usize]
    }

    fn sequence(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.base()).collect()
    }
}

/// Reads built from a repeating pattern whose suffixes never resemble the
/// adaptor, so a second trimming pass finds nothing new.
fn make_batches(batches: usize, per_batch: usize, seed: u64) -> Vec<Batch> {
    const PATTERN: &[u8] = b"ACGTTGCA";
    (0..batches)
        .map(|b| {
            (0..per_batch)
                .map(|r| {
                    let phase = (seed as usize + b * 7 + r * 3) % PATTERN.len();
                    let len = 16 + (b + r * 5) % 17;
                    let mut seq: Vec<u8> =
                        (0..len).map(|i| PATTERN[(phase + i) % PATTERN.len()]).collect();
                    if (b + r) % 3 == 0 {
                        seq.extend_from_slice(ADAPTER);
                    }
                    let qual = vec![b'I'; seq.len()];
                    let name = format!("read_{}_{}", b, r);
                    Record::single(SeqRead::new(name.as_bytes(), &seq, Some(&qual)))
                })
                .collect()
        })
        .collect()
}

fn trim_pipeline() -> Pipeline {
    let mut modifiers = Modifiers::new(false);
    modifiers.add_single(
        Side::Both,
        AdapterCutter::new(
            vec![Adapter::new("a1", ADAPTER, Where::Back).min_overlap(5)],
            1,
            Action::Trim,
        ),
    );
    let mut filters = Filters::new(1);
    filters.add_filter(FilterKind::TooShort(10));
    Pipeline::new(modifiers, filters)
}

fn main_formatters(out: &Path) -> Formatters {
    let mut formatters = Formatters::new(false);
    formatters.add_seq_formatter(Dest::None, out.to_path_buf(), None);
    formatters.add_seq_formatter(Dest::TooShort, out.with_extension("short.fastq"), None);
    formatters
}

#[test]
fn parallel_output_preserves_serial_order() {
    let dir = tempfile::tempdir().unwrap();
    let serial_out = dir.path().join("serial.fastq");
    let parallel_out = dir.path().join("parallel.fastq");

    let mut pipeline = trim_pipeline();
    let serial_summary = run_serial(
        &mut MemoryReader::new(make_batches(50, 20, 7)),
        &mut pipeline,
        &main_formatters(&serial_out),
        &mut Writers::new(),
        None,
    )
    .unwrap();

    let opts = ParallelOptions {
        threads: 4,
        preserve_order: true,
        input_queue_size: 4,
        result_queue_size: 4,
        compression: Compression::Worker,
        ..ParallelOptions::default()
    };
    let parallel_summary = run_parallel(
        &mut MemoryReader::new(make_batches(50, 20, 7)),
        &trim_pipeline(),
        &main_formatters(&parallel_out),
        Writers::new(),
        &opts,
        None,
    )
    .unwrap();

    assert_eq!(serial_summary.batches, 50);
    assert_eq!(parallel_summary.batches, 50);
    assert_eq!(serial_summary.records, 1000);
    assert_eq!(parallel_summary.records, 1000);
    assert_eq!(serial_summary.destinations, parallel_summary.destinations);
    assert_eq!(serial_summary.total_bp1, parallel_summary.total_bp1);

    let serial_bytes = std::fs::read(&serial_out).unwrap();
    let parallel_bytes = std::fs::read(&parallel_out).unwrap();
    assert!(!serial_bytes.is_empty());
    assert_eq!(serial_bytes, parallel_bytes);
}

#[test]
fn trimming_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let once = dir.path().join("once.fastq");
    let twice = dir.path().join("twice.fastq");

    run_serial(
        &mut MemoryReader::new(make_batches(10, 10, 99)),
        &mut trim_pipeline(),
        &main_formatters(&once),
        &mut Writers::new(),
        None,
    )
    .unwrap();

    let mut reader = FastqReader::open(&once, None, 16).unwrap();
    run_serial(
        &mut reader,
        &mut trim_pipeline(),
        &main_formatters(&twice),
        &mut Writers::new(),
        None,
    )
    .unwrap();

    let first = std::fs::read(&once).unwrap();
    let second = std::fs::read(&twice).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn paired_insert_trimming_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let out1 = dir.path().join("out.1.fastq");
    let out2 = dir.path().join("out.2.fastq");

    let mut rng = Lcg(13);
    let mut batch = Batch::new();
    for i in 0..8 {
        let insert = rng.sequence(24);
        let mut seq1 = insert.clone();
        seq1.extend_from_slice(&ADAPTER[..9]);
        let mut seq2 = reverse_complement(&insert);
        seq2.extend_from_slice(&ADAPTER[..9]);
        let q1 = vec![b'I'; seq1.len()];
        let q2 = vec![b'I'; seq2.len()];
        let name = format!("pair_{i}");
        batch.push(Record::pair(
            SeqRead::new(name.as_bytes(), &seq1, Some(&q1)),
            SeqRead::new(name.as_bytes(), &seq2, Some(&q2)),
        ));
    }

    let mut modifiers = Modifiers::new(true);
    modifiers
        .add_paired(InsertAdapterCutter::new(
            Adapter::new("a1", ADAPTER, Where::Back),
            Adapter::new("a2", ADAPTER, Where::Back),
            Action::Trim,
            RandomMatchProbability::new(),
        ))
        .unwrap();
    let mut pipeline = Pipeline::new(modifiers, Filters::new(1));

    let mut formatters = Formatters::new(false);
    formatters.add_seq_formatter(Dest::None, out1.clone(), Some(out2.clone()));

    let summary = run_serial(
        &mut MemoryReader::new(vec![batch]),
        &mut pipeline,
        &formatters,
        &mut Writers::new(),
        None,
    )
    .unwrap();
    assert_eq!(summary.records, 8);

    let text1 = std::fs::read_to_string(&out1).unwrap();
    let text2 = std::fs::read_to_string(&out2).unwrap();
    for text in [&text1, &text2] {
        for (i, line) in text.lines().enumerate() {
            if i % 4 == 1 {
                assert_eq!(line.len(), 24, "mate should be trimmed to the insert");
            }
        }
    }
}

#[test]
fn fastq_files_roundtrip_through_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.fastq");
    let out = dir.path().join("out.fastq");

    let mut text = String::new();
    text.push_str("@keep\nACGTTGCAACGTTGCAACGT\n+\nIIIIIIIIIIIIIIIIIIII\n");
    text.push_str("@trim\nACGTTGCAACGTTGCAACGTAGATCGGAAGA\n+\nIIIIIIIIIIIIIIIIIIIIIIIIIIIIIII\n");
    std::fs::write(&input, text).unwrap();

    let mut reader = FastqReader::open(&input, None, 100).unwrap();
    let summary = run_serial(
        &mut reader,
        &mut trim_pipeline(),
        &main_formatters(&out),
        &mut Writers::new(),
        None,
    )
    .unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.total_bp1, 51);

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "@keep");
    assert_eq!(lines[1], "ACGTTGCAACGTTGCAACGT");
    assert_eq!(lines[4], "@trim");
    assert_eq!(lines[5], "ACGTTGCAACGTTGCAACGT");
    assert_eq!(lines[7], "IIIIIIIIIIIIIIIIIIII");
}
