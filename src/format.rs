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

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::filters::Dest;
use crate::record::{Record, SeqRead};

/// Token interpolated into multiplexed output paths.
pub const NAME_TOKEN: &str = "{name}";

/// Per-batch accumulation: output path to ordered byte chunks. Chunk order
/// within a path follows record order within the batch.
pub type ResultMap = BTreeMap<PathBuf, Vec<Vec<u8>>>;

/// Joined (and possibly compressed) form handed to the writer sink.
pub type WriteMap = BTreeMap<PathBuf, Vec<u8>>;

fn render_read(read: &SeqRead, out: &mut Vec<u8>) {
    match read.qualities.as_deref() {
        Some(qual) => {
            out.push(b'@');
            out.extend_from_slice(&read.name);
            out.push(b'\n');
            out.extend_from_slice(&read.sequence);
            out.extend_from_slice(b"\n+\n");
            out.extend_from_slice(qual);
            out.push(b'\n');
        }
        None => {
            out.push(b'>');
            out.extend_from_slice(&read.name);
            out.push(b'\n');
            out.extend_from_slice(&read.sequence);
            out.push(b'\n');
        }
    }
}

/// Side files describing the matches themselves rather than the trimmed
/// reads.
#[derive(Debug, Clone)]
pub enum InfoFormatter {
    /// The unmatched remainder beyond each match, one line per match.
    Rest(PathBuf),
    /// One tab-separated line per read describing the match, `-1` when the
    /// read had none.
    Info(PathBuf),
    /// The bases matched by adaptor wildcards.
    Wildcard(PathBuf),
}

impl InfoFormatter {
    fn format(&self, result: &mut ResultMap, read: &SeqRead) {
        match self {
            InfoFormatter::Rest(path) => {
                if let Some(info) = read.match_info.as_ref() {
                    let rest = info.rest();
                    if !rest.is_empty() {
                        let mut line = rest.to_vec();
                        line.push(b' ');
                        line.extend_from_slice(&read.name);
                        line.push(b'\n');
                        result.entry(path.clone()).or_default().push(line);
                    }
                }
            }
            InfoFormatter::Info(path) => {
                let mut line = Vec::new();
                line.extend_from_slice(&read.name);
                match read.match_info.as_ref() {
                    Some(info) => {
                        let head =
                            format!("\t{}\t{}\t{}", info.errors, info.rstart, info.rstop);
                        line.extend_from_slice(head.as_bytes());
                        let fields: [&[u8]; 7] = [
                            &info.seq_before,
                            &info.seq_adapter,
                            &info.seq_after,
                            info.adapter_name.as_bytes(),
                            &info.qual_before,
                            &info.qual_adapter,
                            &info.qual_after,
                        ];
                        for field in fields {
                            line.push(b'\t');
                            line.extend_from_slice(field);
                        }
                    }
                    None => {
                        line.extend_from_slice(b"\t-1\t");
                        line.extend_from_slice(&read.sequence);
                    }
                }
                line.push(b'\n');
                result.entry(path.clone()).or_default().push(line);
            }
            InfoFormatter::Wildcard(path) => {
                if let Some(info) = read.match_info.as_ref() {
                    let mut line = info.wildcards.clone();
                    line.push(b' ');
                    line.extend_from_slice(&read.name);
                    line.push(b'\n');
                    result.entry(path.clone()).or_default().push(line);
                }
            }
        }
    }
}

/// Maps destination labels to output paths and renders records into the
/// per-batch result map. A path containing `{name}` is a multiplex
/// template, resolved per record from the matched adaptor's name.
#[derive(Debug, Clone, Default)]
pub struct Formatters {
    destinations: BTreeMap<Dest, (PathBuf, Option<PathBuf>)>,
    interleaved: bool,
    info: Vec<InfoFormatter>,
}

impl Formatters {
    pub fn new(interleaved: bool) -> Self {
        Formatters { interleaved, ..Default::default() }
    }

    pub fn add_seq_formatter(&mut self, dest: Dest, path1: PathBuf, path2: Option<PathBuf>) {
        self.destinations.insert(dest, (path1, path2));
    }

    pub fn add_info_formatter(&mut self, formatter: InfoFormatter) {
        self.info.push(formatter);
    }

    pub fn is_multiplexed(&self) -> bool {
        self.destinations
            .values()
            .any(|(p, _)| p.to_string_lossy().contains(NAME_TOKEN))
    }

    fn resolve(&self, path: &PathBuf, record: &Record) -> PathBuf {
        let template = path.to_string_lossy();
        if !template.contains(NAME_TOKEN) {
            return path.clone();
        }
        let name = record
            .r1
            .match_info
            .as_ref()
            .or(record.r2.as_ref().and_then(|r| r.match_info.as_ref()))
            .map(|info| info.adapter_name.as_str())
            .unwrap_or("unknown");
        PathBuf::from(template.replace(NAME_TOKEN, name))
    }

    /// Append the rendered record under the path(s) registered for `dest`.
    /// Records whose destination has no formatter are discarded; the info
    /// formatters see every read either way.
    pub fn format(&self, result: &mut ResultMap, dest: Dest, record: &Record) {
        if let Some((path1, path2)) = self.destinations.get(&dest) {
            let path1 = self.resolve(path1, record);
            let mut chunk = Vec::new();
            render_read(&record.r1, &mut chunk);
            result.entry(path1.clone()).or_default().push(chunk);
            if let Some(r2) = record.r2.as_ref() {
                let path2 = if self.interleaved {
                    path1
                } else {
                    path2.as_ref().map(|p| self.resolve(p, record)).unwrap_or(path1)
                };
                let mut chunk = Vec::new();
                render_read(r2, &mut chunk);
                result.entry(path2).or_default().push(chunk);
            }
        }
        for formatter in &self.info {
            formatter.format(result, &record.r1);
            if let Some(r2) = record.r2.as_ref() {
                formatter.format(result, r2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::MatchInfo;

    fn fastq_read(name: &[u8], seq: &[u8]) -> SeqRead {
        let qual = vec![b'I'; seq.len()];
        SeqRead::new(name, seq, Some(&qual))
    }

    #[test]
    fn fastq_rendering() {
        let mut formatters = Formatters::new(false);
        formatters.add_seq_formatter(Dest::None, PathBuf::from("out.fastq"), None);
        let mut result = ResultMap::new();
        formatters.format(
            &mut result,
            Dest::None,
            &Record::single(fastq_read(b"r1", b"ACGT")),
        );
        let chunks = &result[&PathBuf::from("out.fastq")];
        assert_eq!(chunks[0], b"@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn fasta_when_no_qualities() {
        let mut formatters = Formatters::new(false);
        formatters.add_seq_formatter(Dest::None, PathBuf::from("out.fasta"), None);
        let mut result = ResultMap::new();
        formatters.format(
            &mut result,
            Dest::None,
            &Record::single(SeqRead::new(b"r1", b"ACGT", None)),
        );
        assert_eq!(result[&PathBuf::from("out.fasta")][0], b">r1\nACGT\n");
    }

    #[test]
    fn unregistered_destination_is_discarded() {
        let mut formatters = Formatters::new(false);
        formatters.add_seq_formatter(Dest::None, PathBuf::from("out.fastq"), None);
        let mut result = ResultMap::new();
        formatters.format(
            &mut result,
            Dest::TooShort,
            &Record::single(fastq_read(b"r1", b"AC")),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn paired_and_interleaved_output() {
        let r = Record::pair(fastq_read(b"r1", b"ACGT"), fastq_read(b"r2", b"TTTT"));

        let mut split = Formatters::new(false);
        split.add_seq_formatter(
            Dest::None,
            PathBuf::from("out.1.fastq"),
            Some(PathBuf::from("out.2.fastq")),
        );
        let mut result = ResultMap::new();
        split.format(&mut result, Dest::None, &r);
        assert_eq!(result.len(), 2);

        let mut inter = Formatters::new(true);
        inter.add_seq_formatter(Dest::None, PathBuf::from("out.fastq"), None);
        let mut result = ResultMap::new();
        inter.format(&mut result, Dest::None, &r);
        let chunks = &result[&PathBuf::from("out.fastq")];
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with(b"@r1"));
        assert!(chunks[1].starts_with(b"@r2"));
    }

    #[test]
    fn multiplexed_path_uses_adapter_name() {
        let mut formatters = Formatters::new(false);
        formatters.add_seq_formatter(Dest::None, PathBuf::from("out.{name}.fastq"), None);
        assert!(formatters.is_multiplexed());

        let mut read = fastq_read(b"r1", b"ACGT");
        read.match_info = Some(MatchInfo {
            adapter_name: "a1".to_string(),
            ..Default::default()
        });
        let mut result = ResultMap::new();
        formatters.format(&mut result, Dest::None, &Record::single(read));
        assert!(result.contains_key(&PathBuf::from("out.a1.fastq")));

        let mut result = ResultMap::new();
        formatters.format(
            &mut result,
            Dest::None,
            &Record::single(fastq_read(b"r1", b"ACGT")),
        );
        assert!(result.contains_key(&PathBuf::from("out.unknown.fastq")));
    }

    #[test]
    fn info_formatters_cover_all_reads() {
        let mut formatters = Formatters::new(false);
        formatters.add_info_formatter(InfoFormatter::Info(PathBuf::from("info.txt")));
        formatters.add_info_formatter(InfoFormatter::Rest(PathBuf::from("rest.txt")));

        let mut matched = fastq_read(b"r1", b"ACGTACGTAAA");
        matched.match_info = Some(MatchInfo {
            read_name: b"r1".to_vec(),
            errors: 0,
            rstart: 11,
            rstop: 22,
            seq_before: b"ACGTACGTAAA".to_vec(),
            seq_adapter: b"AGATCGGAAGA".to_vec(),
            adapter_name: "a1".to_string(),
            is_front: true,
            ..Default::default()
        });
        let mut result = ResultMap::new();
        formatters.format(&mut result, Dest::None, &Record::single(matched));
        let info_lines = &result[&PathBuf::from("info.txt")];
        assert!(info_lines[0].starts_with(b"r1\t0\t11\t22\t"));
        // Front match: the rest is the part before the adaptor.
        assert_eq!(result[&PathBuf::from("rest.txt")][0], b"ACGTACGTAAA r1\n");

        let mut result = ResultMap::new();
        formatters.format(
            &mut result,
            Dest::None,
            &Record::single(fastq_read(b"r2", b"ACGT")),
        );
        assert_eq!(result[&PathBuf::from("info.txt")][0], b"r2\t-1\tACGT\n");
        assert!(!result.contains_key(&PathBuf::from("rest.txt")));
    }
}
