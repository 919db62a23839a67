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

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

// the rust_htslib crate is not ideal for our purpose
use rust_htslib::bgzf;

use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use crate::format::WriteMap;
use crate::record::{Batch, Record, SeqRead};
use crate::{Error, Result};

/// Source of numbered batches of records. The runners call `close` on every
/// exit path.
pub trait BatchReader {
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FastqFile {
    path: PathBuf,
    reader: BufReader<bgzf::Reader>,
    records: u64,
}

impl FastqFile {
    fn open(path: &Path) -> Result<Self> {
        let reader = bgzf::Reader::from_path(path)?;
        Ok(FastqFile {
            path: path.to_path_buf(),
            reader: BufReader::new(reader),
            records: 0,
        })
    }

    fn malformed(&self, what: &str) -> Error {
        Error::MalformedInput(format!(
            "{} (record {} of {})",
            what,
            self.records + 1,
            self.path.display()
        ))
    }

    fn line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        let n = self.reader.read_until(b'\n', buf)?;
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(n)
    }

    fn next_read(&mut self) -> Result<Option<SeqRead>> {
        let mut name = Vec::new();
        if self.line(&mut name)? == 0 {
            return Ok(None);
        }
        let mut sequence = Vec::new();
        let mut plus = Vec::new();
        let mut qualities = Vec::new();
        if self.line(&mut sequence)? == 0
            || self.line(&mut plus)? == 0
            || self.line(&mut qualities)? == 0
        {
            return Err(self.malformed("truncated FASTQ record"));
        }
        if name.first() != Some(&b'@') {
            return Err(self.malformed("expected '@' at record start"));
        }
        if plus.first() != Some(&b'+') {
            return Err(self.malformed("expected '+' separator"));
        }
        if qualities.len() != sequence.len() {
            return Err(self.malformed("quality and sequence lengths differ"));
        }
        self.records += 1;
        Ok(Some(SeqRead::new(&name[1..], &sequence, Some(&qualities))))
    }
}

/// Streams single or paired FASTQ (optionally BGZF-compressed) files as
/// fixed-size batches.
pub struct FastqReader {
    r1: Option<FastqFile>,
    r2: Option<FastqFile>,
    batch_size: usize,
}

impl FastqReader {
    pub fn open(path1: &Path, path2: Option<&Path>, batch_size: usize) -> Result<Self> {
        Ok(FastqReader {
            r1: Some(FastqFile::open(path1)?),
            r2: path2.map(FastqFile::open).transpose()?,
            batch_size: batch_size.max(1),
        })
    }
}

impl BatchReader for FastqReader {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(r1) = self.r1.as_mut() else {
            return Ok(None);
        };
        let mut batch = Batch::new();
        for _ in 0..self.batch_size {
            let Some(read1) = r1.next_read()? else {
                if let Some(r2) = self.r2.as_mut() {
                    if r2.next_read()?.is_some() {
                        return Err(Error::MalformedInput(
                            "paired inputs have unequal read counts".to_string(),
                        ));
                    }
                }
                break;
            };
            match self.r2.as_mut() {
                Some(r2) => {
                    let Some(read2) = r2.next_read()? else {
                        return Err(Error::MalformedInput(
                            "paired inputs have unequal read counts".to_string(),
                        ));
                    };
                    batch.push(Record::pair(read1, read2));
                }
                None => batch.push(Record::single(read1)),
            }
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    fn close(&mut self) -> Result<()> {
        self.r1 = None;
        self.r2 = None;
        Ok(())
    }
}

/// In-memory batch source, mainly for tests and small pipelines.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    batches: VecDeque<Batch>,
}

impl MemoryReader {
    pub fn new(batches: Vec<Batch>) -> Self {
        MemoryReader { batches: batches.into() }
    }
}

impl BatchReader for MemoryReader {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.batches.pop_front())
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Sink::Plain(w) => w.write_all(bytes)?,
            Sink::Gz(w) => w.write_all(bytes)?,
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Sink::Plain(w) => w.flush()?,
            Sink::Gz(w) => {
                w.try_finish()?;
                w.get_mut().flush()?;
            }
        }
        Ok(())
    }
}

pub(crate) fn is_gz(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "gz")
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Owns the output files. Each path is created on first write and appended
/// to afterwards; `.gz` paths are gzip-compressed on the way out unless the
/// bytes arrive already compressed. An optional suffix distinguishes the
/// outputs of workers that write directly.
#[derive(Default)]
pub struct Writers {
    suffix: Option<String>,
    files: HashMap<PathBuf, Sink>,
}

impl Writers {
    pub fn new() -> Self {
        Writers::default()
    }

    /// Writers for a worker that persists its own results: every path gets
    /// a `.{index}` suffix.
    pub fn with_suffix(index: usize) -> Self {
        Writers { suffix: Some(format!(".{index}")), files: HashMap::new() }
    }

    /// Create (truncate) the given paths up front so that an empty run
    /// still produces its output files.
    pub fn force_create(&mut self, paths: &[PathBuf], compressed: bool) -> Result<()> {
        for path in paths {
            self.sink_for(path, compressed)?;
        }
        Ok(())
    }

    fn sink_for(&mut self, path: &Path, compressed: bool) -> Result<&mut Sink> {
        let actual = match self.suffix.as_deref() {
            Some(suffix) => suffixed(path, suffix),
            None => path.to_path_buf(),
        };
        if !self.files.contains_key(&actual) {
            let sink = if is_gz(&actual) && !compressed {
                Sink::Gz(GzEncoder::new(
                    BufWriter::new(File::create(&actual)?),
                    GzLevel::default(),
                ))
            } else {
                Sink::Plain(BufWriter::new(File::create(&actual)?))
            };
            self.files.insert(actual.clone(), sink);
        }
        Ok(self.files.get_mut(&actual).expect("sink just inserted"))
    }

    /// Append each path's bytes. `compressed` marks bytes that a worker
    /// already compressed, which are passed through untouched.
    pub fn write_result(&mut self, result: &WriteMap, compressed: bool) -> Result<()> {
        for (path, bytes) in result {
            self.sink_for(path, compressed)?.write_all(bytes)?;
        }
        Ok(())
    }

    /// Flush and close every open path.
    pub fn close(&mut self) -> Result<()> {
        for sink in self.files.values_mut() {
            sink.finish()?;
        }
        self.files.clear();
        Ok(())
    }
}
