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

//! Trim adaptors and low-quality bases from short-read sequencing data.
//!
//! The crate has two public surfaces: the aligners ([`align::Aligner`],
//! [`insert::InsertAligner`]) that locate adaptors under a bounded error
//! rate, and the runners ([`pipeline::run_serial`],
//! [`parallel::run_parallel`]) that stream numbered batches of reads
//! through a modifier chain, a filter chain and a formatter set before
//! persisting the results.

use thiserror::Error as ThisError;

pub mod adapters;
pub mod align;
pub mod filters;
pub mod format;
pub mod insert;
pub mod matches;
pub mod modifiers;
pub mod parallel;
pub mod pipeline;
pub mod record;
pub mod seqio;
pub mod util;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Inconsistent options, reported before any read is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// The reader hit an unrecoverable parse failure.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A worker exited without delivering its summary; consumed batches
    /// may be lost.
    #[error("worker {0} died unexpectedly")]
    WorkerDied(usize),

    /// Some batch numbers were never processed by any worker.
    #[error("workers did not process batches {0:?}")]
    MissingBatches(Vec<usize>),

    #[error("writer exited before the run completed")]
    WriterExited,

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub use adapters::{Adapter, Where};
pub use align::{compare_prefixes, compare_suffixes, AlignSpan, Aligner, NoIndelAligner};
pub use filters::{Dest, FilterKind, Filters};
pub use format::{Formatters, InfoFormatter, ResultMap, WriteMap};
pub use insert::{InsertAligner, InsertMatch};
pub use matches::{Match, MatchInfo};
pub use modifiers::{Action, Modifiers, Side, TrimOp};
pub use parallel::{run_parallel, Compression, ParallelOptions};
pub use pipeline::{run_serial, Pipeline, ReadStatistics, Summary, WorkerSummary};
pub use record::{Batch, Record, SeqRead};
pub use seqio::{BatchReader, FastqReader, MemoryReader, Writers};
pub use util::{reverse_complement, RandomMatchProbability};
