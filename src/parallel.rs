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

//! Multi-threaded trimming.
//!
//! The main thread numbers batches from the reader and feeds a bounded
//! input queue. Workers pop batches, run the pipeline, and hand their
//! result maps to a result handler: either a queue feeding a dedicated
//! writer thread, or direct writes through per-worker suffixed outputs.
//! After the reader is exhausted the main thread pushes one sentinel per
//! worker, promotes the freed thread to one more worker, folds the worker
//! summaries, verifies batch coverage, and joins the writer.
//!
//! Every blocking queue operation waits in bounded slices and re-checks
//! that its peers are still alive. Waits beyond the soft timeout escalate
//! from debug to error logging but never kill anything; forced shutdown is
//! expressed by dropping the channels, which blocked peers observe as
//! disconnection.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeSet};
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use log::{debug, error};

use crate::format::{Formatters, ResultMap, WriteMap};
use crate::pipeline::{interrupted, join_chunks, Pipeline, Summary, WorkerSummary};
use crate::record::Batch;
use crate::seqio::{is_gz, BatchReader, Writers};
use crate::{Error, Result};

/// Bounded wait used by every blocking queue operation.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Who compresses compressible outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Workers compress result chunks before enqueuing them.
    Worker,
    /// The writer compresses on the way to disk; with more than two
    /// requested threads, one is reserved for it.
    Writer,
}

#[derive(Debug, Clone)]
pub struct ParallelOptions {
    /// Worker threads; the reader and writer borrow from this pool.
    pub threads: usize,
    /// Soft timeout: queue waits beyond this are logged as errors.
    pub timeout: Duration,
    /// Reorder results by batch number so output bytes match a serial run.
    pub preserve_order: bool,
    /// Input queue capacity; 0 means unbounded.
    pub input_queue_size: usize,
    /// Result queue capacity; 0 means unbounded.
    pub result_queue_size: usize,
    /// Dedicate a thread to writing instead of letting each worker write
    /// its own suffixed outputs.
    pub use_writer_thread: bool,
    pub compression: Compression,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        ParallelOptions {
            threads: 2,
            timeout: Duration::from_secs(30),
            preserve_order: false,
            input_queue_size: 0,
            result_queue_size: 0,
            use_writer_thread: true,
            compression: Compression::Writer,
        }
    }
}

fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    if capacity == 0 {
        unbounded()
    } else {
        bounded(capacity)
    }
}

fn log_wait(what: &str, waited: Duration, timeout: Duration) {
    if waited >= timeout {
        error!("still blocked on {what} after {}s", waited.as_secs());
    } else {
        debug!("waiting on {what}");
    }
}

/// Push with liveness checks between bounded waits.
fn enqueue<T>(
    tx: &Sender<T>,
    mut item: T,
    timeout: Duration,
    what: &str,
    ensure_alive: &mut dyn FnMut() -> Result<()>,
) -> Result<()> {
    let mut waited = Duration::ZERO;
    loop {
        match tx.send_timeout(item, RETRY_INTERVAL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => {
                item = returned;
                waited += RETRY_INTERVAL;
                log_wait(what, waited, timeout);
                ensure_alive()?;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                ensure_alive()?;
                return Err(Error::WriterExited);
            }
        }
    }
}

fn compress_map(map: WriteMap) -> Result<WriteMap> {
    map.into_iter()
        .map(|(path, bytes)| {
            if is_gz(&path) {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder.write_all(&bytes)?;
                Ok((path, encoder.finish()?))
            } else {
                Ok((path, bytes))
            }
        })
        .collect()
}

/// Where a worker's per-batch results go.
enum WorkerSink {
    Queue {
        tx: Sender<(usize, WriteMap)>,
        compress: bool,
        timeout: Duration,
    },
    Direct {
        writers: Writers,
    },
}

impl WorkerSink {
    fn handle(&mut self, batch_num: usize, result: ResultMap) -> Result<()> {
        match self {
            WorkerSink::Queue { tx, compress, timeout } => {
                let mut map = join_chunks(result);
                if *compress {
                    map = compress_map(map)?;
                }
                let mut item = (batch_num, map);
                let mut waited = Duration::ZERO;
                loop {
                    match tx.send_timeout(item, RETRY_INTERVAL) {
                        Ok(()) => return Ok(()),
                        Err(SendTimeoutError::Timeout(returned)) => {
                            item = returned;
                            waited += RETRY_INTERVAL;
                            log_wait("result queue", waited, *timeout);
                        }
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(Error::WriterExited);
                        }
                    }
                }
            }
            WorkerSink::Direct { writers } => {
                writers.write_result(&join_chunks(result), false)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            WorkerSink::Queue { .. } => Ok(()),
            WorkerSink::Direct { writers } => writers.close(),
        }
    }
}

fn trim_worker(
    index: usize,
    input: Receiver<Option<(usize, Batch)>>,
    summary_tx: Sender<WorkerSummary>,
    mut pipeline: Pipeline,
    formatters: Formatters,
    mut sink: WorkerSink,
    timeout: Duration,
) {
    let mut summary = WorkerSummary { index, ..WorkerSummary::default() };
    let outcome = (|| -> Result<()> {
        let mut waited = Duration::ZERO;
        loop {
            match input.recv_timeout(RETRY_INTERVAL) {
                Ok(Some((batch_num, batch))) => {
                    waited = Duration::ZERO;
                    summary.records += batch.len() as u64;
                    let mut result = ResultMap::new();
                    for record in batch {
                        let (dest, record) = pipeline.process(record);
                        *summary.destinations.entry(dest).or_insert(0) += 1;
                        formatters.format(&mut result, dest, &record);
                    }
                    sink.handle(batch_num, result)?;
                    summary.seen_batches.insert(batch_num);
                }
                Ok(None) => break,
                Err(RecvTimeoutError::Timeout) => {
                    waited += RETRY_INTERVAL;
                    log_wait("input queue", waited, timeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Interrupted),
            }
        }
        sink.finish()
    })();
    summary.total_bp1 = pipeline.total_bp1;
    summary.total_bp2 = pipeline.total_bp2;
    if let Err(e) = outcome {
        error!("worker {index}: {e}");
        summary.failed = true;
    }
    // The summary queue has one slot per worker, so this cannot block.
    let _ = summary_tx.send(summary);
}

struct PendingBatch {
    num: usize,
    map: WriteMap,
}

impl PartialEq for PendingBatch {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num
    }
}

impl Eq for PendingBatch {}

impl PartialOrd for PendingBatch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingBatch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.num.cmp(&other.num)
    }
}

struct OrderState {
    pending: BinaryHeap<Reverse<PendingBatch>>,
    cur_batch: usize,
}

/// Persists result maps, optionally buffering out-of-order batches in a
/// min-heap and flushing the contiguous prefix.
struct WriterResultHandler {
    writers: Writers,
    compressed: bool,
    order: Option<OrderState>,
}

impl WriterResultHandler {
    fn new(writers: Writers, compressed: bool, preserve_order: bool) -> Self {
        let order = preserve_order
            .then(|| OrderState { pending: BinaryHeap::new(), cur_batch: 1 });
        WriterResultHandler { writers, compressed, order }
    }

    fn write_result(&mut self, batch_num: usize, map: WriteMap) -> Result<()> {
        let expected = match self.order.as_ref() {
            None => return self.writers.write_result(&map, self.compressed),
            Some(state) => state.cur_batch,
        };
        if batch_num == expected {
            self.writers.write_result(&map, self.compressed)?;
            if let Some(state) = self.order.as_mut() {
                state.cur_batch += 1;
            }
            self.consume_pending()
        } else {
            if let Some(state) = self.order.as_mut() {
                state.pending.push(Reverse(PendingBatch { num: batch_num, map }));
            }
            Ok(())
        }
    }

    fn consume_pending(&mut self) -> Result<()> {
        loop {
            let next = {
                let Some(state) = self.order.as_mut() else {
                    return Ok(());
                };
                match state.pending.peek() {
                    Some(Reverse(next)) if next.num == state.cur_batch => {
                        state.pending.pop().map(|Reverse(next)| next)
                    }
                    _ => None,
                }
            };
            let Some(next) = next else {
                return Ok(());
            };
            self.writers.write_result(&next.map, self.compressed)?;
            if let Some(state) = self.order.as_mut() {
                state.cur_batch += 1;
            }
        }
    }

    fn finish(&mut self, total_batches: Option<usize>) -> Result<()> {
        if self.order.is_some() {
            self.consume_pending()?;
            if let (Some(total), Some(state)) = (total_batches, self.order.as_ref()) {
                let written = state.cur_batch - 1;
                if written != total {
                    return Err(Error::MissingBatches(
                        (state.cur_batch..=total).collect(),
                    ));
                }
            }
        }
        self.writers.close()
    }
}

fn writer_loop(
    result_rx: Receiver<(usize, WriteMap)>,
    control_rx: Receiver<usize>,
    mut handler: WriterResultHandler,
    timeout: Duration,
) -> Result<()> {
    let mut total: Option<usize> = None;
    let outcome = (|| -> Result<()> {
        let mut written = 0usize;
        let mut waited = Duration::ZERO;
        loop {
            if total == Some(written) {
                break;
            }
            if total.is_none() {
                if let Ok(t) = control_rx.try_recv() {
                    total = Some(t);
                    continue;
                }
            }
            match result_rx.recv_timeout(RETRY_INTERVAL) {
                Ok((batch_num, map)) => {
                    waited = Duration::ZERO;
                    handler.write_result(batch_num, map)?;
                    written += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    waited += RETRY_INTERVAL;
                    log_wait("result queue", waited, timeout);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if total.is_none() {
                        if let Ok(t) = control_rx.try_recv() {
                            total = Some(t);
                            continue;
                        }
                    }
                    // Every producer is gone; whatever arrived is all
                    // there will be. The coverage checks report losses.
                    break;
                }
            }
        }
        Ok(())
    })();
    let finished = handler.finish(if outcome.is_ok() { total } else { None });
    outcome?;
    finished
}

fn ensure_alive<'a, 'b>(
    workers: &[thread::ScopedJoinHandle<'a, ()>],
    writer: Option<&thread::ScopedJoinHandle<'b, Result<()>>>,
) -> Result<()> {
    for (index, handle) in workers.iter().enumerate() {
        if handle.is_finished() {
            return Err(Error::WorkerDied(index));
        }
    }
    if let Some(handle) = writer {
        if handle.is_finished() {
            return Err(Error::WriterExited);
        }
    }
    Ok(())
}

/// Run the pipeline across `threads` worker threads. With
/// `preserve_order` the output bytes are identical to [`run_serial`]
/// (crate::pipeline::run_serial) on the same input.
pub fn run_parallel<R: BatchReader>(
    reader: &mut R,
    pipeline: &Pipeline,
    formatters: &Formatters,
    writers: Writers,
    opts: &ParallelOptions,
    interrupt: Option<&AtomicBool>,
) -> Result<Summary> {
    if opts.threads < 2 {
        return Err(Error::Config("parallel mode needs at least 2 threads".to_string()));
    }
    if opts.preserve_order && !opts.use_writer_thread {
        return Err(Error::Config(
            "order preservation requires the writer thread".to_string(),
        ));
    }
    let mut threads = opts.threads;
    if opts.compression == Compression::Writer && opts.use_writer_thread && threads > 2 {
        threads -= 1;
    }
    let timeout = opts.timeout.max(RETRY_INTERVAL);
    let workers_compress =
        opts.compression == Compression::Worker && opts.use_writer_thread;
    debug!("starting parallel run with {threads} worker threads");

    let mut summary =
        Summary { mode: "parallel", threads, ..Summary::default() };
    let (input_tx, input_rx) = channel::<Option<(usize, Batch)>>(opts.input_queue_size);
    let (summary_tx, summary_rx) = bounded::<WorkerSummary>(threads);

    let run = thread::scope(|scope| -> Result<()> {
        let mut result_tx = None;
        let mut control_tx = None;
        let mut writer_handle = None;
        if opts.use_writer_thread {
            let (rtx, rrx) = channel::<(usize, WriteMap)>(opts.result_queue_size);
            let (ctx, crx) = bounded::<usize>(1);
            let handler =
                WriterResultHandler::new(writers, workers_compress, opts.preserve_order);
            writer_handle = Some(scope.spawn(move || writer_loop(rrx, crx, handler, timeout)));
            result_tx = Some(rtx);
            control_tx = Some(ctx);
        }

        let make_sink = |index: usize| match result_tx.as_ref() {
            Some(tx) => WorkerSink::Queue {
                tx: tx.clone(),
                compress: workers_compress,
                timeout,
            },
            None => WorkerSink::Direct { writers: Writers::with_suffix(index) },
        };
        let mut worker_handles = Vec::with_capacity(threads);
        for index in 0..threads - 1 {
            let sink = make_sink(index);
            let pipeline = pipeline.clone();
            let formatters = formatters.clone();
            let input_rx = input_rx.clone();
            let summary_tx = summary_tx.clone();
            worker_handles.push(scope.spawn(move || {
                trim_worker(index, input_rx, summary_tx, pipeline, formatters, sink, timeout)
            }));
        }

        let run = (|| -> Result<()> {
            let mut num_batches = 0usize;
            while let Some(batch) = reader.next_batch()? {
                if interrupted(interrupt) {
                    return Err(Error::Interrupted);
                }
                num_batches += 1;
                enqueue(
                    &input_tx,
                    Some((num_batches, batch)),
                    timeout,
                    "input queue",
                    &mut || ensure_alive(&worker_handles, writer_handle.as_ref()),
                )?;
            }
            debug!("reader exhausted after {num_batches} batches");

            // One sentinel per worker, including the one about to start.
            for _ in 0..threads {
                enqueue(&input_tx, None, timeout, "input queue", &mut || {
                    ensure_alive(&worker_handles, writer_handle.as_ref())
                })?;
            }
            if let Some(tx) = control_tx.as_ref() {
                let _ = tx.send(num_batches);
            }

            // The reader is done; its thread becomes one more worker.
            {
                let index = threads - 1;
                let sink = make_sink(index);
                let pipeline = pipeline.clone();
                let formatters = formatters.clone();
                let input_rx = input_rx.clone();
                let summary_tx = summary_tx.clone();
                worker_handles.push(scope.spawn(move || {
                    trim_worker(
                        index, input_rx, summary_tx, pipeline, formatters, sink, timeout,
                    )
                }));
            }

            let mut seen_batches = BTreeSet::new();
            let mut received = BTreeSet::new();
            let mut waited = Duration::ZERO;
            for _ in 0..threads {
                let worker = loop {
                    match summary_rx.recv_timeout(RETRY_INTERVAL) {
                        Ok(worker) => break worker,
                        Err(RecvTimeoutError::Timeout) => {
                            waited += RETRY_INTERVAL;
                            log_wait("worker summaries", waited, timeout);
                            if worker_handles.iter().all(|h| h.is_finished())
                                && summary_rx.is_empty()
                            {
                                let missing = (0..threads)
                                    .find(|i| !received.contains(i))
                                    .unwrap_or(0);
                                return Err(Error::WorkerDied(missing));
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(Error::WorkerDied(0));
                        }
                    }
                };
                if worker.failed {
                    return Err(Error::WorkerDied(worker.index));
                }
                debug!("folding summary from worker {}", worker.index);
                received.insert(worker.index);
                seen_batches.extend(worker.seen_batches.iter().copied());
                summary.fold(&worker);
            }

            if num_batches > 0 {
                let missing: Vec<usize> = (1..=num_batches)
                    .filter(|n| !seen_batches.contains(n))
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::MissingBatches(missing));
                }
            }
            summary.batches = num_batches;
            Ok(())
        })();

        // Disconnect everything so blocked peers unwind, then collect the
        // writer's verdict.
        drop(input_tx);
        drop(result_tx);
        drop(control_tx);
        let writer_outcome = writer_handle
            .map(|handle| handle.join().map_err(|_| Error::WriterExited));
        run?;
        if let Some(outcome) = writer_outcome {
            outcome??;
        }
        Ok(())
    });

    let closed_reader = reader.close();
    run?;
    closed_reader?;
    Ok(summary)
}
