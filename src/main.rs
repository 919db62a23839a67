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

use clap::{Parser, ValueEnum};
use clap_num::number_range;
use file_format::FileFormat as FFmt;
use indoc;
use log::info;
use num_cpus;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use trimado_rs::modifiers::{
    AdapterCutter, InsertAdapterCutter, LengthTagModifier, MergeOverlapping, MinCutter,
    NEndTrimmer, OverwriteRead, PrefixSuffixAdder, QualityTrimmer, SuffixRemover,
    TwoColorQualityTrimmer, UnconditionalCutter, ZeroCapper,
};
use trimado_rs::{
    run_parallel, run_serial, Action, Adapter, Compression, Dest, FastqReader, FilterKind,
    Filters, Formatters, InfoFormatter, Modifiers, ParallelOptions, Pipeline,
    RandomMatchProbability, Side, Summary, TrimOp, Where, Writers,
};

fn thread_range(s: &str) -> Result<u32, String> {
    number_range(s, 2, 255)
}

fn overlap_range(s: &str) -> Result<usize, String> {
    number_range(s, 1, 255)
}

fn stringify<T: std::fmt::Display>(e: T) -> String {
    format!("{e}")
}

fn prob_range(s: &str) -> Result<f64, String> {
    let val = s.parse::<f64>().map_err(stringify)?;
    if val >= f64::MIN_POSITIVE && val <= 1.0 {
        Ok(val)
    } else {
        Err(format!("{s} is outside valid range"))
    }
}

static CUSTOM_HELP_FORMAT: &str = indoc::indoc! {"
{before-help}
{about-section}
{usage-heading} {usage}

{all-args}

{name} {version}
{author-with-newline}{after-help}
"};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AlignerKind {
    /// Align each adaptor against each read separately
    Adapter,
    /// Detect 3' adaptors from the paired-end insert overlap
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActionArg {
    Trim,
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PairFilter {
    Any,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    Worker,
    Writer,
}

#[derive(Parser, Debug)]
#[command(
    author = "Andrew D. Smith <andrewds@usc.edu>",
    version,
    about,
    help_template = CUSTOM_HELP_FORMAT,
    arg_required_else_help = true,
)]
struct Args {
    /// Fastq input file
    fastq: PathBuf,

    /// Paired-end input second fastq file
    #[arg(requires = "pout")]
    pfastq: Option<PathBuf>,

    /// Output file
    #[arg(short, long)]
    out: PathBuf,

    /// Second output file for paired-end reads
    #[arg(short, long, requires = "pfastq")]
    pout: Option<PathBuf>,

    /// 3' adaptor for read 1; a trailing '$' anchors it to the read end
    #[arg(short = 'a', long = "adapter")]
    adapters: Vec<String>,

    /// 3' adaptor for read 2
    #[arg(short = 'A', long = "adapter2")]
    adapters2: Vec<String>,

    /// 5' adaptor for read 1; a leading '^' anchors it to the read start
    #[arg(short = 'g', long = "front")]
    front: Vec<String>,

    /// 5' adaptor for read 2
    #[arg(short = 'G', long = "front2")]
    front2: Vec<String>,

    /// Adaptor that may appear anywhere in read 1
    #[arg(short = 'b', long = "anywhere")]
    anywhere: Vec<String>,

    /// Adaptor that may appear anywhere in read 2
    #[arg(short = 'B', long = "anywhere2")]
    anywhere2: Vec<String>,

    /// Maximum allowed error rate of adaptor matches
    #[arg(short = 'e', long, default_value_t = 0.1)]
    #[arg(value_parser = prob_range)]
    error_rate: f64,

    /// Minimum overlap of read and adaptor
    #[arg(short = 'O', long, default_value_t = 3)]
    #[arg(value_parser = overlap_range)]
    overlap: usize,

    /// Disallow insertions and deletions in adaptor matches
    #[arg(long)]
    no_indels: bool,

    /// Cost of an insertion or deletion in adaptor matches
    #[arg(long, default_value_t = 1)]
    indel_cost: usize,

    /// Let N bases in the read match anything
    #[arg(long)]
    match_read_wildcards: bool,

    /// Do not let N bases in the adaptor match anything
    #[arg(long)]
    no_match_adapter_wildcards: bool,

    /// Discard adaptor matches more probable by chance than this
    #[arg(long)]
    adapter_max_rmp: Option<f64>,

    /// Try to remove adaptors this many times per read
    #[arg(long, default_value_t = 1)]
    times: usize,

    /// How adaptors are located
    #[arg(long, value_enum, default_value_t = AlignerKind::Adapter)]
    aligner: AlignerKind,

    /// What to do with a matched adaptor
    #[arg(long, value_enum, default_value_t = ActionArg::Trim)]
    action: ActionArg,

    /// Maximum mismatch fraction in the insert overlap
    #[arg(long, default_value_t = 0.2)]
    #[arg(value_parser = prob_range)]
    insert_match_error_rate: f64,

    /// Random-match probability cutoff for the insert overlap
    #[arg(long, default_value_t = 1e-6)]
    insert_max_rmp: f64,

    /// Quality score cutoff for the 3' end
    #[arg(short, long, default_value_t = 0)]
    qual_cutoff: u8,

    /// Quality score cutoff for the 5' end
    #[arg(long, default_value_t = 0)]
    qual_cutoff_front: u8,

    /// Two-color (NextSeq) quality cutoff for the 3' end of read 1
    #[arg(long)]
    nextseq_trim: Option<u8>,

    /// Offset added to encoded quality scores
    #[arg(long, default_value_t = 33)]
    quality_base: u8,

    /// Remove this many bases from read 1 (negative counts from the 3' end)
    #[arg(short = 'u', long = "cut")]
    cut: Vec<i64>,

    /// Remove this many bases from read 2
    #[arg(short = 'U', long = "cut2")]
    cut2: Vec<i64>,

    /// Guarantee at least this many bases removed from read 1
    #[arg(long)]
    cut_min: Vec<i64>,

    /// Guarantee at least this many bases removed from read 2
    #[arg(long)]
    cut_min2: Vec<i64>,

    /// Trim N bases from both read ends
    #[arg(long)]
    trim_n: bool,

    /// Rewrite this token in read names to the trimmed length
    #[arg(long)]
    length_tag: Option<String>,

    /// Remove these suffixes from read names
    #[arg(long)]
    strip_suffix: Vec<String>,

    /// Add this prefix to read names
    #[arg(short = 'x', long)]
    prefix: Option<String>,

    /// Add this suffix to read names
    #[arg(short = 'y', long)]
    suffix: Option<String>,

    /// Raise quality scores below the encoding base to the base
    #[arg(long)]
    zero_cap: bool,

    /// Overwrite a low-quality read with its mate: LOWQ,HIGHQ,WINDOW
    #[arg(long)]
    overwrite_low_quality: Option<String>,

    /// Merge fully overlapping pairs into single reads
    #[arg(long)]
    merge_overlapping: bool,

    /// Minimum overlap for merging pairs
    #[arg(long, default_value_t = 30)]
    merge_min_overlap: usize,

    /// Maximum error rate of the merge overlap
    #[arg(long, default_value_t = 0.1)]
    #[arg(value_parser = prob_range)]
    merge_error_rate: f64,

    /// Discard reads shorter than this after trimming
    #[arg(short = 'm', long)]
    minimum_length: Option<usize>,

    /// Discard reads longer than this after trimming
    #[arg(short = 'M', long)]
    maximum_length: Option<usize>,

    /// Discard reads with more than this many N bases (fraction if < 1)
    #[arg(long)]
    max_n: Option<f64>,

    /// Discard reads in which an adaptor was found
    #[arg(long)]
    discard_trimmed: bool,

    /// Discard reads in which no adaptor was found
    #[arg(long)]
    discard_untrimmed: bool,

    /// Write too-short reads here instead of discarding them
    #[arg(long)]
    too_short_output: Option<PathBuf>,

    /// Second too-short output for paired reads
    #[arg(long, requires = "too_short_output")]
    too_short_paired_output: Option<PathBuf>,

    /// Write too-long reads here instead of discarding them
    #[arg(long)]
    too_long_output: Option<PathBuf>,

    /// Second too-long output for paired reads
    #[arg(long, requires = "too_long_output")]
    too_long_paired_output: Option<PathBuf>,

    /// Write untrimmed reads here instead of the main output
    #[arg(long)]
    untrimmed_output: Option<PathBuf>,

    /// Second untrimmed output for paired reads
    #[arg(long, requires = "untrimmed_output")]
    untrimmed_paired_output: Option<PathBuf>,

    /// Write merged pairs here
    #[arg(long)]
    merged_output: Option<PathBuf>,

    /// Interleave both mates into this single output
    #[arg(long, conflicts_with = "pout")]
    interleaved_output: Option<PathBuf>,

    /// Write the unmatched remainder of each adaptor match here
    #[arg(long)]
    rest_file: Option<PathBuf>,

    /// Write one match-description line per read here
    #[arg(long)]
    info_file: Option<PathBuf>,

    /// Write bases matched by adaptor wildcards here
    #[arg(long)]
    wildcard_file: Option<PathBuf>,

    /// Order of the configurable trimming operations
    #[arg(long, default_value = "WCGQA")]
    op_order: String,

    /// How many mates must match a filter for a pair to be filtered
    #[arg(long, value_enum, default_value_t = PairFilter::Any)]
    pair_filter: PairFilter,

    /// Worker threads; single-threaded when absent
    #[arg(short, long, value_parser = thread_range)]
    threads: Option<u32>,

    /// Seconds a queue may block before log messages escalate
    #[arg(long, default_value_t = 30)]
    process_timeout: u64,

    /// Make multi-threaded output byte-identical to a serial run
    #[arg(long)]
    preserve_order: bool,

    /// Input queue capacity in batches; 0 is unbounded
    #[arg(long, default_value_t = 0)]
    read_queue_size: usize,

    /// Result queue capacity in batches; 0 is unbounded
    #[arg(long, default_value_t = 0)]
    result_queue_size: usize,

    /// Let each worker write its own suffixed outputs
    #[arg(long)]
    no_writer_thread: bool,

    /// Who compresses compressible outputs
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,

    /// Reads per batch
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,
}

fn is_readable(filename: &PathBuf) -> bool {
    use std::fs::File;
    let mut f = match File::open(filename) {
        Ok(file) => file,
        _ => return false,
    };
    let mut byte = [0_u8];
    use std::io::Read;
    f.read_exact(&mut byte).is_ok()
}

/// '^SEQ' anchors a 5' adaptor, 'SEQ$' anchors a 3' adaptor.
fn parse_adapter(
    args: &Args,
    text: &str,
    location: Where,
    rmp: &RandomMatchProbability,
) -> Adapter {
    let (sequence, location) = match location {
        Where::Front if text.starts_with('^') => (&text[1..], Where::AnchoredFront),
        Where::Back if text.ends_with('$') => (&text[..text.len() - 1], Where::AnchoredBack),
        other => (text, other),
    };
    Adapter::new(sequence, sequence.as_bytes(), location)
        .max_error_rate(args.error_rate)
        .min_overlap(args.overlap)
        .indels(!args.no_indels, args.indel_cost)
        .wildcards(args.match_read_wildcards, !args.no_match_adapter_wildcards)
        .max_rmp(args.adapter_max_rmp, rmp.clone())
}

fn parse_adapters(args: &Args, rmp: &RandomMatchProbability) -> (Vec<Adapter>, Vec<Adapter>) {
    let mut adapters1 = Vec::new();
    let mut adapters2 = Vec::new();
    for (texts, location, list) in [
        (&args.adapters, Where::Back, 1),
        (&args.front, Where::Front, 1),
        (&args.anywhere, Where::Anywhere, 1),
        (&args.adapters2, Where::Back, 2),
        (&args.front2, Where::Front, 2),
        (&args.anywhere2, Where::Anywhere, 2),
    ] {
        for text in texts {
            let adapter = parse_adapter(args, text, location, rmp);
            if list == 1 {
                adapters1.push(adapter);
            } else {
                adapters2.push(adapter);
            }
        }
    }
    (adapters1, adapters2)
}

fn parse_overwrite(text: &str) -> Result<OverwriteRead, String> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        return Err("expected LOWQ,HIGHQ,WINDOW".to_string());
    }
    let lowq = parts[0].parse::<f64>().map_err(stringify)?;
    let highq = parts[1].parse::<f64>().map_err(stringify)?;
    let window = parts[2].parse::<usize>().map_err(stringify)?;
    Ok(OverwriteRead::new(lowq, highq, window, 33))
}

fn build_modifiers(
    args: &Args,
    adapters1: Vec<Adapter>,
    adapters2: Vec<Adapter>,
    rmp: &RandomMatchProbability,
) -> Result<Modifiers, Box<dyn Error>> {
    let paired = args.pfastq.is_some();
    let action = match args.action {
        ActionArg::Trim => Action::Trim,
        ActionArg::Mask => Action::Mask,
    };
    let mut adapters1 = Some(adapters1);
    let mut adapters2 = Some(adapters2);
    let mut modifiers = Modifiers::new(paired);

    for op in TrimOp::parse_order(&args.op_order)? {
        match op {
            TrimOp::OverwriteLowQuality => {
                if let Some(text) = args.overwrite_low_quality.as_deref() {
                    let mut overwrite = parse_overwrite(text)?;
                    overwrite.base = args.quality_base;
                    modifiers.add_paired(overwrite)?;
                }
            }
            TrimOp::AdapterCut => {
                let a1 = adapters1.take().unwrap_or_default();
                let a2 = adapters2.take().unwrap_or_default();
                if a1.is_empty() && a2.is_empty() {
                    continue;
                }
                if args.aligner == AlignerKind::Insert {
                    let [adapter1] = <[Adapter; 1]>::try_from(a1).map_err(|_| {
                        "insert aligner requires a single 3' adapter for each read"
                    })?;
                    let [adapter2] = <[Adapter; 1]>::try_from(a2).map_err(|_| {
                        "insert aligner requires a single 3' adapter for each read"
                    })?;
                    if adapter1.location != Where::Back || adapter2.location != Where::Back {
                        Err("insert aligner requires a single 3' adapter for each read")?;
                    }
                    let mut cutter =
                        InsertAdapterCutter::new(adapter1, adapter2, action, rmp.clone());
                    cutter.aligner_mut().max_insert_mismatch_frac =
                        args.insert_match_error_rate;
                    cutter.aligner_mut().insert_max_rmp = args.insert_max_rmp;
                    modifiers.add_paired(cutter)?;
                } else {
                    let cutter1 =
                        (!a1.is_empty()).then(|| AdapterCutter::new(a1, args.times, action));
                    let cutter2 =
                        (!a2.is_empty()).then(|| AdapterCutter::new(a2, args.times, action));
                    modifiers.add_single_pair(cutter1, cutter2);
                }
            }
            TrimOp::UnconditionalCut => {
                let cutter1 =
                    (!args.cut.is_empty()).then(|| UnconditionalCutter::new(args.cut.clone()));
                let cutter2 =
                    (!args.cut2.is_empty()).then(|| UnconditionalCutter::new(args.cut2.clone()));
                modifiers.add_single_pair(cutter1, cutter2);
            }
            TrimOp::TwoColorQualityTrim => {
                if let Some(cutoff) = args.nextseq_trim {
                    modifiers.add_single(
                        Side::First,
                        TwoColorQualityTrimmer::new(cutoff, args.quality_base),
                    );
                }
            }
            TrimOp::QualityTrim => {
                if args.qual_cutoff > 0 || args.qual_cutoff_front > 0 {
                    modifiers.add_single(
                        Side::Both,
                        QualityTrimmer::new(
                            args.qual_cutoff_front,
                            args.qual_cutoff,
                            args.quality_base,
                        ),
                    );
                }
            }
        }
    }

    if args.trim_n {
        modifiers.add_single(Side::Both, NEndTrimmer);
    }
    let min1 = (!args.cut_min.is_empty()).then(|| MinCutter::new(args.cut_min.clone()));
    let min2 = (!args.cut_min2.is_empty()).then(|| MinCutter::new(args.cut_min2.clone()));
    modifiers.add_single_pair(min1, min2);
    if let Some(tag) = args.length_tag.as_deref() {
        modifiers.add_single(Side::Both, LengthTagModifier::new(tag)?);
    }
    if !args.strip_suffix.is_empty() {
        let suffixes = args.strip_suffix.iter().map(|s| s.as_bytes().to_vec()).collect();
        modifiers.add_single(Side::Both, SuffixRemover::new(suffixes));
    }
    if args.prefix.is_some() || args.suffix.is_some() {
        modifiers.add_single(
            Side::Both,
            PrefixSuffixAdder::new(
                args.prefix.as_deref().unwrap_or("").as_bytes(),
                args.suffix.as_deref().unwrap_or("").as_bytes(),
            ),
        );
    }
    if args.zero_cap {
        modifiers.add_single(Side::Both, ZeroCapper::new(args.quality_base));
    }
    if args.merge_overlapping {
        modifiers.add_paired(MergeOverlapping::new(
            args.merge_min_overlap,
            args.merge_error_rate,
        ))?;
    }
    Ok(modifiers)
}

fn build_filters_and_formatters(args: &Args) -> (Filters, Formatters, Vec<PathBuf>) {
    let min_affected = match args.pair_filter {
        PairFilter::Any => 1,
        PairFilter::Both => 2,
    };
    let mut filters = Filters::new(min_affected);
    let interleaved = args.interleaved_output.is_some();
    let mut formatters = Formatters::new(interleaved);
    let mut force_create = Vec::new();

    if args.merge_overlapping {
        filters.add_filter(FilterKind::Merged);
        if let Some(path) = args.merged_output.clone() {
            formatters.add_seq_formatter(Dest::Merged, path, None);
        }
    }
    if let Some(min) = args.minimum_length {
        if min > 0 {
            filters.add_filter(FilterKind::TooShort(min));
            if let Some(path) = args.too_short_output.clone() {
                formatters.add_seq_formatter(
                    Dest::TooShort,
                    path,
                    args.too_short_paired_output.clone(),
                );
            }
        }
    }
    if let Some(max) = args.maximum_length {
        filters.add_filter(FilterKind::TooLong(max));
        if let Some(path) = args.too_long_output.clone() {
            formatters.add_seq_formatter(
                Dest::TooLong,
                path,
                args.too_long_paired_output.clone(),
            );
        }
    }
    if let Some(limit) = args.max_n {
        filters.add_filter(FilterKind::NContent(limit));
    }
    if args.discard_trimmed {
        filters.add_filter(FilterKind::Trimmed);
    }
    if args.discard_untrimmed || args.untrimmed_output.is_some() {
        filters.add_filter(FilterKind::Untrimmed);
    }
    if let Some(path) = args.untrimmed_output.clone() {
        formatters.add_seq_formatter(
            Dest::Untrimmed,
            path,
            args.untrimmed_paired_output.clone(),
        );
    }

    let output1 = args.interleaved_output.clone().unwrap_or_else(|| args.out.clone());
    let output2 = if interleaved { None } else { args.pout.clone() };
    force_create.push(output1.clone());
    if let Some(p) = output2.as_ref() {
        force_create.push(p.clone());
    }
    formatters.add_seq_formatter(Dest::None, output1, output2);

    if let Some(path) = args.rest_file.clone() {
        formatters.add_info_formatter(InfoFormatter::Rest(path));
    }
    if let Some(path) = args.info_file.clone() {
        formatters.add_info_formatter(InfoFormatter::Info(path));
    }
    if let Some(path) = args.wildcard_file.clone() {
        formatters.add_info_formatter(InfoFormatter::Wildcard(path));
    }
    (filters, formatters, force_create)
}

fn report(summary: &Summary) {
    info!(
        "{} mode with {} thread{} processed {} records in {} batches",
        summary.mode,
        summary.threads,
        if summary.threads > 1 { "s" } else { "" },
        summary.records,
        summary.batches
    );
    info!(
        "basepairs processed: {} (read 1), {} (read 2)",
        summary.total_bp1, summary.total_bp2
    );
    for (dest, count) in &summary.destinations {
        info!("records routed to {}: {}", dest.label(), count);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "warn" }),
    )
    .init();

    if !is_readable(&args.fastq) {
        return Err(format!("file not readable: {}", args.fastq.display()))?;
    }
    if let Some(ref pfastq) = args.pfastq {
        if !is_readable(pfastq) {
            return Err(format!("file not readable: {}", pfastq.display()))?;
        }
    }

    if args.verbose {
        info!("input1: {} [{}]", args.fastq.display(), FFmt::from_file(&args.fastq)?);
        info!("output1: {}", args.out.display());
        if let (Some(pfastq), Some(pout)) = (&args.pfastq, &args.pout) {
            info!("input2: {} [{}]", pfastq.display(), FFmt::from_file(pfastq)?);
            info!("output2: {}", pout.display());
        }
        info!("quality cutoff: {}", args.qual_cutoff);
        info!("error rate: {}", args.error_rate);
        info!("overlap needed: {}", args.overlap);
        info!("batch size: {}", args.batch_size);
        info!("threads requested: {:?}", args.threads);
        info!("detected cores: {}", num_cpus::get());
    }

    let rmp = RandomMatchProbability::new();
    let (adapters1, adapters2) = parse_adapters(&args, &rmp);

    let no_trimming = adapters1.is_empty()
        && adapters2.is_empty()
        && args.qual_cutoff == 0
        && args.qual_cutoff_front == 0
        && args.nextseq_trim.is_none()
        && args.cut.is_empty()
        && args.cut2.is_empty()
        && args.cut_min.is_empty()
        && args.cut_min2.is_empty()
        && args.minimum_length.is_none()
        && args.maximum_length.is_none()
        && args.max_n.is_none()
        && !args.trim_n
        && args.overwrite_low_quality.is_none()
        && !args.merge_overlapping;
    if no_trimming {
        return Err("you need to provide at least one adapter or trimming operation")?;
    }

    let num_adapters = adapters1.len() + adapters2.len();
    info!(
        "trimming {} adapter{} with at most {:.1}% errors in {} mode",
        num_adapters,
        if num_adapters == 1 { "" } else { "s" },
        args.error_rate * 100.0,
        if args.pfastq.is_some() { "paired-end" } else { "single-end" }
    );

    let modifiers = build_modifiers(&args, adapters1, adapters2, &rmp)?;
    let (filters, formatters, force_create) = build_filters_and_formatters(&args);
    let mut pipeline = Pipeline::new(modifiers, filters);

    let mut reader =
        FastqReader::open(&args.fastq, args.pfastq.as_deref(), args.batch_size)?;

    let summary = match args.threads {
        None => {
            let mut writers = Writers::new();
            writers.force_create(&force_create, false)?;
            run_serial(&mut reader, &mut pipeline, &formatters, &mut writers, None)?
        }
        Some(threads) => {
            let compression = match args.compression {
                Some(CompressionArg::Worker) => Compression::Worker,
                Some(CompressionArg::Writer) => Compression::Writer,
                None if args.no_writer_thread => Compression::Worker,
                None => Compression::Writer,
            };
            let opts = ParallelOptions {
                threads: threads as usize,
                timeout: Duration::from_secs(args.process_timeout),
                preserve_order: args.preserve_order,
                input_queue_size: args.read_queue_size,
                result_queue_size: args.result_queue_size,
                use_writer_thread: !args.no_writer_thread,
                compression,
            };
            let mut writers = Writers::new();
            if opts.use_writer_thread {
                writers.force_create(&force_create, compression == Compression::Worker)?;
            }
            run_parallel(&mut reader, &pipeline, &formatters, writers, &opts, None)?
        }
    };

    report(&summary);
    Ok(())
}
