use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::aggregate::Aggregate;
use crate::error::{CustomError, Result};
use crate::extract::alignments::extract_data_summary;
use crate::extract::deez::{self, extract_deez};
use crate::extract::elapsed::extract_elapsed;
use crate::extract::listing::extract_size_listing;
use crate::extract::quip::{self, extract_quip};
use crate::extract::referee::{extract_sequence_log, extract_stream_log, summarize_quality};
use crate::extract::sweep::extract_sweep_listing;
use crate::locator::{ArtifactLocator, Stream, TIMING_LOGS, existing};
use crate::model::{Measure, Metric, MetricRecord, RecordBuilder, SENTINEL, SweepValue, Variant};
use crate::output::latex::LatexTable;
use crate::output::summary::{
    SIZE_TYPES, SweepRow, SweepSummary, read_size_summary, write_alignment_counts,
    write_size_summary,
};
use crate::output::{
    bits_per_base, format_count, format_elapsed, format_mib, format_number,
    format_size_with_rate, latex_escape, mib, round1, round2, write_json,
};
use crate::samples::read_lengths;
use crate::{Args, Command};

/// What to do with a sample whose log is malformed or inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    SkipSample,
    AbortBatch,
}

impl FailurePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            FailurePolicy::AbortBatch
        } else {
            FailurePolicy::SkipSample
        }
    }

    /// `Ok(None)` when the failure was logged and the sample dropped.
    pub fn settle<T>(self, label: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self == FailurePolicy::SkipSample && e.is_sample_local() => {
                error!("Skipping {label}: {}", error_chain(&e));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`settle`](Self::settle) for a log that may not exist at all.
    pub fn settle_found<T>(self, label: &str, found: Option<Result<T>>) -> Result<Option<T>> {
        match found {
            Some(result) => self.settle(label, result),
            None => Ok(None),
        }
    }
}

fn error_chain(err: &dyn Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Parse a `FROM=TO` label alias.
pub fn parse_alias(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.is_empty() => Ok((from.to_string(), to.to_string())),
        _ => Err(format!("expected FROM=TO, got \"{raw}\"")),
    }
}

/// Row label for `sample`: the first alias whose key occurs in the name,
/// escaped for LaTeX.
fn display_label(sample: &str, aliases: &[(String, String)]) -> String {
    let label = aliases
        .iter()
        .find(|(from, _)| sample.contains(from.as_str()))
        .map_or(sample, |(_, to)| to.as_str());
    latex_escape(label)
}

fn progress_bar(len: usize, what: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template(&format!("[{{elapsed_precise}}] {{bar:30}} {{pos}}/{{len}} {what}"))
    {
        pb.set_style(style);
    }
    pb
}

/// Apply `f` to every item, in parallel unless the batch is small or one
/// thread was requested. Results keep the input order.
pub fn extract_each<T, R, F>(items: &[T], threads: Option<usize>, what: &str, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    const PARALLEL_THRESHOLD: usize = 8;
    let pb = progress_bar(items.len(), what);
    let step = |item: &T| {
        let out = f(item);
        pb.inc(1);
        out
    };

    let results: Vec<R> =
        if (threads.is_none() && items.len() < PARALLEL_THRESHOLD) || threads == Some(1) {
            items.iter().map(step).collect()
        } else if let Some(n) = threads {
            let pool = ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(|| items.par_iter().map(step).collect::<Vec<R>>())
        } else {
            items.par_iter().map(step).collect()
        };
    pb.finish_and_clear();
    Ok(results)
}

fn print_report(render: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(&mut out)
        .and_then(|_| out.flush())
        .map_err(|source| CustomError::Stdout { source })
}

fn print_table(table: &LatexTable) -> Result<()> {
    print_report(|out| out.write_all(table.render().as_bytes()))
}

fn dump_json(aggregate: &Aggregate, json: Option<&Path>) -> Result<()> {
    if let Some(path) = json {
        write_json(aggregate, path)?;
        info!("Wrote metrics to {}", path.display());
    }
    Ok(())
}

pub fn run(args: Args) -> Result<()> {
    let policy = FailurePolicy::from_strict(args.strict);
    let threads = args.threads;
    match args.command {
        Command::Sizes {
            listing,
            methods,
            sort_by,
            aliases,
            summary,
            summary_method,
            json,
        } => run_sizes(
            &listing,
            &methods,
            &sort_by,
            &aliases,
            &summary,
            &summary_method,
            json.as_deref(),
        ),
        Command::Breakdown {
            summary,
            method,
            json,
        } => run_breakdown(&summary, &method, json.as_deref()),
        Command::Timings { dir, stems, json } => {
            run_timings(&dir, &stems, threads, policy, json.as_deref())
        }
        Command::Seq {
            read_lengths,
            prefixes,
            json,
        } => run_seq(&read_lengths, &prefixes, threads, policy, json.as_deref()),
        Command::Sweep {
            listing,
            log_dir,
            read_len,
            output,
            json,
        } => run_sweep(
            &listing,
            log_dir.as_deref(),
            read_len,
            output.as_deref(),
            policy,
            json.as_deref(),
        ),
        Command::SweepTable { summary } => run_sweep_table(&summary),
        Command::Alignments {
            summary,
            read_lengths,
            wgs,
            output,
            json,
        } => run_alignments(
            &summary,
            read_lengths.as_deref(),
            &wgs,
            &output,
            json.as_deref(),
        ),
        Command::QuipQuals { log } => run_quip_quals(&log, policy),
        Command::QualDetails { log } => run_qual_details(&log, policy),
    }
}

// sizes

fn method_total(variants: &BTreeMap<Variant, MetricRecord>, method: &str) -> Measure {
    variants
        .get(&Variant::method(method))
        .map_or(Measure::Missing, MetricRecord::stream_total)
}

/// Smallest size of a row, and the next best size. A runner-up more than ten
/// times the best is capped at ten times the best.
fn best_and_runner_up(cells: &[Measure]) -> Option<(f64, f64)> {
    let values: Vec<f64> = cells.iter().filter_map(|c| c.value()).collect();
    let best = values.iter().copied().reduce(f64::min)?;
    let cap = best * 10.0;
    let runner_up = values
        .iter()
        .copied()
        .filter(|&v| v > best && v < cap)
        .fold(cap, f64::min);
    Some((best, runner_up))
}

/// Improvement of the best size over the next best, as a table cell.
fn gap_percent(best: f64, next: f64) -> String {
    if next == 0.0 {
        SENTINEL.to_string()
    } else {
        format!("{:.1}\\%", round1((1.0 - best / next) * 100.0))
    }
}

pub fn sizes_table(
    aggregate: &Aggregate,
    order: &[&str],
    methods: &[String],
    aliases: &[(String, String)],
) -> LatexTable {
    let mut header = vec!["File".to_string()];
    header.extend(methods.iter().map(|m| latex_escape(m)));
    let mut table = LatexTable::with_label_column(header, methods.len());

    for &sample in order {
        let Some(variants) = aggregate.variants(sample) else {
            continue;
        };
        let cells: Vec<Measure> = methods
            .iter()
            .map(|m| method_total(variants, m).map(|b| round2(mib(b))))
            .collect();
        let best = best_and_runner_up(&cells);

        let mut row = vec![display_label(sample, aliases)];
        for cell in &cells {
            let text = match (cell, best) {
                (Measure::Value(v), Some((min, next))) if *v == min => format!(
                    "\\textbf{{{}}} ({})",
                    format_number(*cell),
                    gap_percent(min, next)
                ),
                _ => format_number(*cell),
            };
            row.push(text);
        }
        table.push_row(row);
    }
    table
}

fn run_sizes(
    listing: &Path,
    methods: &[String],
    sort_by: &str,
    aliases: &[(String, String)],
    summary: &Path,
    summary_method: &str,
    json: Option<&Path>,
) -> Result<()> {
    let entries = extract_size_listing(listing)?;
    let mut aggregate = Aggregate::new();
    aggregate.extend(entries.into_iter().map(|e| (e.sample, e.variant, e.record)));
    if aggregate.is_empty() {
        warn!("No size entries in {}", listing.display());
    }
    info!(
        "Read sizes of {} samples from {}",
        aggregate.len(),
        listing.display()
    );

    let order = aggregate.ordered_by(|v| method_total(v, sort_by));
    print_table(&sizes_table(&aggregate, &order, methods, aliases))?;

    let written = write_size_summary(&aggregate, &order, summary_method, summary)?;
    info!(
        "Wrote {summary_method} sizes of {written} samples to {}",
        summary.display()
    );
    dump_json(&aggregate, json)
}

// breakdown

/// Data types present for `method`, known types first.
fn breakdown_types(aggregate: &Aggregate, method: &Variant) -> Vec<String> {
    let mut seen = BTreeSet::new();
    for sample in aggregate.samples() {
        if let Some(record) = aggregate.get(sample, method) {
            seen.extend(record.streams().map(|(name, _)| name.to_string()));
        }
    }
    let mut types: Vec<String> = SIZE_TYPES
        .iter()
        .filter(|t| seen.remove(**t))
        .map(|t| t.to_string())
        .collect();
    types.extend(seen);
    types
}

pub fn breakdown_table(aggregate: &Aggregate, method: &str) -> LatexTable {
    let variant = Variant::method(method);
    let types = breakdown_types(aggregate, &variant);

    let mut header = vec!["File".to_string(), "Total".to_string()];
    header.extend(types.iter().map(|t| latex_escape(t)));
    header.push("Other".to_string());
    let mut table = LatexTable::with_label_column(header, types.len() + 2);

    let order = aggregate.ordered_by(|v| method_total(v, method));
    for sample in order {
        let Some(record) = aggregate.get(sample, &variant) else {
            warn!("{sample} has no {method} sizes");
            continue;
        };
        let total = record.stream_total();
        let share = |bytes: Measure| match (bytes, total) {
            (Measure::Value(b), Measure::Value(t)) if t > 0.0 => Measure::Value(b * 100.0 / t),
            _ => Measure::Missing,
        };

        let mut row = vec![latex_escape(sample), format_count(total)];
        for t in &types {
            row.push(format_number(share(record.measure(&Metric::stream(t.as_str())))));
        }
        // everything except sequence and alignment fields
        let core = record.stream_sum(["seq", "fields"]);
        row.push(format_number(share(core).map(|p| 100.0 - p)));
        table.push_row(row);
    }
    table
}

fn run_breakdown(summary: &Path, method: &str, json: Option<&Path>) -> Result<()> {
    let aggregate = read_size_summary(summary)?;
    info!("Breaking down {method} sizes from {}", summary.display());
    let table = breakdown_table(&aggregate, method);
    if table.n_rows() == 0 {
        warn!("No sample in {} has {method} sizes", summary.display());
    }
    print_table(&table)?;
    dump_json(&aggregate, json)
}

// timings

fn run_timings(
    dir: &Path,
    stems: &[String],
    threads: Option<usize>,
    policy: FailurePolicy,
    json: Option<&Path>,
) -> Result<()> {
    let found = extract_each(stems, threads, "samples", |stem| {
        let loc = ArtifactLocator::new(dir, stem.as_str());
        TIMING_LOGS.map(|(_, suffix)| existing(loc.log_path(suffix)).map(|p| extract_elapsed(&p)))
    })?;

    let mut aggregate = Aggregate::new();
    let mut header = vec!["File".to_string()];
    header.extend(TIMING_LOGS.iter().map(|(method, _)| method.to_string()));
    let mut table = LatexTable::with_label_column(header, TIMING_LOGS.len());

    for (stem, logs) in stems.iter().zip(found) {
        let mut row = vec![latex_escape(stem)];
        for ((method, _), log) in TIMING_LOGS.iter().zip(logs) {
            let record = policy.settle_found(&format!("{stem} ({method})"), log)?;
            let secs = record
                .as_ref()
                .map_or(Measure::Missing, |r| r.measure(&Metric::ElapsedSecs));
            row.push(format_elapsed(secs));
            if let Some(record) = record {
                aggregate.insert(stem, Variant::method(*method), record);
            }
        }
        table.push_row(row);
    }
    print_table(&table)?;
    dump_json(&aggregate, json)
}

// seq

struct SeqLogs {
    referee: MetricRecord,
    deez: Option<Result<MetricRecord>>,
    quip: Option<Result<MetricRecord>>,
}

fn locate_seq_logs(prefix: &str) -> SeqLogs {
    let loc = ArtifactLocator::from_prefix(prefix);
    SeqLogs {
        referee: loc.stream_sizes(&Stream::ALL),
        deez: existing(PathBuf::from(format!("{prefix}stripped.deez.log")))
            .map(|p| extract_deez(&p)),
        quip: existing(PathBuf::from(format!("{prefix}stripped.quip.log")))
            .map(|p| extract_quip(&p)),
    }
}

fn run_seq(
    read_lengths_path: &Path,
    prefixes: &[String],
    threads: Option<usize>,
    policy: FailurePolicy,
    json: Option<&Path>,
) -> Result<()> {
    let info = read_lengths(&read_lengths_path)?;
    let wanted: Vec<(&String, String)> = prefixes
        .iter()
        .filter_map(|prefix| {
            let stem = ArtifactLocator::from_prefix(prefix).stem().to_string();
            if info.contains_key(&stem) {
                Some((prefix, stem))
            } else {
                warn!("Read info not available for {stem}");
                None
            }
        })
        .collect();

    let found = extract_each(&wanted, threads, "samples", |(prefix, _)| {
        locate_seq_logs(prefix)
    })?;

    let mut aggregate = Aggregate::new();
    let header = [
        "File",
        "$|r|$",
        "Total bases",
        "Referee",
        "Deez",
        "Quip",
        "Error rate",
        "Depth",
    ]
    .map(String::from)
    .to_vec();
    let mut table = LatexTable::new("l c r r r r r r", header);

    for ((_, stem), logs) in wanted.iter().zip(found) {
        let Some(read) = info.get(stem) else {
            continue;
        };
        let bases = read.total_bases();

        let deez = policy.settle_found(&format!("{stem} (Deez)"), logs.deez)?;
        let quip = policy.settle_found(&format!("{stem} (Quip)"), logs.quip)?;

        let deez_cell = deez.as_ref().map_or(SENTINEL.to_string(), |r| {
            format_size_with_rate(deez::sequence_bytes(r), deez::total_bases(r, read.read_len))
        });
        let quip_cell = quip.as_ref().map_or(SENTINEL.to_string(), |r| {
            format_size_with_rate(quip::compressed(r, "seq"), quip::original(r, "seq"))
        });

        table.push_row(vec![
            latex_escape(stem),
            read.read_len.to_string(),
            format_count(bases),
            format_size_with_rate(
                logs.referee.stream_sum(Stream::SEQUENCE.map(Stream::name)),
                bases,
            ),
            deez_cell,
            quip_cell,
            SENTINEL.to_string(),
            SENTINEL.to_string(),
        ]);

        let mut base = RecordBuilder::new();
        base.set(Metric::ReadLength, read.read_len as f64);
        base.set(Metric::Alignments, read.aligned as f64);
        aggregate.insert(stem, Variant::Base, base.finish());
        if !logs.referee.is_empty() {
            aggregate.insert(stem, Variant::method("Referee"), logs.referee);
        }
        if let Some(record) = deez {
            aggregate.insert(stem, Variant::method("Deez"), record);
        }
        if let Some(record) = quip {
            aggregate.insert(stem, Variant::method("Quip"), record);
        }
    }
    print_table(&table)?;
    dump_json(&aggregate, json)
}

// sweep

/// Per-sample bits per base, edits per read and size for every sweep value.
pub fn sweep_summary(aggregate: &Aggregate, read_len: u64) -> SweepSummary {
    let values: Vec<SweepValue> = aggregate
        .variant_keys()
        .into_iter()
        .filter_map(|v| match v {
            Variant::Sweep(z) => Some(z),
            _ => None,
        })
        .collect();

    let rows = aggregate
        .samples()
        .map(|sample| {
            let mut row = SweepRow {
                sample: sample.to_string(),
                bits_per_base: Vec::with_capacity(values.len()),
                edits_per_read: Vec::with_capacity(values.len()),
                size_mib: Vec::with_capacity(values.len()),
            };
            for &z in &values {
                let Some(record) = aggregate.get(sample, &Variant::Sweep(z)) else {
                    row.bits_per_base.push(Measure::Missing);
                    row.edits_per_read.push(Measure::Missing);
                    row.size_mib.push(Measure::Missing);
                    continue;
                };
                let bytes = record.stream_total();
                let reads = record.measure(&Metric::TotalReads);
                row.bits_per_base
                    .push(bits_per_base(bytes, reads.map(|r| r * read_len as f64)));
                row.edits_per_read.push(
                    match (record.measure(&Metric::EditCount), reads) {
                        (Measure::Value(e), Measure::Value(n)) if n > 0.0 => Measure::Value(e / n),
                        _ => Measure::Missing,
                    },
                );
                row.size_mib.push(bytes.map(mib));
            }
            row
        })
        .collect();
    SweepSummary { values, rows }
}

fn run_sweep(
    listing: &Path,
    log_dir: Option<&Path>,
    read_len: u64,
    output: Option<&Path>,
    policy: FailurePolicy,
    json: Option<&Path>,
) -> Result<()> {
    let cells = extract_sweep_listing(listing)?;
    let log_dir = log_dir
        .map(Path::to_path_buf)
        .or_else(|| listing.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let mut aggregate = Aggregate::new();
    for cell in cells {
        let loc = ArtifactLocator::new(&log_dir, cell.sample.as_str());
        let log = existing(loc.sweep_log_path(cell.z)).map(|p| extract_sequence_log(&p));
        let label = format!("{} z={}", cell.sample, cell.z);
        let mut record = policy.settle_found(&label, log)?.unwrap_or_default();
        // edit counts in the listing take precedence over the log
        record.absorb(cell.record);

        let mut extra = RecordBuilder::new();
        extra.set(Metric::ReadLength, read_len as f64);
        if let (None, Some(reads)) = (record.get(&Metric::TotalReads), cell.window_reads) {
            extra.set(Metric::TotalReads, reads as f64);
        }
        record.absorb(extra.finish());
        aggregate.insert(&cell.sample, Variant::Sweep(cell.z), record);
    }

    let summary = sweep_summary(&aggregate, read_len);
    match output {
        Some(path) => {
            let f = File::create(path).map_err(|e| CustomError::Write {
                source: e,
                path: path.to_path_buf(),
            })?;
            let mut writer = BufWriter::new(f);
            summary
                .write_to(&mut writer)
                .and_then(|_| writer.flush())
                .map_err(|e| CustomError::Write {
                    source: e,
                    path: path.to_path_buf(),
                })?;
            info!("Wrote sweep summary to {}", path.display());
        }
        None => print_report(|mut out| summary.write_to(&mut out))?,
    }
    dump_json(&aggregate, json)
}

pub fn sweep_table(summary: &SweepSummary) -> LatexTable {
    let mut header = vec!["File".to_string(), "Metric".to_string()];
    header.extend(summary.values.iter().map(|z| format!("$z={z}$")));
    let columns = format!("l l{}", " r".repeat(summary.values.len()));
    let mut table = LatexTable::new(columns, header);

    for row in &summary.rows {
        let metrics = [
            (latex_escape(&row.sample), "bpb", &row.bits_per_base),
            (String::new(), "edits/read", &row.edits_per_read),
            (String::new(), "MiB", &row.size_mib),
        ];
        for (label, metric, cells) in metrics {
            let mut line = vec![label, metric.to_string()];
            line.extend(cells.iter().map(|&c| format_number(c)));
            table.push_row(line);
        }
    }
    table
}

fn run_sweep_table(summary: &Path) -> Result<()> {
    let summary = SweepSummary::read(summary)?;
    print_table(&sweep_table(&summary))
}

// alignments

fn run_alignments(
    summary: &Path,
    read_lengths_path: Option<&Path>,
    wgs: &[String],
    output: &Path,
    json: Option<&Path>,
) -> Result<()> {
    let rows = extract_data_summary(summary)?;
    let lengths = match read_lengths_path {
        Some(path) => read_lengths(&path)?,
        None => BTreeMap::new(),
    };

    write_alignment_counts(&rows, output)?;
    info!("Wrote alignment counts to {}", output.display());

    let header = ["File", "Type", "Read length", "Aligned", "Unaligned", "Error rate"]
        .map(String::from)
        .to_vec();
    let mut table = LatexTable::with_label_column(header, 5);
    let mut aggregate = Aggregate::new();
    for (sample, record) in rows {
        let library = if wgs.iter().any(|w| w == &sample) {
            "WGS"
        } else {
            "RNA-seq"
        };
        let read_len: Measure = lengths.get(&sample).map(|r| r.read_len as f64).into();
        table.push_row(vec![
            latex_escape(&sample),
            library.to_string(),
            format_count(read_len),
            format_count(record.measure(&Metric::Alignments)),
            format_count(record.measure(&Metric::Unaligned)),
            format_number(record.measure(&Metric::ErrorRate)),
        ]);

        aggregate.insert(&sample, Variant::Base, record);
        if let Measure::Value(len) = read_len {
            let mut extra = RecordBuilder::new();
            extra.set(Metric::ReadLength, len);
            aggregate.insert(&sample, Variant::Base, extra.finish());
        }
    }
    print_table(&table)?;
    dump_json(&aggregate, json)
}

// quality logs

fn run_quip_quals(log: &Path, policy: FailurePolicy) -> Result<()> {
    let found = existing(log.to_path_buf()).map(|p| extract_quip(&p));
    let label = log.display().to_string();
    let quals = policy
        .settle_found(&label, found)?
        .map_or(Measure::Missing, |r| quip::compressed(&r, "qual"));
    print_report(|out| writeln!(out, "{}", format_mib(quals)))
}

fn ratio_cell(value: Option<f64>) -> String {
    format_number(value.into())
}

fn run_qual_details(log: &Path, policy: FailurePolicy) -> Result<()> {
    let label = log.display().to_string();
    let Some(stream_log) = policy.settle(&label, extract_stream_log(log))? else {
        return Ok(());
    };
    let summary = summarize_quality(&stream_log);
    if summary.membership_bytes.is_none() {
        warn!("Compressed membership not included");
    }

    print_report(|out| {
        for stream in &summary.streams {
            writeln!(
                out,
                "{} {} {} {}",
                stream.name,
                stream.compressed,
                stream.processed,
                format_number(Measure::Value(stream.ratio()))
            )?;
        }
        if let Some(membership) = &summary.membership {
            writeln!(out, "Membership: {}", membership.display())?;
        }
        let estimated = summary
            .estimated_original
            .map_or(SENTINEL.to_string(), |b| b.to_string());
        writeln!(out, "Original bytes: {estimated}")?;
        writeln!(out, "Total comp size: {}", summary.compressed_total)?;
        writeln!(out, "Estimated compression: {}", ratio_cell(summary.compression()))?;
        writeln!(
            out,
            "Average compression for clusters: {}",
            ratio_cell(summary.cluster_compression())
        )
    })
}
