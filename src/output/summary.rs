//! Flat summary files handed from one command to the next.

use std::io::Write;
use std::path::Path;

use csv::{ReaderBuilder, Terminator, Trim, WriterBuilder};
use itertools::Itertools;
use log::warn;

use crate::aggregate::Aggregate;
use crate::error::{CustomError, Result};
use crate::extract::{Line, Rule, scan_file};
use crate::locator::artifact_size;
use crate::model::{Measure, Metric, MetricRecord, RecordBuilder, SENTINEL, SweepValue, Variant};
use crate::output::{format_count, format_number};

/// Types the per-stream sizes are grouped into, in output order.
pub const SIZE_TYPES: [&str; 5] = ["seq", "quals", "unaligned", "fields", "ids"];

/// Size type of a stream suffix; anything unrecognised is quality data.
pub fn size_type(stream: &str) -> &'static str {
    match stream.split('.').next().unwrap_or(stream) {
        "offs" | "left_clip" | "right_clip" | "edits" | "has_edits" => "seq",
        "unaligned" => "unaligned",
        "opt" | "flags" => "fields",
        "ids" => "ids",
        _ => "quals",
    }
}

/// Per-type byte totals of one record.
pub fn size_breakdown(record: &MetricRecord) -> [(&'static str, f64); SIZE_TYPES.len()] {
    let mut totals = SIZE_TYPES.map(|t| (t, 0.0));
    for (stream, bytes) in record.streams() {
        let t = size_type(stream);
        if let Some(slot) = totals.iter_mut().find(|(name, _)| *name == t) {
            slot.1 += bytes;
        }
    }
    totals
}

/// Write `file, <stem>` / `method, <method>` / `<type>, <bytes>` blocks for
/// every sample in `order` measured with `method`. Returns the block count.
pub fn write_size_summary(
    aggregate: &Aggregate,
    order: &[&str],
    method: &str,
    path: &Path,
) -> Result<usize> {
    let csv_err = |source| CustomError::CsvWrite {
        source,
        path: path.to_path_buf(),
    };
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(csv_err)?;

    let variant = Variant::method(method);
    let mut written = 0;
    for &sample in order {
        let Some(record) = aggregate.get(sample, &variant) else {
            warn!("{sample} has no {method} sizes; left out of {}", path.display());
            continue;
        };
        wtr.write_record(["file", sample]).map_err(csv_err)?;
        wtr.write_record(["method", method]).map_err(csv_err)?;
        for (t, bytes) in size_breakdown(record) {
            let bytes = format!("{bytes:.0}");
            wtr.write_record([t, bytes.as_str()]).map_err(csv_err)?;
        }
        written += 1;
    }
    wtr.flush().map_err(|e| CustomError::Write {
        source: e,
        path: path.to_path_buf(),
    })?;
    Ok(written)
}

/// Read size summary blocks back into sample -> method -> per-type bytes.
pub fn read_size_summary(path: &Path) -> Result<Aggregate> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|source| CustomError::CsvRead {
            source,
            path: path.to_path_buf(),
        })?;

    let mut aggregate = Aggregate::new();
    let mut file: Option<String> = None;
    let mut method: Option<String> = None;
    for result in rdr.records() {
        let record = result.map_err(|source| CustomError::CsvRead {
            source,
            path: path.to_path_buf(),
        })?;
        let line_num = record.position().map_or(0, |p| p.line() as usize);
        let malformed = |reason: &str| CustomError::MalformedLine {
            path: path.to_path_buf(),
            line_num,
            line: record.iter().join(", "),
            reason: reason.to_string(),
        };
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() != 2 {
            return Err(malformed("expected two comma-separated fields"));
        }
        let (key, value) = (&record[0], &record[1]);
        match key {
            "file" => {
                file = Some(value.to_string());
                method = None;
            }
            "method" => {
                if file.is_none() {
                    return Err(malformed("method given before any file"));
                }
                method = Some(value.to_string());
            }
            data_type => {
                let (Some(file), Some(method)) = (&file, &method) else {
                    return Err(malformed("size given before its file and method"));
                };
                let bytes: f64 = value
                    .parse()
                    .map_err(|_| malformed("size is not a number"))?;
                let mut entry = RecordBuilder::new();
                entry.add(Metric::stream(data_type), bytes);
                aggregate.insert(file, Variant::method(method.as_str()), entry.finish());
            }
        }
    }
    Ok(aggregate)
}

/// Write `<sample> <aligned> <error rate> <depth>` lines.
pub fn write_alignment_counts(rows: &[(String, MetricRecord)], path: &Path) -> Result<()> {
    let csv_err = |source| CustomError::CsvWrite {
        source,
        path: path.to_path_buf(),
    };
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(csv_err)?;
    for (sample, record) in rows {
        wtr.write_record([
            sample.clone(),
            format_count(record.measure(&Metric::Alignments)),
            format_number(record.measure(&Metric::ErrorRate)),
            format_number(record.measure(&Metric::Depth)),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| CustomError::Write {
        source: e,
        path: path.to_path_buf(),
    })?;
    Ok(())
}

/// One sample's row of the sweep summary; one cell per sweep value.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub sample: String,
    pub bits_per_base: Vec<Measure>,
    pub edits_per_read: Vec<Measure>,
    pub size_mib: Vec<Measure>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepSummary {
    pub values: Vec<SweepValue>,
    pub rows: Vec<SweepRow>,
}

fn join_cells(cells: &[Measure]) -> String {
    cells.iter().map(|&c| format_number(c)).join(" ")
}

impl SweepSummary {
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writeln!(writer, "{}", self.values.iter().join(" "))?;
        for row in &self.rows {
            writeln!(writer, "{} {}", row.sample, join_cells(&row.bits_per_base))?;
            writeln!(writer, "{} edits: {}", row.sample, join_cells(&row.edits_per_read))?;
            writeln!(writer, "{} seqsize: {}", row.sample, join_cells(&row.size_mib))?;
        }
        Ok(())
    }

    fn row_mut(&mut self, sample: &str) -> &mut SweepRow {
        if let Some(idx) = self.rows.iter().position(|r| r.sample == sample) {
            return &mut self.rows[idx];
        }
        self.rows.push(SweepRow {
            sample: sample.to_string(),
            bits_per_base: Vec::new(),
            edits_per_read: Vec::new(),
            size_mib: Vec::new(),
        });
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut state = SweepRead::default();
        scan_file(path, SWEEP_RULES, &mut state)?;
        // a blank header line stands for an empty sweep
        if !state.seen_header && artifact_size(path) == 0 {
            return Err(CustomError::MissingMarker {
                path: path.to_path_buf(),
                marker: "sweep values",
            });
        }
        Ok(state.summary)
    }
}

#[derive(Default)]
struct SweepRead {
    seen_header: bool,
    summary: SweepSummary,
}

fn parse_cells(line: &Line<'_>, cells: &[&str], expected: usize) -> Result<Vec<Measure>> {
    if cells.len() != expected {
        return Err(line.malformed(format!(
            "expected {expected} values (got {})",
            cells.len()
        )));
    }
    cells
        .iter()
        .map(|&c| {
            if c == SENTINEL {
                Ok(Measure::Missing)
            } else {
                line.parse::<f64>(c, "value").map(Measure::Value)
            }
        })
        .collect()
}

fn skip_comment(_: &mut SweepRead, _: &Line<'_>) -> Result<()> {
    Ok(())
}

fn on_sweep_line(state: &mut SweepRead, line: &Line<'_>) -> Result<()> {
    let tokens = line.tokens();
    if !state.seen_header {
        state.summary.values = tokens
            .iter()
            .map(|t| line.parse::<SweepValue>(t, "sweep value"))
            .collect::<Result<_>>()?;
        state.seen_header = true;
        return Ok(());
    }
    let n = state.summary.values.len();
    let sample = line.token(0)?;
    match tokens.get(1).copied() {
        Some("edits:") => {
            let cells = parse_cells(line, &tokens[2..], n)?;
            state.summary.row_mut(sample).edits_per_read = cells;
        }
        Some("seqsize:") => {
            let cells = parse_cells(line, &tokens[2..], n)?;
            state.summary.row_mut(sample).size_mib = cells;
        }
        _ => {
            let cells = parse_cells(line, &tokens[1..], n)?;
            state.summary.row_mut(sample).bits_per_base = cells;
        }
    }
    Ok(())
}

const SWEEP_RULES: &[Rule<SweepRead>] = &[
    Rule::starts_with("#", skip_comment),
    Rule::any(on_sweep_line),
];
