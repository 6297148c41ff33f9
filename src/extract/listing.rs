use std::path::Path;

use crate::error::Result;
use crate::extract::{Line, Rule, scan_file};
use crate::model::{Metric, MetricRecord, RecordBuilder, Variant};

/// Sample stem and stream suffix encoded in an artifact file name.
///
/// `dir/SRR1.sam.edits.lz` is stream `edits` of sample `SRR1`; names with
/// three parts or fewer (`SRR1.bam`) are whole-file outputs and use the stem
/// as their stream name.
pub fn split_artifact_name(path: &str) -> (String, String) {
    let name = path.rsplit('/').next().unwrap_or(path);
    let parts: Vec<&str> = name.split('.').collect();
    let stem = parts[0].to_string();
    let suffix = if parts.len() > 3 {
        parts[2..parts.len() - 1].join(".")
    } else {
        stem.clone()
    };
    (stem, suffix)
}

/// One `<size> <path>` entry of a size listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeEntry {
    pub sample: String,
    pub variant: Variant,
    pub record: MetricRecord,
}

#[derive(Default)]
struct ListingScan {
    method: Option<String>,
    entries: Vec<SizeEntry>,
}

fn on_method(scan: &mut ListingScan, line: &Line<'_>) -> Result<()> {
    let tokens = line.tokens();
    // `#Quip` and `# Quip` are both accepted
    let method = match tokens.first().map(|t| t.trim_start_matches('#')) {
        Some(inline) if !inline.is_empty() => inline,
        _ => line.token(1)?,
    };
    scan.method = Some(method.to_string());
    Ok(())
}

fn on_size(scan: &mut ListingScan, line: &Line<'_>) -> Result<()> {
    let size = line.int(0)?;
    let path = line.last()?;
    let method = scan
        .method
        .clone()
        .ok_or_else(|| line.malformed("size listed before any \"# <method>\" header"))?;
    let (sample, stream) = split_artifact_name(path);
    let mut record = RecordBuilder::new();
    record.add(Metric::StreamBytes(stream), size as f64);
    scan.entries.push(SizeEntry {
        sample,
        variant: Variant::Method(method),
        record: record.finish(),
    });
    Ok(())
}

const RULES: &[Rule<ListingScan>] = &[
    Rule::starts_with("#", on_method),
    Rule::any(on_size),
];

/// Parse a `du`-style listing grouped under `# <method>` headers.
pub fn extract_size_listing(path: &Path) -> Result<Vec<SizeEntry>> {
    let mut scan = ListingScan::default();
    scan_file(path, RULES, &mut scan)?;
    Ok(scan.entries)
}
