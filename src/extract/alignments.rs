use std::path::Path;

use crate::error::Result;
use crate::extract::{Line, Rule, scan_file};
use crate::model::{Metric, MetricRecord, RecordBuilder};
use crate::output::round2;

/// Per-sample alignment statistics in the order the summary lists them.
#[derive(Default)]
struct SummaryScan {
    samples: Vec<(String, RecordBuilder)>,
}

impl SummaryScan {
    fn current(&mut self, line: &Line<'_>) -> Result<&mut RecordBuilder> {
        match self.samples.last_mut() {
            Some((_, record)) => Ok(record),
            None => Err(line.malformed("statistics before the first \"=== <sample>\" header")),
        }
    }
}

fn on_header(scan: &mut SummaryScan, line: &Line<'_>) -> Result<()> {
    let name = line.last()?;
    scan.samples.push((name.to_string(), RecordBuilder::new()));
    Ok(())
}

fn on_saw(scan: &mut SummaryScan, line: &Line<'_>) -> Result<()> {
    let alignments = line.int(1)?;
    scan.current(line)?
        .set(Metric::Alignments, alignments as f64);
    Ok(())
}

fn on_error_rate(scan: &mut SummaryScan, line: &Line<'_>) -> Result<()> {
    let raw = line.last()?.trim_end_matches('%');
    let rate: f64 = line.parse(raw, "error rate")?;
    scan.current(line)?.set(Metric::ErrorRate, round2(rate));
    Ok(())
}

/// `<count> <path>`: a line count of the unaligned reads file, which holds
/// four lines per read when it is FASTQ and three when the `+` line is gone.
fn on_line_count(scan: &mut SummaryScan, line: &Line<'_>) -> Result<()> {
    let tokens = line.tokens();
    if tokens.len() != 2 {
        return Ok(());
    }
    let Ok(count) = tokens[0].parse::<u64>() else {
        return Ok(());
    };
    let record = scan.current(line)?;
    if count % 4 == 0 {
        record.set(Metric::Unaligned, (count / 4) as f64);
    } else if count % 3 == 0 {
        record.set(Metric::Unaligned, (count / 3) as f64);
    }
    Ok(())
}

const RULES: &[Rule<SummaryScan>] = &[
    Rule::contains(&["=== "], on_header),
    Rule::contains(&["Saw "], on_saw),
    Rule::contains(&["Error rate:"], on_error_rate),
    Rule::any(on_line_count),
];

/// Parse a data summary with `=== <sample>` sections.
pub fn extract_data_summary(path: &Path) -> Result<Vec<(String, MetricRecord)>> {
    let mut scan = SummaryScan::default();
    scan_file(path, RULES, &mut scan)?;
    Ok(scan
        .samples
        .into_iter()
        .map(|(name, record)| (name, record.finish()))
        .collect())
}
