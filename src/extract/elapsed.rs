use std::path::Path;

use crate::error::{CustomError, Result};
use crate::extract::{Line, Rule, scan_file};
use crate::model::{Metric, MetricRecord, RecordBuilder};

pub const ELAPSED_MARKER: &str = "Elapsed (wall clock)";

/// Parse `[[H:]MM:]SS[.ss]` into seconds. Fields are read right to left as
/// seconds, minutes and hours.
pub fn parse_elapsed(value: &str) -> Result<f64> {
    let err = || CustomError::TimeFormat {
        value: value.to_string(),
    };
    let fields: Vec<&str> = value.trim().split(':').collect();
    if fields.len() > 3 {
        return Err(err());
    }
    let (secs, rest) = fields.split_last().ok_or_else(err)?;
    let mut total: f64 = secs.parse().map_err(|_| err())?;
    if !total.is_finite() || total < 0.0 {
        return Err(err());
    }
    for (place, field) in rest.iter().rev().enumerate() {
        let n: u64 = field.parse().map_err(|_| err())?;
        total += n as f64 * 60f64.powi(place as i32 + 1);
    }
    Ok(total)
}

#[derive(Default)]
struct ElapsedScan {
    secs: Option<f64>,
}

fn on_elapsed(scan: &mut ElapsedScan, line: &Line<'_>) -> Result<()> {
    // only the first report counts
    if scan.secs.is_some() {
        return Ok(());
    }
    let raw = line.last()?;
    let secs = parse_elapsed(raw).map_err(|e| line.malformed(e.to_string()))?;
    scan.secs = Some(secs);
    Ok(())
}

const RULES: &[Rule<ElapsedScan>] = &[Rule::contains(&[ELAPSED_MARKER], on_elapsed)];

/// Wall-clock time reported by a `time -v` style log. A log without the
/// marker yields a record without [`Metric::ElapsedSecs`].
pub fn extract_elapsed(path: &Path) -> Result<MetricRecord> {
    let mut scan = ElapsedScan::default();
    scan_file(path, RULES, &mut scan)?;
    let mut record = RecordBuilder::new();
    if let Some(secs) = scan.secs {
        record.set(Metric::ElapsedSecs, secs);
    }
    Ok(record.finish())
}
