use std::path::Path;

use crate::error::Result;
use crate::extract::{Line, Rule, scan_file};
use crate::model::{Metric, MetricRecord, RecordBuilder, SweepValue};

/// Measurements listed for one sample at one sweep value.
#[derive(Debug)]
pub struct SweepCell {
    pub sample: String,
    pub z: SweepValue,
    pub record: MetricRecord,
    /// Read count estimated from an alignment-window count line.
    pub window_reads: Option<u64>,
}

struct OpenCell {
    sample: String,
    z: SweepValue,
    record: RecordBuilder,
    window_reads: Option<u64>,
}

impl OpenCell {
    fn close(self) -> SweepCell {
        SweepCell {
            sample: self.sample,
            z: self.z,
            record: self.record.finish(),
            window_reads: self.window_reads,
        }
    }
}

#[derive(Default)]
struct SweepScan {
    cells: Vec<OpenCell>,
}

impl SweepScan {
    fn current(&mut self, line: &Line<'_>) -> Result<&mut OpenCell> {
        self.cells
            .last_mut()
            .ok_or_else(|| line.malformed("measurement before the first \"*** <sample> z=<value>\" header"))
    }
}

fn on_header(scan: &mut SweepScan, line: &Line<'_>) -> Result<()> {
    if line.tokens().len() != 3 {
        return Err(line.malformed("expected \"*** <sample> z=<value>\""));
    }
    let sample = line.token(1)?;
    let raw_z = line.token(2)?;
    let z: SweepValue = line.parse(raw_z, "sweep value")?;
    scan.cells.push(OpenCell {
        sample: sample.to_string(),
        z,
        record: RecordBuilder::new(),
        window_reads: None,
    });
    Ok(())
}

fn on_edits(scan: &mut SweepScan, line: &Line<'_>) -> Result<()> {
    let edits = line.int(1)?;
    scan.current(line)?
        .record
        .set(Metric::EditCount, edits as f64);
    Ok(())
}

fn on_artifact(scan: &mut SweepScan, line: &Line<'_>) -> Result<()> {
    let size = line.int(0)?;
    let path = line.last()?;
    let stream = path.rsplit('/').next().unwrap_or(path).to_string();
    scan.current(line)?
        .record
        .add(Metric::StreamBytes(stream), size as f64);
    Ok(())
}

/// Alignments within the +-8 window; each stands for eight reads.
fn on_window_count(scan: &mut SweepScan, line: &Line<'_>) -> Result<()> {
    let count = line.int(0)?;
    let reads = count
        .checked_mul(8)
        .and_then(|n| n.checked_add(2))
        .ok_or_else(|| line.malformed(format!("window count {count} is too large")))?;
    scan.current(line)?.window_reads = Some(reads);
    Ok(())
}

const RULES: &[Rule<SweepScan>] = &[
    Rule::contains(&["***"], on_header),
    Rule::contains(&["edits:"], on_edits),
    Rule::contains(&[".lz"], on_artifact),
    Rule::any(on_window_count),
];

/// Parse a sweep listing with `*** <sample> z=<value>` sections.
pub fn extract_sweep_listing(path: &Path) -> Result<Vec<SweepCell>> {
    let mut scan = SweepScan::default();
    scan_file(path, RULES, &mut scan)?;
    Ok(scan
        .cells
        .into_iter()
        .map(OpenCell::close)
        .collect())
}
