use std::path::Path;

use crate::error::Result;
use crate::extract::{Line, Rule, scan_file};
use crate::model::{Measure, Metric, MetricRecord, RecordBuilder};

#[derive(Default)]
struct QuipScan {
    record: RecordBuilder,
}

/// `<label>: <compressed> <unit> <original> ...`, one line per block.
fn add_block(scan: &mut QuipScan, line: &Line<'_>, stream: &str) -> Result<()> {
    let compressed = line.int(1)?;
    let original = line.int(3)?;
    scan.record.add(Metric::stream(stream), compressed as f64);
    scan.record
        .add(Metric::stream_original(stream), original as f64);
    Ok(())
}

fn on_seq(scan: &mut QuipScan, line: &Line<'_>) -> Result<()> {
    add_block(scan, line, "seq")
}

fn on_qual(scan: &mut QuipScan, line: &Line<'_>) -> Result<()> {
    add_block(scan, line, "qual")
}

const RULES: &[Rule<QuipScan>] = &[
    Rule::contains(&["seq:"], on_seq),
    Rule::contains(&["qual:"], on_qual),
];

/// Compressed and original byte totals of the sequence and quality streams
/// in a verbose Quip log.
pub fn extract_quip(path: &Path) -> Result<MetricRecord> {
    let mut scan = QuipScan::default();
    scan_file(path, RULES, &mut scan)?;
    Ok(scan.record.finish())
}

pub fn compressed(record: &MetricRecord, stream: &str) -> Measure {
    record.measure(&Metric::stream(stream))
}

/// Original bytes of `stream`; for sequence this is the base count.
pub fn original(record: &MetricRecord, stream: &str) -> Measure {
    record.measure(&Metric::stream_original(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::scan_lines;
    use std::io::Cursor;

    fn scan(log: &str) -> MetricRecord {
        let mut scan = QuipScan::default();
        scan_lines(Cursor::new(log), Path::new("x.quip.log"), RULES, &mut scan).unwrap();
        scan.record.finish()
    }

    #[test]
    fn accumulates_blocks_in_any_order() {
        let lines = [
            "seq: 100 bytes 800 bytes",
            "qual: 50 bytes 1000 bytes",
            "seq: 25 bytes 200 bytes",
            "qual: 10 bytes 100 bytes",
        ];
        let forward = scan(&lines.join("\n"));
        let mut reversed = lines;
        reversed.reverse();
        let backward = scan(&reversed.join("\n"));

        assert_eq!(forward, backward);
        assert_eq!(compressed(&forward, "seq"), Measure::Value(125.0));
        assert_eq!(original(&forward, "seq"), Measure::Value(1000.0));
        assert_eq!(compressed(&forward, "qual"), Measure::Value(60.0));
        assert_eq!(original(&forward, "qual"), Measure::Value(1100.0));
    }

    #[test]
    fn absent_streams_are_missing() {
        let record = scan("id: 1 bytes 2 bytes\n");
        assert!(compressed(&record, "seq").is_missing());
    }
}
