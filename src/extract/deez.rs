use std::path::Path;

use crate::error::{CustomError, Result};
use crate::extract::{Line, Rule, check_sum, scan_file};
use crate::model::{Measure, Metric, MetricRecord, RecordBuilder};

#[derive(Default)]
struct DeezScan {
    record: RecordBuilder,
}

fn on_written(scan: &mut DeezScan, line: &Line<'_>) -> Result<()> {
    let raw: String = line.token(1)?.chars().filter(|&c| c != ',').collect();
    let lines: u64 = line.parse(&raw, "line count")?;
    scan.record.set(Metric::Lines, lines as f64);
    Ok(())
}

fn on_sequence(scan: &mut DeezScan, line: &Line<'_>) -> Result<()> {
    let fix = line.int(1)?;
    let rep = line.int_trimmed(3, "]seq:")?;
    let seq = line.last_int()?;
    check_sum(&[("fix", fix), ("rep", rep)], seq).map_err(|e| line.inconsistent(e))?;
    scan.record.set(Metric::stream("seq"), seq as f64);
    Ok(())
}

fn on_edits(scan: &mut DeezScan, line: &Line<'_>) -> Result<()> {
    let parts = [
        ("nuc", line.int(1)?),
        ("unk", line.int(3)?),
        ("op", line.int(5)?),
        ("len", line.int(7)?),
        ("loc", line.int(9)?),
        ("sti", line.int_trimmed(11, "]edits:")?),
    ];
    let edits = line.last_int()?;
    check_sum(&parts, edits).map_err(|e| line.inconsistent(e))?;
    scan.record.set(Metric::stream("edits"), edits as f64);
    Ok(())
}

fn on_read_ids(scan: &mut DeezScan, line: &Line<'_>) -> Result<()> {
    let idx = line.int(1)?;
    let s = line.int_trimmed(3, "]readIDs:")?;
    let read_ids = line.last_int()?;
    check_sum(&[("idx", idx), ("s", s)], read_ids).map_err(|e| line.inconsistent(e))?;
    scan.record.set(Metric::stream("readIDs"), read_ids as f64);
    Ok(())
}

macro_rules! last_token_stream {
    ($fn_name:ident, $stream:literal) => {
        fn $fn_name(scan: &mut DeezScan, line: &Line<'_>) -> Result<()> {
            let value = line.last_int()?;
            scan.record.set(Metric::stream($stream), value as f64);
            Ok(())
        }
    };
}

last_token_stream!(on_map_flag, "mapFlag");
last_token_stream!(on_map_qual, "mapQual");
last_token_stream!(on_quals, "quals");
last_token_stream!(on_paired_end, "pairedEnd");
last_token_stream!(on_optfield, "optfield");

const RULES: &[Rule<DeezScan>] = &[
    Rule::contains(&["Written", "lines"], on_written),
    Rule::contains(&["FIX", "REP", "seq"], on_sequence),
    Rule::contains(&["NUC", "UNK"], on_edits),
    Rule::contains(&["IDX", "readIDs"], on_read_ids),
    Rule::contains(&["mapFlag"], on_map_flag),
    Rule::contains(&["mapQual"], on_map_qual),
    Rule::contains(&["quals"], on_quals),
    Rule::contains(&["pairedEnd"], on_paired_end),
    Rule::contains(&["optfield"], on_optfield),
];

/// Per-stream sizes and the written line count of a DeeZ run log.
pub fn extract_deez(path: &Path) -> Result<MetricRecord> {
    let mut scan = DeezScan::default();
    scan_file(path, RULES, &mut scan)?;
    let required = [
        (Metric::Lines, "Written"),
        (Metric::stream("seq"), "FIX"),
        (Metric::stream("edits"), "NUC"),
    ];
    for (metric, marker) in required {
        if !scan.record.contains(&metric) {
            return Err(CustomError::MissingMarker {
                path: path.to_path_buf(),
                marker,
            });
        }
    }
    Ok(scan.record.finish())
}

/// Bytes spent on sequence content: the `seq` and `edits` streams.
pub fn sequence_bytes(record: &MetricRecord) -> Measure {
    record.stream_sum(["seq", "edits"])
}

/// Bases covered by the log: written lines times the nominal read length.
pub fn total_bases(record: &MetricRecord, read_len: u64) -> Measure {
    record.measure(&Metric::Lines).map(|l| l * read_len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsistencyError;
    use crate::extract::scan_lines;
    use std::io::Cursor;

    const LOG: &str = "\
Written 1,000 lines
FIX: 60 REP: 40]seq: 100
NUC: 1 UNK: 2 OP: 3 LEN: 4 LOC: 5 STI: 5]edits: 20
IDX: 7 S: 3]readIDs: 10
mapFlag: 11
mapQual: 12
quals: 13
pairedEnd: 14
optfield: 15
";

    fn scan(log: &str) -> Result<RecordBuilder> {
        let mut scan = DeezScan::default();
        scan_lines(Cursor::new(log), Path::new("x.deez.log"), RULES, &mut scan)?;
        Ok(scan.record)
    }

    #[test]
    fn extracts_consistent_log() {
        let record = scan(LOG).unwrap().finish();
        assert_eq!(record.get(&Metric::Lines), Some(1000.0));
        assert_eq!(record.get(&Metric::stream("seq")), Some(100.0));
        assert_eq!(record.get(&Metric::stream("edits")), Some(20.0));
        assert_eq!(record.get(&Metric::stream("readIDs")), Some(10.0));
        assert_eq!(record.get(&Metric::stream("quals")), Some(13.0));
        assert_eq!(record.get(&Metric::stream("optfield")), Some(15.0));
        assert_eq!(sequence_bytes(&record), Measure::Value(120.0));
        assert_eq!(total_bases(&record, 100), Measure::Value(100_000.0));
    }

    #[test]
    fn reports_broken_decomposition() {
        let log = LOG.replace("]seq: 100", "]seq: 101");
        let err = scan(&log).err().expect("sum mismatch must fail");
        match err {
            CustomError::Consistency { source, .. } => assert_eq!(
                source,
                ConsistencyError {
                    expected: 101,
                    actual: 100,
                    fields: vec!["fix", "rep"],
                }
            ),
            other => panic!("unexpected error: {other:?}"),
        }

        let log = LOG.replace("]edits: 20", "]edits: 21");
        match scan(&log) {
            Err(CustomError::Consistency { source, .. }) => {
                assert_eq!(source.expected, 21);
                assert_eq!(source.actual, 20);
                assert_eq!(source.fields, vec!["nuc", "unk", "op", "len", "loc", "sti"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let log = LOG.replace("]readIDs: 10", "]readIDs: 9");
        assert!(matches!(
            scan(&log),
            Err(CustomError::Consistency { .. })
        ));
    }

    #[test]
    fn non_numeric_counter_is_malformed() {
        let log = LOG.replace("LEN: 4", "LEN: four");
        assert!(matches!(
            scan(&log),
            Err(CustomError::MalformedLine { line_num: 3, .. })
        ));
    }
}
