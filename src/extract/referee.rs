//! Logs written by the primary compressor itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{CustomError, Result};
use crate::extract::{Line, Rule, scan_file};
use crate::locator::{artifact_size, membership_path};
use crate::model::{Metric, MetricRecord, RecordBuilder};

#[derive(Default)]
struct SequenceScan {
    record: RecordBuilder,
}

fn on_unique_reads(scan: &mut SequenceScan, line: &Line<'_>) -> Result<()> {
    let reads = line.last_int()?;
    scan.record.set(Metric::TotalReads, reads as f64);
    Ok(())
}

fn on_edit_count(scan: &mut SequenceScan, line: &Line<'_>) -> Result<()> {
    let edits = line.last_int()?;
    scan.record.set(Metric::EditCount, edits as f64);
    Ok(())
}

const SEQUENCE_RULES: &[Rule<SequenceScan>] = &[
    Rule::contains(&["Unique total reads"], on_unique_reads),
    Rule::contains(&["Total edit count:"], on_edit_count),
];

/// Read and edit totals from a sequence-stream compression log.
pub fn extract_sequence_log(path: &Path) -> Result<MetricRecord> {
    let mut scan = SequenceScan::default();
    scan_file(path, SEQUENCE_RULES, &mut scan)?;
    Ok(scan.record.finish())
}

/// One output stream as reported when its descriptor was closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedStream {
    pub path: PathBuf,
    pub processed: u64,
}

impl ClosedStream {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Quality value streams carry their clustering parameter in the name.
    pub fn is_quality(&self) -> bool {
        self.path.to_string_lossy().contains("k=")
    }

    /// The catch-all quality stream for values outside any cluster.
    pub fn is_unclustered(&self) -> bool {
        self.path.to_string_lossy().contains("other")
    }
}

#[derive(Debug, Default)]
pub struct StreamLog {
    pub alignments: Option<u64>,
    pub unaligned: Option<u64>,
    pub read_len: Option<u64>,
    open: HashMap<u32, PathBuf>,
    pub closed: Vec<ClosedStream>,
}

fn on_read_alignments(log: &mut StreamLog, line: &Line<'_>) -> Result<()> {
    log.alignments = Some(line.int_from_end(2)?);
    Ok(())
}

fn on_unaligned(log: &mut StreamLog, line: &Line<'_>) -> Result<()> {
    log.unaligned = Some(line.last_int()?);
    Ok(())
}

fn on_read_len(log: &mut StreamLog, line: &Line<'_>) -> Result<()> {
    log.read_len = Some(line.int_from_end(2)?);
    Ok(())
}

fn on_opened(log: &mut StreamLog, line: &Line<'_>) -> Result<()> {
    let path = PathBuf::from(line.token(1)?);
    let raw = line.last()?.trim_matches(|c| "(fd=)".contains(c));
    let fd: u32 = line.parse(raw, "descriptor")?;
    log.open.insert(fd, path);
    Ok(())
}

/// `Closing fd=<fd>, processed <bytes> bytes; ...`, possibly several per line.
fn on_closing(log: &mut StreamLog, line: &Line<'_>) -> Result<()> {
    for segment in line.text().split(';') {
        let parts: Vec<&str> = segment.split_whitespace().collect();
        if parts.len() <= 1 {
            continue;
        }
        if parts.len() < 4 {
            return Err(line.malformed(format!("incomplete close report \"{}\"", segment.trim())));
        }
        let raw_fd = parts[1].trim_end_matches(',');
        let raw_fd = raw_fd.strip_prefix("fd=").unwrap_or(raw_fd);
        let fd: u32 = line.parse(raw_fd, "descriptor")?;
        let processed: u64 = line.parse(parts[3], "byte count")?;
        let path = log
            .open
            .get(&fd)
            .cloned()
            .ok_or_else(|| CustomError::UnknownFd {
                path: line.path().to_path_buf(),
                line_num: line.num(),
                fd,
            })?;
        log.closed.push(ClosedStream { path, processed });
    }
    Ok(())
}

const STREAM_RULES: &[Rule<StreamLog>] = &[
    Rule::contains(&["Read ", " alignments"], on_read_alignments),
    Rule::contains(&["Of them unaligned:"], on_unaligned),
    Rule::contains(&["Assuming uniform read len of"], on_read_len),
    Rule::contains(&["Opened ", "stream for compressed data"], on_opened),
    Rule::contains(&["Closing fd"], on_closing),
];

pub fn extract_stream_log(path: &Path) -> Result<StreamLog> {
    let mut log = StreamLog::default();
    scan_file(path, STREAM_RULES, &mut log)?;
    Ok(log)
}

/// One quality stream: bytes fed in and size of the artifact on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityStream {
    pub name: String,
    pub compressed: u64,
    pub processed: u64,
}

impl QualityStream {
    pub fn ratio(&self) -> f64 {
        if self.compressed == 0 {
            1.0
        } else {
            self.processed as f64 / self.compressed as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualitySummary {
    pub streams: Vec<QualityStream>,
    pub membership: Option<PathBuf>,
    pub membership_bytes: Option<u64>,
    pub original_total: u64,
    pub compressed_total: u64,
    pub cluster_original: u64,
    pub cluster_compressed: u64,
    pub unclustered_original: u64,
    /// Aligned reads times read length.
    pub estimated_original: Option<u64>,
}

impl QualitySummary {
    pub fn compression(&self) -> Option<f64> {
        let orig = self.estimated_original?;
        (self.compressed_total > 0).then(|| orig as f64 / self.compressed_total as f64)
    }

    pub fn cluster_compression(&self) -> Option<f64> {
        let orig = self.estimated_original?.checked_sub(self.unclustered_original)?;
        (self.cluster_compressed > 0).then(|| orig as f64 / self.cluster_compressed as f64)
    }
}

/// Combine the closed quality streams of a run with their artifact sizes.
pub fn summarize_quality(log: &StreamLog) -> QualitySummary {
    let mut summary = QualitySummary::default();
    for closed in log.closed.iter().filter(|c| c.is_quality()) {
        let compressed = artifact_size(&closed.path);
        summary.original_total += closed.processed;
        summary.compressed_total += compressed;
        if closed.is_unclustered() {
            summary.unclustered_original = closed.processed;
        } else {
            summary.cluster_original += closed.processed;
            summary.cluster_compressed += compressed;
        }
        summary.streams.push(QualityStream {
            name: closed.name(),
            compressed,
            processed: closed.processed,
        });
        if summary.membership.is_none() {
            summary.membership = Some(membership_path(&closed.path));
        }
    }
    if let Some(membership) = &summary.membership {
        if membership.is_file() {
            let size = artifact_size(membership);
            summary.compressed_total += size;
            summary.membership_bytes = Some(size);
        }
    }
    summary.estimated_original = match (log.alignments, log.unaligned, log.read_len) {
        (Some(total), Some(unaligned), Some(read_len)) => {
            total.saturating_sub(unaligned).checked_mul(read_len)
        }
        _ => None,
    };
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::scan_lines;
    use std::io::Cursor;

    fn scan_stream(log: &str) -> Result<StreamLog> {
        let mut state = StreamLog::default();
        scan_lines(Cursor::new(log), Path::new("run.log"), STREAM_RULES, &mut state)?;
        Ok(state)
    }

    #[test]
    fn reads_sequence_totals() {
        let log = "Unique total reads: 1200\nTotal edit count: 345\n";
        let mut scan = SequenceScan::default();
        scan_lines(Cursor::new(log), Path::new("s.log"), SEQUENCE_RULES, &mut scan).unwrap();
        let record = scan.record.finish();
        assert_eq!(record.get(&Metric::TotalReads), Some(1200.0));
        assert_eq!(record.get(&Metric::EditCount), Some(345.0));
    }

    #[test]
    fn pairs_closed_descriptors_with_opened_paths() {
        let log = "\
Read 1000 alignments
Of them unaligned: 100
Assuming uniform read len of 50 bases
Opened /tmp/none/a.sam.k=4.c1.lz stream for compressed data (fd=12)
Opened /tmp/none/a.sam.k=4.other.lz stream for compressed data (fd=13)
Opened /tmp/none/a.sam.offs.lz stream for compressed data (fd=14)
Closing fd=12, processed 4000 bytes; Closing fd=13, processed 500 bytes;
Closing fd=14, processed 77 bytes;
";
        let state = scan_stream(log).unwrap();
        assert_eq!(state.alignments, Some(1000));
        assert_eq!(state.unaligned, Some(100));
        assert_eq!(state.read_len, Some(50));
        assert_eq!(state.closed.len(), 3);
        assert_eq!(state.closed[1].processed, 500);
        assert!(state.closed[1].is_unclustered());
        assert!(!state.closed[2].is_quality());

        let summary = summarize_quality(&state);
        assert_eq!(summary.streams.len(), 2);
        assert_eq!(summary.original_total, 4500);
        assert_eq!(summary.cluster_original, 4000);
        assert_eq!(summary.unclustered_original, 500);
        assert_eq!(summary.compressed_total, 0);
        assert_eq!(summary.estimated_original, Some(45_000));
        assert_eq!(summary.compression(), None);
        assert_eq!(summary.streams[0].ratio(), 1.0);
        assert_eq!(
            summary.membership,
            Some(PathBuf::from("/tmp/none/a.sam.k=4.membership.lz"))
        );
    }

    #[test]
    fn overflowing_estimate_is_dropped() {
        let log = "\
Read 18446744073709551615 alignments
Of them unaligned: 0
Assuming uniform read len of 100 bases
";
        let summary = summarize_quality(&scan_stream(log).unwrap());
        assert_eq!(summary.estimated_original, None);
    }

    #[test]
    fn unknown_descriptor_is_an_error() {
        let err = scan_stream("Closing fd=99, processed 1 bytes;\n").unwrap_err();
        assert!(matches!(err, CustomError::UnknownFd { fd: 99, line_num: 1, .. }));
    }
}
