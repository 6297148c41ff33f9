use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::model::{Metric, MetricRecord, RecordBuilder, SweepValue};

/// One output stream of the primary compressor, stored as its own artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Edits,
    HasEdits,
    LeftClip,
    RightClip,
    Offsets,
    Flags,
}

impl Stream {
    pub const ALL: [Stream; 6] = [
        Stream::Edits,
        Stream::HasEdits,
        Stream::LeftClip,
        Stream::RightClip,
        Stream::Offsets,
        Stream::Flags,
    ];

    /// Streams that make up the sequence-only size.
    pub const SEQUENCE: [Stream; 5] = [
        Stream::Edits,
        Stream::HasEdits,
        Stream::Offsets,
        Stream::LeftClip,
        Stream::RightClip,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Edits => "edits",
            Stream::HasEdits => "has_edits",
            Stream::LeftClip => "left_clip",
            Stream::RightClip => "right_clip",
            Stream::Offsets => "offs",
            Stream::Flags => "flags",
        }
    }
}

/// Tools whose wall-clock logs are tabulated, with their log suffixes.
pub const TIMING_LOGS: [(&str, &str); 3] = [
    ("Referee", ".comp.log"),
    ("Deez", ".dz_comp.log"),
    ("Quip -r", ".quip.log"),
];

/// Size of the file at `path` in bytes, or 0 when it does not exist.
pub fn artifact_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            info!("File not found: {}", path.display());
            0
        }
    }
}

/// `path` if it names an existing file; otherwise logs and returns `None`.
pub fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(path)
    } else {
        info!("No log found at {}", path.display());
        None
    }
}

/// Resolves the artifacts produced for one sample.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    dir: PathBuf,
    stem: String,
}

impl ArtifactLocator {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Split a path prefix such as `data/SRR445718.2m.` into its directory
    /// and the sample stem (the file name up to its first dot).
    pub fn from_prefix(prefix: &str) -> Self {
        let path = Path::new(prefix);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.split('.').next().unwrap_or_default().to_string();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { dir, stem }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, suffix))
    }

    pub fn stream_path(&self, stream: Stream) -> PathBuf {
        self.with_suffix(&format!(".sam.{}.lz", stream.name()))
    }

    /// Compressed size of each stream artifact that exists on disk. A
    /// sample with none of them yields an empty record.
    pub fn stream_sizes(&self, streams: &[Stream]) -> MetricRecord {
        let mut record = RecordBuilder::new();
        for &stream in streams {
            let path = self.stream_path(stream);
            if path.is_file() {
                record.add(Metric::stream(stream.name()), artifact_size(&path) as f64);
            } else {
                info!("File not found: {}", path.display());
            }
        }
        record.finish()
    }

    pub fn log_path(&self, suffix: &str) -> PathBuf {
        self.with_suffix(suffix)
    }

    pub fn sweep_log_path(&self, z: SweepValue) -> PathBuf {
        self.with_suffix(&format!("_all.z={}.sam.referee.seq2.log", z.file_label()))
    }
}

/// Compressed membership vector that accompanies the quality streams at
/// `quality_stream`.
pub fn membership_path(quality_stream: &Path) -> PathBuf {
    let name = quality_stream
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let head: Vec<&str> = name.split('.').take(3).collect();
    let file = format!("{}.membership.lz", head.join("."));
    match quality_stream.parent() {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_has_zero_size() {
        let path = std::env::temp_dir().join("compstat-no-such-artifact.sam.edits.lz");
        assert_eq!(artifact_size(&path), 0);
    }

    #[test]
    fn resolves_stream_and_sweep_paths() {
        let loc = ArtifactLocator::new("/data", "SRR445718");
        assert_eq!(
            loc.stream_path(Stream::HasEdits),
            PathBuf::from("/data/SRR445718.sam.has_edits.lz")
        );
        assert_eq!(
            loc.sweep_log_path(SweepValue::new(1.0)),
            PathBuf::from("/data/SRR445718_all.z=1.sam.referee.seq2.log")
        );
        assert_eq!(
            loc.sweep_log_path(SweepValue::new(0.5)),
            PathBuf::from("/data/SRR445718_all.z=0.5.sam.referee.seq2.log")
        );
    }

    #[test]
    fn sums_only_present_streams() {
        let dir = std::env::temp_dir().join(format!("compstat-locator-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("S1.sam.edits.lz"), [0u8; 40]).unwrap();
        fs::write(dir.join("S1.sam.offs.lz"), [0u8; 2]).unwrap();
        fs::write(dir.join("S1.sam.flags.lz"), [0u8; 100]).unwrap();

        let loc = ArtifactLocator::new(&dir, "S1");
        let record = loc.stream_sizes(&Stream::SEQUENCE);
        assert_eq!(record.stream_total(), crate::model::Measure::Value(42.0));
        assert_eq!(record.get(&Metric::stream("has_edits")), None);

        let absent = ArtifactLocator::new(&dir, "S2").stream_sizes(&Stream::SEQUENCE);
        assert!(absent.stream_total().is_missing());
    }

    #[test]
    fn splits_prefix_into_dir_and_stem() {
        let loc = ArtifactLocator::from_prefix("runs/SRR445718.2m.");
        assert_eq!(loc.stem(), "SRR445718");
        assert_eq!(
            loc.log_path(".comp.log"),
            PathBuf::from("runs/SRR445718.comp.log")
        );
    }

    #[test]
    fn membership_sits_beside_quality_stream() {
        let got = membership_path(Path::new("/x/SRR1.sam.k=4.cluster_3.lz"));
        assert_eq!(got, PathBuf::from("/x/SRR1.sam.k=4.membership.lz"));
    }
}
