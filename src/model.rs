use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// The single rendering of a metric that was not measured.
pub const SENTINEL: &str = "---";

/// Sweep parameter value, totally ordered so it can key a sorted map.
#[derive(Debug, Clone, Copy)]
pub struct SweepValue(f64);

impl SweepValue {
    pub fn new(value: f64) -> Self {
        // -0.0 and 0.0 must land in the same column
        Self(if value == 0.0 { 0.0 } else { value })
    }

    /// Rendering used inside artifact file names: `1` for one, otherwise a
    /// decimal that always carries a fractional part (`0.5`, `2.0`).
    pub fn file_label(self) -> String {
        if self.0 == 1.0 {
            "1".to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for SweepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 && self.0.is_finite() {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for SweepValue {
    type Err = std::num::ParseFloatError;

    /// Accepts `z=1`, `1` and `1.0` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let raw = s.strip_prefix("z=").unwrap_or(s);
        raw.parse::<f64>().map(SweepValue::new)
    }
}

impl PartialEq for SweepValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SweepValue {}

impl PartialOrd for SweepValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SweepValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The condition a sample was measured under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Variant {
    /// Measurements of the sample itself, not tied to a tool or parameter.
    Base,
    Method(String),
    Sweep(SweepValue),
}

impl Variant {
    pub fn method(name: impl Into<String>) -> Self {
        Variant::Method(name.into())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Base => write!(f, "base"),
            Variant::Method(name) => write!(f, "{name}"),
            Variant::Sweep(z) => write!(f, "z={z}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    /// Compressed bytes of one named stream.
    StreamBytes(String),
    /// Uncompressed bytes of one named stream.
    StreamOriginalBytes(String),
    TotalReads,
    EditCount,
    Lines,
    Alignments,
    Unaligned,
    ErrorRate,
    Depth,
    ElapsedSecs,
    ReadLength,
}

impl Metric {
    pub fn stream(name: impl Into<String>) -> Self {
        Metric::StreamBytes(name.into())
    }

    pub fn stream_original(name: impl Into<String>) -> Self {
        Metric::StreamOriginalBytes(name.into())
    }

    /// Additive metrics accumulate across repeated reports; all others are
    /// overwritten by the most recent value.
    pub fn is_additive(&self) -> bool {
        matches!(
            self,
            Metric::StreamBytes(_) | Metric::StreamOriginalBytes(_)
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::StreamBytes(name) => write!(f, "{name}_bytes"),
            Metric::StreamOriginalBytes(name) => write!(f, "{name}_original_bytes"),
            Metric::TotalReads => write!(f, "total_reads"),
            Metric::EditCount => write!(f, "edit_count"),
            Metric::Lines => write!(f, "lines"),
            Metric::Alignments => write!(f, "alignments"),
            Metric::Unaligned => write!(f, "unaligned"),
            Metric::ErrorRate => write!(f, "error_rate"),
            Metric::Depth => write!(f, "depth"),
            Metric::ElapsedSecs => write!(f, "elapsed_secs"),
            Metric::ReadLength => write!(f, "read_length"),
        }
    }
}

/// A metric value, or the explicit marker that it was never measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Value(f64),
    Missing,
}

impl Measure {
    pub fn value(self) -> Option<f64> {
        match self {
            Measure::Value(v) => Some(v),
            Measure::Missing => None,
        }
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Measure::Value(v) => Measure::Value(f(v)),
            Measure::Missing => Measure::Missing,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, Measure::Missing)
    }
}

impl From<Option<f64>> for Measure {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Measure::Missing, Measure::Value)
    }
}

/// Metrics for one (sample, variant) pair, frozen once its log was consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    values: BTreeMap<Metric, f64>,
}

impl MetricRecord {
    pub fn measure(&self, metric: &Metric) -> Measure {
        self.values.get(metric).copied().into()
    }

    pub fn get(&self, metric: &Metric) -> Option<f64> {
        self.values.get(metric).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of all streams with a compressed size, in sorted order.
    pub fn streams(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().filter_map(|(k, &v)| match k {
            Metric::StreamBytes(name) => Some((name.as_str(), v)),
            _ => None,
        })
    }

    /// Sum of all per-stream compressed sizes, `Missing` if none were seen.
    pub fn stream_total(&self) -> Measure {
        let mut seen = false;
        let total = self
            .streams()
            .inspect(|_| seen = true)
            .map(|(_, v)| v)
            .sum::<f64>();
        if seen {
            Measure::Value(total)
        } else {
            Measure::Missing
        }
    }

    /// Sum of the compressed sizes of the named streams; absent streams count
    /// as zero, but at least one must be present.
    pub fn stream_sum<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Measure {
        let mut seen = false;
        let mut total = 0.0;
        for name in names {
            if let Some(v) = self.get(&Metric::stream(name)) {
                seen = true;
                total += v;
            }
        }
        if seen {
            Measure::Value(total)
        } else {
            Measure::Missing
        }
    }

    /// Fold a later record for the same key into this one.
    pub(crate) fn absorb(&mut self, other: MetricRecord) {
        for (metric, value) in other.values {
            if metric.is_additive() {
                *self.values.entry(metric).or_insert(0.0) += value;
            } else {
                self.values.insert(metric, value);
            }
        }
    }
}

impl Serialize for MetricRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (metric, value) in &self.values {
            map.serialize_entry(&metric.to_string(), value)?;
        }
        map.end()
    }
}

/// Scan-time form of a [`MetricRecord`].
#[derive(Debug, Default)]
pub struct RecordBuilder {
    values: BTreeMap<Metric, f64>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    pub fn add(&mut self, metric: Metric, value: f64) {
        *self.values.entry(metric).or_insert(0.0) += value;
    }

    pub fn contains(&self, metric: &Metric) -> bool {
        self.values.contains_key(metric)
    }

    pub fn finish(self) -> MetricRecord {
        MetricRecord {
            values: self.values,
        }
    }
}

/// Nominal read length and aligned read count of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadInfo {
    pub read_len: u64,
    pub aligned: u64,
}

impl ReadInfo {
    /// Read length times aligned reads, missing when the product overflows.
    pub fn total_bases(&self) -> Measure {
        self.read_len
            .checked_mul(self.aligned)
            .map(|b| b as f64)
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_values_normalise() {
        let a: SweepValue = "z=1".parse().unwrap();
        let b: SweepValue = "1.0".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, SweepValue::new(1.0));
        assert!("z=x".parse::<SweepValue>().is_err());
    }

    #[test]
    fn sweep_values_sort_numerically() {
        let mut zs: Vec<SweepValue> = ["z=10", "z=2", "z=0.5"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        zs.sort();
        let got: Vec<String> = zs.iter().map(|z| z.to_string()).collect();
        assert_eq!(got, vec!["0.5", "2.0", "10.0"]);
    }

    #[test]
    fn sweep_file_labels() {
        assert_eq!(SweepValue::new(1.0).file_label(), "1");
        assert_eq!(SweepValue::new(2.0).file_label(), "2.0");
        assert_eq!(SweepValue::new(0.5).file_label(), "0.5");
    }

    #[test]
    fn absorb_accumulates_only_additive_metrics() {
        let mut first = RecordBuilder::new();
        first.set(Metric::TotalReads, 10.0);
        first.add(Metric::stream("offs"), 100.0);
        let mut record = first.finish();

        let mut second = RecordBuilder::new();
        second.set(Metric::TotalReads, 12.0);
        second.add(Metric::stream("offs"), 50.0);
        record.absorb(second.finish());

        assert_eq!(record.get(&Metric::TotalReads), Some(12.0));
        assert_eq!(record.get(&Metric::stream("offs")), Some(150.0));
    }

    #[test]
    fn missing_metrics_are_explicit() {
        let record = RecordBuilder::new().finish();
        assert_eq!(record.measure(&Metric::Depth), Measure::Missing);
        assert_eq!(record.stream_total(), Measure::Missing);
    }

    #[test]
    fn total_bases_overflow_is_missing() {
        let info = ReadInfo {
            read_len: 100,
            aligned: 2048,
        };
        assert_eq!(info.total_bases(), Measure::Value(204_800.0));
        let huge = ReadInfo {
            read_len: 100,
            aligned: u64::MAX / 10,
        };
        assert_eq!(huge.total_bases(), Measure::Missing);
    }

    #[test]
    fn stream_sum_requires_one_stream() {
        let mut builder = RecordBuilder::new();
        builder.add(Metric::stream("seq"), 5.0);
        builder.add(Metric::stream("edits"), 7.0);
        builder.add(Metric::stream("quals"), 100.0);
        let record = builder.finish();
        assert_eq!(record.stream_sum(["seq", "edits"]), Measure::Value(12.0));
        assert_eq!(record.stream_sum(["ids"]), Measure::Missing);
        assert_eq!(record.stream_total(), Measure::Value(112.0));
    }
}
