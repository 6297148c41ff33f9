pub mod latex;
pub mod summary;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use serde_json::json;

use crate::aggregate::Aggregate;
use crate::error::{CustomError, Result};
use crate::model::{Measure, SENTINEL};

pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn mib(bytes: f64) -> f64 {
    bytes / BYTES_PER_MIB
}

/// Compressed bits spent per base; `Missing` when there are no bases.
pub fn bits_per_base(bytes: Measure, bases: Measure) -> Measure {
    match (bytes, bases) {
        (Measure::Value(b), Measure::Value(n)) if n > 0.0 => Measure::Value(b * 8.0 / n),
        _ => Measure::Missing,
    }
}

/// Two-decimal cell, or the sentinel.
pub fn format_number(value: Measure) -> String {
    match value {
        Measure::Value(v) => format!("{:.2}", round2(v)),
        Measure::Missing => SENTINEL.to_string(),
    }
}

/// Whole-number cell, or the sentinel.
pub fn format_count(value: Measure) -> String {
    match value {
        Measure::Value(v) => format!("{:.0}", v),
        Measure::Missing => SENTINEL.to_string(),
    }
}

pub fn format_mib(bytes: Measure) -> String {
    format_number(bytes.map(mib))
}

/// `<MiB> (<bits per base>)`.
pub fn format_size_with_rate(bytes: Measure, bases: Measure) -> String {
    if bytes.is_missing() {
        return SENTINEL.to_string();
    }
    format!(
        "{} ({})",
        format_mib(bytes),
        format_number(bits_per_base(bytes, bases))
    )
}

/// Wall-clock cell such as `1m05s` or `2h03m09s`; seconds round up.
pub fn format_elapsed(secs: Measure) -> String {
    let Measure::Value(secs) = secs else {
        return SENTINEL.to_string();
    };
    let total = secs.max(0.0).ceil() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else {
        format!("{m}m{s:02}s")
    }
}

/// Escape the characters LaTeX treats specially in table labels.
pub fn latex_escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '_' | '&' | '%' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '\\' => out.push_str("\\textbackslash{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Dump the aggregated metrics as JSON.
pub fn write_json(aggregate: &Aggregate, path: &Path) -> Result<()> {
    let f = File::create(path).map_err(|e| CustomError::Write {
        source: e,
        path: path.to_path_buf(),
    })?;
    let mut writer = BufWriter::new(f);
    let doc = json!({
        "generated": Local::now().to_rfc3339(),
        "samples": aggregate,
    });
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(|e| CustomError::Json {
        source: e,
        path: path.to_path_buf(),
    })?;
    writeln!(writer)
        .and_then(|_| writer.flush())
        .map_err(|e| CustomError::Write {
            source: e,
            path: path.to_path_buf(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metric, RecordBuilder, Variant};

    #[test]
    fn converts_bytes_to_mib() {
        assert_eq!(mib(1_048_576.0), 1.0);
        assert_eq!(round2(mib(1_572_864.0)), 1.5);
        assert_eq!(format_mib(Measure::Value(1_048_576.0)), "1.00");
        assert_eq!(format_mib(Measure::Missing), SENTINEL);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(33.333333), 33.33);
        assert_eq!(round2(66.666666), 66.67);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round1(12.25), 12.3);
    }

    #[test]
    fn computes_bits_per_base() {
        assert_eq!(
            bits_per_base(Measure::Value(100.0), Measure::Value(1600.0)),
            Measure::Value(0.5)
        );
        assert!(bits_per_base(Measure::Value(100.0), Measure::Value(0.0)).is_missing());
        assert_eq!(
            format_size_with_rate(Measure::Value(1_048_576.0), Measure::Value(8_388_608.0)),
            "1.00 (1.00)"
        );
    }

    #[test]
    fn formats_elapsed_times() {
        assert_eq!(format_elapsed(Measure::Value(65.0)), "1m05s");
        assert_eq!(format_elapsed(Measure::Value(3723.5)), "1h02m04s");
        assert_eq!(format_elapsed(Measure::Value(3.25)), "0m04s");
        assert_eq!(format_elapsed(Measure::Value(59.5)), "1m00s");
        assert_eq!(format_elapsed(Measure::Missing), SENTINEL);
    }

    #[test]
    fn escapes_labels() {
        assert_eq!(latex_escape("K562_cytosol"), "K562\\_cytosol");
        assert_eq!(latex_escape("Quip -r"), "Quip -r");
        assert_eq!(latex_escape("a$b{c}"), "a\\$b\\{c\\}");
        assert_eq!(
            latex_escape("x~y^z\\w"),
            "x\\textasciitilde{}y\\textasciicircum{}z\\textbackslash{}w"
        );
    }

    #[test]
    fn json_dump_has_timestamp_and_samples() {
        let mut agg = Aggregate::new();
        let mut r = RecordBuilder::new();
        r.set(Metric::ElapsedSecs, 65.0);
        agg.insert("S1", Variant::method("Deez"), r.finish());
        let path = std::env::temp_dir().join(format!("compstat-{}-dump.json", std::process::id()));
        write_json(&agg, &path).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(doc["generated"].is_string());
        assert_eq!(doc["samples"]["S1"]["Deez"]["elapsed_secs"], 65.0);
    }
}
