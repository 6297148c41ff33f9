use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A decomposition asserted by a log did not add up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyError {
    pub expected: u64,
    pub actual: u64,
    pub fields: Vec<&'static str>,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sum of {} is {} but the log reports {}",
            self.fields.join(" + "),
            self.actual,
            self.expected
        )
    }
}

impl std::error::Error for ConsistencyError {}

#[derive(Debug, Error)]
pub enum CustomError {
    #[error("could not read {path}")]
    ReadWithPath {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("could not write to {path}")]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("could not write report to standard output")]
    Stdout {
        #[source]
        source: std::io::Error,
    },

    #[error("could not read {path} as delimited text")]
    CsvRead {
        #[source]
        source: csv::Error,
        path: PathBuf,
    },

    #[error("could not write {path} as delimited text")]
    CsvWrite {
        #[source]
        source: csv::Error,
        path: PathBuf,
    },

    #[error("could not write JSON to {path}")]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    #[error("malformed line {line_num} of {path}: {reason}\n  {line}")]
    MalformedLine {
        path: PathBuf,
        line_num: usize,
        line: String,
        reason: String,
    },

    #[error("no \"{marker}\" line found in {path}")]
    MissingMarker { path: PathBuf, marker: &'static str },

    #[error("invalid elapsed time \"{value}\" (expected [[H:]MM:]SS[.ss])")]
    TimeFormat { value: String },

    #[error("inconsistent counters in {path}")]
    Consistency {
        #[source]
        source: ConsistencyError,
        path: PathBuf,
    },

    #[error("line {line_num} of {path} closes fd={fd}, which was never opened")]
    UnknownFd {
        path: PathBuf,
        line_num: usize,
        fd: u32,
    },

    #[error("expected {expected} lines per record (got {n_lines}) in {path}")]
    ReadLengthRecord {
        path: PathBuf,
        n_lines: usize,
        expected: usize,
    },

    #[error("could not build worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CustomError {
    /// True for errors that describe a bad log rather than a failed operation.
    pub fn is_sample_local(&self) -> bool {
        matches!(
            self,
            CustomError::MalformedLine { .. }
                | CustomError::MissingMarker { .. }
                | CustomError::TimeFormat { .. }
                | CustomError::Consistency { .. }
                | CustomError::UnknownFd { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CustomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_error_names_fields() {
        let err = ConsistencyError {
            expected: 10,
            actual: 9,
            fields: vec!["fix", "rep"],
        };
        assert_eq!(
            err.to_string(),
            "sum of fix + rep is 9 but the log reports 10"
        );
    }

    #[test]
    fn io_errors_are_not_sample_local() {
        let err = CustomError::ReadWithPath {
            source: std::io::Error::other("boom"),
            path: PathBuf::from("x.log"),
        };
        assert!(!err.is_sample_local());
        let err = CustomError::TimeFormat {
            value: "a:b".to_string(),
        };
        assert!(err.is_sample_local());
    }
}
