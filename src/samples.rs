use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CustomError, Result};
use crate::model::ReadInfo;

pub(crate) const READ_INFO_LINES: usize = 3;

/// Read a read-lengths file: repeated groups of three lines holding the
/// sample name, its read length and its aligned read count.
pub fn read_lengths(path: &impl AsRef<Path>) -> Result<BTreeMap<String, ReadInfo>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| CustomError::ReadWithPath {
        source: e,
        path: path.to_path_buf(),
    })?;
    let f = BufReader::new(f);

    let mut lines: Vec<(usize, String)> = Vec::new();
    for (line_idx, line) in f.lines().enumerate() {
        let line = line.map_err(|e| CustomError::ReadWithPath {
            source: e,
            path: path.to_path_buf(),
        })?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push((line_idx + 1, line.to_string()));
        }
    }
    if lines.len() % READ_INFO_LINES != 0 {
        return Err(CustomError::ReadLengthRecord {
            path: path.to_path_buf(),
            n_lines: lines.len() % READ_INFO_LINES,
            expected: READ_INFO_LINES,
        });
    }

    let number = |(line_num, text): &(usize, String)| -> Result<u64> {
        text.parse().map_err(|_| CustomError::MalformedLine {
            path: path.to_path_buf(),
            line_num: *line_num,
            line: text.clone(),
            reason: "expected a whole number".to_string(),
        })
    };

    let mut info = BTreeMap::new();
    for group in lines.chunks(READ_INFO_LINES) {
        let name = group[0].1.clone();
        let read_len = number(&group[1])?;
        let aligned = number(&group[2])?;
        info.insert(name, ReadInfo { read_len, aligned });
    }
    Ok(info)
}
