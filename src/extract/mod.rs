//! Line-oriented metric extraction.
//!
//! Every log format is described by a table of [`Rule`]s. Each non-blank line
//! is tested against the rules in order and handed to the first one whose
//! [`Matcher`] accepts it. Rules read fixed-position whitespace tokens through
//! [`Line`], which turns any bad token into an error naming the file and line.

pub mod alignments;
pub mod deez;
pub mod elapsed;
pub mod listing;
pub mod quip;
pub mod referee;
pub mod sweep;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConsistencyError, CustomError, Result};

#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Line contains every listed substring.
    Contains(&'static [&'static str]),
    /// Line starts with the prefix once leading whitespace is removed.
    StartsWith(&'static str),
    /// Matches every line; used as the final fallback.
    Any,
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Contains(markers) => markers.iter().all(|m| text.contains(*m)),
            Matcher::StartsWith(prefix) => text.trim_start().starts_with(prefix),
            Matcher::Any => true,
        }
    }
}

pub struct Rule<S> {
    pub matcher: Matcher,
    pub apply: fn(&mut S, &Line<'_>) -> Result<()>,
}

impl<S> Rule<S> {
    pub const fn contains(
        markers: &'static [&'static str],
        apply: fn(&mut S, &Line<'_>) -> Result<()>,
    ) -> Self {
        Self {
            matcher: Matcher::Contains(markers),
            apply,
        }
    }

    pub const fn starts_with(
        prefix: &'static str,
        apply: fn(&mut S, &Line<'_>) -> Result<()>,
    ) -> Self {
        Self {
            matcher: Matcher::StartsWith(prefix),
            apply,
        }
    }

    pub const fn any(apply: fn(&mut S, &Line<'_>) -> Result<()>) -> Self {
        Self {
            matcher: Matcher::Any,
            apply,
        }
    }
}

/// One log line with its location, split into whitespace tokens.
pub struct Line<'a> {
    path: &'a Path,
    num: usize,
    text: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> Line<'a> {
    pub fn new(path: &'a Path, num: usize, text: &'a str) -> Self {
        Self {
            path,
            num,
            text,
            tokens: text.split_whitespace().collect(),
        }
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn tokens(&self) -> &[&'a str] {
        &self.tokens
    }

    pub fn malformed(&self, reason: impl Into<String>) -> CustomError {
        CustomError::MalformedLine {
            path: self.path.to_path_buf(),
            line_num: self.num,
            line: self.text.trim().to_string(),
            reason: reason.into(),
        }
    }

    pub fn inconsistent(&self, source: ConsistencyError) -> CustomError {
        CustomError::Consistency {
            source,
            path: self.path.to_path_buf(),
        }
    }

    pub fn token(&self, idx: usize) -> Result<&'a str> {
        self.tokens.get(idx).copied().ok_or_else(|| {
            self.malformed(format!(
                "expected at least {} fields (got {})",
                idx + 1,
                self.tokens.len()
            ))
        })
    }

    /// Token counted from the end; `1` is the last token.
    pub fn from_end(&self, n: usize) -> Result<&'a str> {
        if n == 0 || n > self.tokens.len() {
            return Err(self.malformed(format!(
                "expected at least {n} fields (got {})",
                self.tokens.len()
            )));
        }
        Ok(self.tokens[self.tokens.len() - n])
    }

    pub fn last(&self) -> Result<&'a str> {
        self.from_end(1)
    }

    pub fn parse<T: FromStr>(&self, raw: &str, what: &str) -> Result<T> {
        raw.parse::<T>()
            .map_err(|_| self.malformed(format!("{what} \"{raw}\" is not a valid number")))
    }

    pub fn int(&self, idx: usize) -> Result<u64> {
        self.parse(self.token(idx)?, "field")
    }

    /// Integer at `idx` after stripping any of `chars` from both ends.
    pub fn int_trimmed(&self, idx: usize, chars: &str) -> Result<u64> {
        let raw = self.token(idx)?.trim_matches(|c| chars.contains(c));
        self.parse(raw, "field")
    }

    pub fn last_int(&self) -> Result<u64> {
        self.parse(self.last()?, "last field")
    }

    pub fn int_from_end(&self, n: usize) -> Result<u64> {
        self.parse(self.from_end(n)?, "field")
    }
}

/// Run `rules` over every line produced by `reader`.
pub fn scan_lines<S, R: BufRead>(
    mut reader: R,
    path: &Path,
    rules: &[Rule<S>],
    state: &mut S,
) -> Result<()> {
    let mut buf = Vec::new();
    let mut line_num = 0;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| CustomError::ReadWithPath {
                source: e,
                path: path.to_path_buf(),
            })?;
        if n == 0 {
            return Ok(());
        }
        line_num += 1;
        // tool logs may carry stray non-UTF-8 bytes from file names
        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            continue;
        }
        if let Some(rule) = rules.iter().find(|r| r.matcher.matches(text)) {
            let line = Line::new(path, line_num, text);
            (rule.apply)(state, &line)?;
        }
    }
}

/// Open `path`, scan it to the end and close it again.
pub fn scan_file<S>(path: &Path, rules: &[Rule<S>], state: &mut S) -> Result<()> {
    let f = File::open(path).map_err(|e| CustomError::ReadWithPath {
        source: e,
        path: path.to_path_buf(),
    })?;
    scan_lines(BufReader::new(f), path, rules, state)
}

/// Check that `parts` add up to `total`.
pub fn check_sum(
    parts: &[(&'static str, u64)],
    total: u64,
) -> std::result::Result<(), ConsistencyError> {
    let actual: u128 = parts.iter().map(|&(_, v)| u128::from(v)).sum();
    if actual == u128::from(total) {
        Ok(())
    } else {
        Err(ConsistencyError {
            expected: total,
            actual: u64::try_from(actual).unwrap_or(u64::MAX),
            fields: parts.iter().map(|&(name, _)| name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct Seen {
        first: Vec<usize>,
        fallback: Vec<usize>,
    }

    fn on_first(s: &mut Seen, l: &Line<'_>) -> Result<()> {
        s.first.push(l.num());
        Ok(())
    }

    fn on_fallback(s: &mut Seen, l: &Line<'_>) -> Result<()> {
        s.fallback.push(l.num());
        Ok(())
    }

    const RULES: &[Rule<Seen>] = &[
        Rule::contains(&["alpha", "beta"], on_first),
        Rule::any(on_fallback),
    ];

    #[test]
    fn first_matching_rule_wins_and_blank_lines_are_skipped() {
        let input = "alpha beta\n\nalpha only\n   \nbeta alpha\n";
        let mut seen = Seen::default();
        scan_lines(Cursor::new(input), Path::new("t.log"), RULES, &mut seen).unwrap();
        assert_eq!(seen.first, vec![1, 5]);
        assert_eq!(seen.fallback, vec![3]);
    }

    #[test]
    fn invalid_utf8_does_not_stop_the_scan() {
        let input: &[u8] = b"alpha \xe9 beta\r\nnot \xff utf8\n";
        let mut seen = Seen::default();
        scan_lines(Cursor::new(input), Path::new("t.log"), RULES, &mut seen).unwrap();
        assert_eq!(seen.first, vec![1]);
        assert_eq!(seen.fallback, vec![2]);
    }

    #[test]
    fn bad_tokens_name_file_and_line() {
        let line = Line::new(Path::new("run.log"), 7, "Total edit count: lots");
        let err = line.last_int().unwrap_err();
        match err {
            CustomError::MalformedLine {
                path, line_num, ..
            } => {
                assert_eq!(path, Path::new("run.log"));
                assert_eq!(line_num, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(line.token(9).is_err());
        assert!(line.from_end(0).is_err());
    }

    #[test]
    fn trims_decorated_tokens() {
        let line = Line::new(Path::new("x"), 1, "FIX: 10 REP: 32]seq: 42");
        assert_eq!(line.int_trimmed(3, "]seq:").unwrap(), 32);
        assert_eq!(line.last_int().unwrap(), 42);
        assert_eq!(line.int_from_end(4).unwrap(), 10);
    }

    #[test]
    fn sum_check_reports_fields() {
        assert!(check_sum(&[("fix", 1), ("rep", 2)], 3).is_ok());
        let err = check_sum(&[("fix", 1), ("rep", 2)], 4).unwrap_err();
        assert_eq!(err.expected, 4);
        assert_eq!(err.actual, 3);
        assert_eq!(err.fields, vec!["fix", "rep"]);

        let err = check_sum(&[("fix", u64::MAX), ("rep", 1)], 0).unwrap_err();
        assert_eq!(err.actual, u64::MAX);
    }
}
