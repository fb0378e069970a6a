//! Turns raw input lines into the working set of unique URLs.

use crate::error::EngineError;
use crate::input::{DedupKey, InputUrl};
use std::collections::HashSet;
use std::io::BufRead;

/// Counters kept while normalizing input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub accepted: usize,
    /// Lines that were blank, not URLs, or had nothing to mutate.
    pub rejected: usize,
    pub duplicates: usize,
}

/// Lazy adapter from input lines to unique [`InputUrl`]s, in first-seen order.
///
/// Unusable lines and URLs whose dedup key was already seen are dropped
/// silently. Relative references are kept; their key has an empty host unless
/// they start with `//host`.
///
/// # Type Parameters
/// * `L`: An iterator over input lines. Any item that is `AsRef<str>` works,
///   so borrowed test fixtures and owned lines read from stdin both fit.
///
/// # Examples
/// ```
/// use qsinject_core::corpus::Normalizer;
///
/// let lines = ["http://x.test/a?q=1", "http://x.test/a?q=2", "no query"];
/// let mut normalizer = Normalizer::new(lines.iter());
/// assert_eq!(normalizer.by_ref().count(), 1);
/// assert_eq!(normalizer.stats().duplicates, 1);
/// ```
#[derive(Debug)]
pub struct Normalizer<L> {
    lines: L,
    seen: HashSet<DedupKey>,
    stats: NormalizeStats,
}

impl<L> Normalizer<L> {
    /// # Arguments
    /// * `lines`: Raw lines. Surrounding whitespace is trimmed before parsing.
    pub fn new(lines: L) -> Self {
        Self {
            lines,
            seen: HashSet::new(),
            stats: NormalizeStats::default(),
        }
    }

    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }
}

impl<L, S> Iterator for Normalizer<L>
where
    L: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = InputUrl;

    fn next(&mut self) -> Option<InputUrl> {
        for line in self.lines.by_ref() {
            let line = line.as_ref().trim();
            if line.is_empty() {
                self.stats.rejected += 1;
                continue;
            }
            let Some(target) = InputUrl::parse(line) else {
                self.stats.rejected += 1;
                continue;
            };
            if !self.seen.insert(target.key().clone()) {
                self.stats.duplicates += 1;
                tracing::trace!(key = %target.key(), "Skipping duplicate URL");
                continue;
            }
            self.stats.accepted += 1;
            return Some(target);
        }
        None
    }
}

/// Reads `reader` to end-of-stream and returns its unique URLs.
///
/// Lines are split on `\n` with a trailing `\r` dropped; bytes that are not
/// UTF-8 are replaced rather than failing the whole read.
pub fn read_targets<R: BufRead>(reader: R) -> Result<Vec<InputUrl>, EngineError> {
    let mut lines = Vec::new();
    for chunk in reader.split(b'\n') {
        let chunk = chunk.map_err(EngineError::Input)?;
        let line = String::from_utf8_lossy(&chunk);
        lines.push(line.trim_end_matches('\r').to_string());
    }

    let mut normalizer = Normalizer::new(lines.into_iter());
    let targets: Vec<InputUrl> = normalizer.by_ref().collect();
    let stats = normalizer.stats();
    tracing::debug!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        duplicates = stats.duplicates,
        "Input normalized"
    );
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn urls(targets: &[InputUrl]) -> Vec<String> {
        targets.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn normalizer_keeps_first_of_each_key() {
        let lines = ["http://x.test/a?q=1", "http://x.test/a?q=99"];
        let targets: Vec<InputUrl> = Normalizer::new(lines.iter()).collect();
        assert_eq!(urls(&targets), vec!["http://x.test/a?q=1"]);
    }

    #[test]
    fn normalizer_treats_param_order_and_repeats_as_same_key() {
        let lines = [
            "http://x.test/a?a=1&b=2",
            "http://x.test/a?b=3&a=4",
            "http://x.test/a?a=1&a=2&b=2",
        ];
        let mut normalizer = Normalizer::new(lines.iter());
        let targets: Vec<InputUrl> = normalizer.by_ref().collect();
        assert_eq!(targets.len(), 1);
        assert_eq!(normalizer.stats().duplicates, 2);
    }

    #[test]
    fn normalizer_distinguishes_host_path_and_names() {
        let lines = [
            "http://x.test/a?q=1",
            "http://y.test/a?q=1",
            "http://x.test/b?q=1",
            "http://x.test/a?q=1&r=1",
            "https://x.test/a?q=2",
        ];
        let targets: Vec<InputUrl> = Normalizer::new(lines.iter()).collect();
        assert_eq!(
            urls(&targets),
            vec![
                "http://x.test/a?q=1",
                "http://y.test/a?q=1",
                "http://x.test/b?q=1",
                "http://x.test/a?q=1&r=1",
            ],
            "scheme is not part of the dedup key"
        );
    }

    #[test]
    fn normalizer_filters_noise() {
        let lines = ["", "   ", "garbage", "http://x.test/", "http://x.test/a?q=1"];
        let mut normalizer = Normalizer::new(lines.iter());
        let targets: Vec<InputUrl> = normalizer.by_ref().collect();
        assert_eq!(targets.len(), 1);
        assert_eq!(
            normalizer.stats(),
            NormalizeStats {
                accepted: 1,
                rejected: 4,
                duplicates: 0
            }
        );
    }

    #[test]
    fn normalizer_accepts_network_path_reference() {
        let lines = ["//x.test/a?q=1", "http://x.test/a?q=2"];
        let mut normalizer = Normalizer::new(lines.iter());
        let targets: Vec<InputUrl> = normalizer.by_ref().collect();
        assert_eq!(urls(&targets), vec!["//x.test/a?q=1"]);
        assert_eq!(targets[0].key().as_str(), "x.test/a?q");
        assert_eq!(normalizer.stats().duplicates, 1);
    }

    #[test]
    fn normalizer_accepts_absolute_path_reference() {
        let lines = ["/relative/path?q=1", "/relative/path?q=2", "/other?q=1"];
        let targets: Vec<InputUrl> = Normalizer::new(lines.iter()).collect();
        assert_eq!(urls(&targets), vec!["/relative/path?q=1", "/other?q=1"]);
        assert_eq!(targets[0].key().as_str(), "/relative/path?q");
    }

    #[test]
    fn normalizer_accepts_schemeless_reference() {
        let lines = ["x.test/a?q=1"];
        let targets: Vec<InputUrl> = Normalizer::new(lines.iter()).collect();
        assert_eq!(urls(&targets), vec!["x.test/a?q=1"]);
        assert_eq!(targets[0].key().as_str(), "x.test/a?q");
    }

    #[test]
    fn read_targets_handles_crlf_and_invalid_utf8() {
        let mut input = b"http://x.test/a?q=1\r\n".to_vec();
        input.extend_from_slice(b"http://x.test/b?q=\xff\n");
        input.extend_from_slice(b"http://x.test/c?q=1");
        let targets = read_targets(Cursor::new(input)).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].to_string(), "http://x.test/a?q=1");
        assert_eq!(targets[2].to_string(), "http://x.test/c?q=1");
    }
}
