use crate::codec;
use std::fmt;
use url::{ParseError, Position, Url};

/// Identity used to collapse near-duplicate URLs before mutation.
///
/// Built from the hostname, the escaped path and the sorted set of query
/// parameter names. Parameter values take no part in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new<'a>(host: &str, escaped_path: &str, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        DedupKey(format!("{}{}?{}", host, escaped_path, names.join("&")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base that relative references are resolved against, only to validate them
/// and to find the host of `//host/path` forms. It never shows up in output.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// A parsed candidate URL that has at least one query parameter.
///
/// Both absolute URLs and relative references (`//host/p?q`, `/p?q`, `p?q`)
/// are accepted. The part before the query and the fragment are kept exactly
/// as they will be written back out, so a relative reference stays relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUrl {
    /// Everything before the `?`.
    base: String,
    query: String,
    fragment: Option<String>,
    key: DedupKey,
}

impl InputUrl {
    /// Parses one input line.
    ///
    /// Returns `None` for lines that are not URL references or that carry no
    /// usable query parameters. Malformed pairs are ignored when deriving the
    /// dedup key; the strict parse happens later, inside the job.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match Url::parse(line) {
            Ok(url) => Self::from_absolute(&url),
            Err(ParseError::RelativeUrlWithoutBase) => Self::from_relative(line),
            Err(_) => None,
        }
    }

    fn from_absolute(url: &Url) -> Option<Self> {
        Self::build(
            &url[..Position::AfterPath],
            url.host_str().unwrap_or(""),
            url.path(),
            url.query().unwrap_or(""),
            url.fragment(),
        )
    }

    /// Network-path references (`//host/...`) keep their host in the key;
    /// path-only references have an empty one.
    fn from_relative(line: &str) -> Option<Self> {
        let placeholder = Url::parse(RELATIVE_BASE).ok()?;
        let resolved = Url::options().base_url(Some(&placeholder)).parse(line).ok()?;

        let (rest, fragment) = match line.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (line, None),
        };
        let (base, query) = rest.split_once('?').unwrap_or((rest, ""));

        if base.starts_with("//") {
            Self::build(base, resolved.host_str().unwrap_or(""), resolved.path(), query, fragment)
        } else {
            Self::build(base, "", base, query, fragment)
        }
    }

    fn build(base: &str, host: &str, escaped_path: &str, query: &str, fragment: Option<&str>) -> Option<Self> {
        let params = codec::parse_query_lenient(query);
        if params.is_empty() {
            return None;
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let key = DedupKey::new(host, escaped_path, params.names());

        Some(Self {
            base: base.to_string(),
            query: query.to_string(),
            fragment: fragment.map(str::to_string),
            key,
        })
    }

    pub fn key(&self) -> &DedupKey {
        &self.key
    }

    pub fn raw_query(&self) -> &str {
        &self.query
    }

    /// This URL with its query replaced by `query`, fragment kept.
    pub fn with_query(&self, query: &str) -> String {
        codec::materialize(&self.base, query, self.fragment.as_deref())
    }
}

impl fmt::Display for InputUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.with_query(&self.query))
    }
}
