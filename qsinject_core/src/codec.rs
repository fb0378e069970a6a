//! Query-string parsing and serialization.
//!
//! Parsing follows `application/x-www-form-urlencoded` rules strictly: a bad
//! `%` escape or a `;` separator is an error rather than something to guess
//! around. Serialization sorts parameter names and keeps each name's values in
//! their original order.

use crate::error::CodecError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::BTreeMap;

/// Bytes escaped inside a query component: all but the unreserved set.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Decoded query parameters: name to ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    inner: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(name.into()).or_default().push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.inner.get(name).map(Vec::as_slice)
    }

    pub fn get(&self, name: &str, index: usize) -> Option<&str> {
        self.inner.get(name)?.get(index).map(String::as_str)
    }

    /// Replaces the value at `(name, index)`, returning the previous one.
    pub fn set(&mut self, name: &str, index: usize, value: String) -> Option<String> {
        let slot = self.inner.get_mut(name)?.get_mut(index)?;
        Some(std::mem::replace(slot, value))
    }

    /// Every `(name, index)` position, in serialization order.
    pub fn slots(&self) -> Vec<(String, usize)> {
        self.inner
            .iter()
            .flat_map(|(name, values)| (0..values.len()).map(move |i| (name.clone(), i)))
            .collect()
    }

    pub fn slot_count(&self) -> usize {
        self.inner.values().map(Vec::len).sum()
    }
}

/// Splits a raw query into decoded pairs, reporting each bad pair in place.
fn parse_pairs(raw: &str) -> impl Iterator<Item = Result<(String, String), CodecError>> + '_ {
    raw.split('&').filter(|pair| !pair.is_empty()).map(|pair| {
        if pair.contains(';') {
            return Err(CodecError::Semicolon);
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        Ok((unescape(key)?, unescape(value)?))
    })
}

/// Strict parse: the first malformed pair fails the whole query.
pub fn parse_query(raw: &str) -> Result<QueryParams, CodecError> {
    let mut params = QueryParams::new();
    for pair in parse_pairs(raw) {
        let (key, value) = pair?;
        params.append(key, value);
    }
    Ok(params)
}

/// Lenient parse: malformed pairs are dropped.
pub fn parse_query_lenient(raw: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in parse_pairs(raw).filter_map(Result::ok) {
        params.append(key, value);
    }
    params
}

/// Form-unescapes one component: `+` becomes a space and `%XX` a byte.
pub fn unescape(s: &str) -> Result<String, CodecError> {
    let bytes = s.as_bytes();
    for (i, _) in s.match_indices('%') {
        let well_formed = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            let end = (i + 3).min(bytes.len());
            return Err(CodecError::MalformedEscape(
                String::from_utf8_lossy(&bytes[i..end]).into_owned(),
            ));
        }
    }

    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| CodecError::InvalidUtf8)
}

/// Serializes `params` as `name=value` pairs joined by `&`, sorted by name.
///
/// Everything except ASCII alphanumerics and `-_.~` is percent-escaped and a
/// space becomes `+`, so `*` turns into `%2A` while `~` stays literal.
pub fn encode(params: &QueryParams) -> String {
    let mut out = String::new();
    for (name, values) in &params.inner {
        for value in values {
            if !out.is_empty() {
                out.push('&');
            }
            escape_into(&mut out, name);
            out.push('=');
            escape_into(&mut out, value);
        }
    }
    out
}

fn escape_into(out: &mut String, component: &str) {
    for (i, part) in component.split(' ').enumerate() {
        if i > 0 {
            out.push('+');
        }
        out.extend(utf8_percent_encode(part, QUERY_COMPONENT));
    }
}

/// Decodes the fully encoded query as one string.
///
/// Decoding the joined form rather than each value keeps the output readable
/// while `&` and `=` inside values still appear literally.
pub fn encode_decoded(params: &QueryParams) -> Result<String, CodecError> {
    unescape(&encode(params))
}

/// Renders the query in the form the run asked for.
pub fn render_query(params: &QueryParams, decoded: bool) -> Result<String, CodecError> {
    if decoded {
        encode_decoded(params)
    } else {
        Ok(encode(params))
    }
}

/// Joins the pre-query part of a URL, a query and an optional fragment.
///
/// An empty query drops the `?` altogether.
pub fn materialize(base: &str, query: &str, fragment: Option<&str>) -> String {
    let mut out = String::with_capacity(base.len() + query.len() + 1);
    out.push_str(base);
    if !query.is_empty() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
