//! Canonical query strings.
//!
//! Serializers build queries with [`QueryBuilder`], which keeps insertion order
//! and allows repeated keys (`option=a&option=b` is two items, not an
//! overwrite). Values are percent-encoded the way `encodeURIComponent` does,
//! since that is what the embedded document decodes.
//!
//! Queries that come back from the embedded document (design-mode edits) are
//! form-urlencoded instead; [`parse_pairs`] and [`strip_params`] handle those.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Everything `encodeURIComponent` escapes.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Parameters that only describe how the embed was loaded, never its
/// configuration.
pub const TRANSPORT_PARAMS: &[&str] = &["template", "mode"];

/// Percent-encode a single query component.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Deterministic `key=value&key=value` encoding of one widget's configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalQuery(String);

impl CanonicalQuery {
    /// Wrap an already-encoded query string.
    pub fn from_encoded(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded `(key, value)` pairs in order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        parse_pairs(&self.0)
    }

    /// All decoded values for `key`, in order.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.pairs()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }
}

impl fmt::Display for CanonicalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered builder for canonical queries.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    parts: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value`, encoding the value.
    pub fn push(&mut self, key: &str, value: &str) -> &mut Self {
        self.parts.push(format!("{key}={}", encode_component(value)));
        self
    }

    /// Append `key=value` where `value` is already encoded, e.g. a list joined
    /// from individually encoded items.
    pub fn push_encoded(&mut self, key: &str, value: &str) -> &mut Self {
        self.parts.push(format!("{key}={value}"));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn finish(&self) -> CanonicalQuery {
        CanonicalQuery(self.parts.join("&"))
    }
}

/// The query portion of either a bare query or a `/show?...` path or URL.
pub fn query_part(s: &str) -> &str {
    match s.rfind('?') {
        Some(i) => &s[i + 1..],
        None => s,
    }
}

/// Decode form-urlencoded pairs.
pub fn parse_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query_part(query).as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Encode pairs the way `URLSearchParams.toString()` does.
pub fn encode_pairs<'a, I>(pairs: I) -> CanonicalQuery
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    CanonicalQuery(serializer.finish())
}

/// Drop every occurrence of the named parameters, keeping the rest in order.
pub fn strip_params(query: &str, names: &[&str]) -> CanonicalQuery {
    let pairs = parse_pairs(query);
    encode_pairs(
        pairs
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str())),
    )
}
