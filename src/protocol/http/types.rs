//! Wire-level HTTP types shared by the parser, request, and response
//! modules. Continues the teacher's `set_status_codes!` table-macro
//! technique for the reason phrase lookup, and its habit of keeping
//! `Method`/`Version` as plain `#[repr]`-free enums matched on directly
//! rather than boxed trait objects.

use std::fmt;

/// HTTP methods the streaming parser recognizes. An unrecognized token is
/// a `501`, not a variant here — see `Method::parse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl Method {
    pub fn parse(token: &[u8]) -> Option<Self> {
        match token {
            b"GET" => Some(Self::Get),
            b"HEAD" => Some(Self::Head),
            b"POST" => Some(Self::Post),
            b"PUT" => Some(Self::Put),
            b"DELETE" => Some(Self::Delete),
            b"OPTIONS" => Some(Self::Options),
            b"PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP/0.9 is explicitly out of scope (SPEC_FULL.md carries no
/// `Http09Limits`-style feature); only the two versions the parser state
/// machine and `RequestInfo`'s 1-bit version flag need to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn parse(token: &[u8]) -> Option<Self> {
        match token {
            b"HTTP/1.0" => Some(Self::Http10),
            b"HTTP/1.1" => Some(Self::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single header. Case is preserved on the name as received; lookups
/// compare case-insensitively (§8 invariant 1: "headers preserved as a
/// multimap keyed case-insensitively but order-preserving within a key").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Order-preserving multimap of headers, matching the teacher's
/// `HeaderMap` but backed by a `Vec` rather than a fixed-capacity array
/// since the streaming parser has no compile-time bound on header count
/// beyond `ReqLimits::max_header_count`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: String, value: String) {
        self.entries.push(Header { name, value });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// `true` if `Connection: close` was sent, i.e. the opposite of
    /// keep-alive for this version (used to derive `ConnectionFlags`).
    pub fn wants_close(&self, version: Version) -> bool {
        match self.get("connection").map(str::to_ascii_lowercase) {
            Some(v) if v == "close" => true,
            Some(v) if v == "keep-alive" => false,
            _ => version == Version::Http10,
        }
    }
}

/// Ordered multi-map of query parameters (§4.2: "duplicate keys
/// accumulate into a list preserving order").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    entries: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: String, value: String) {
        self.entries.push((key, value));
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive_but_preserves_original_case() {
        let mut headers = HeaderMap::new();
        headers.push("Content-Type".to_string(), "text/plain".to_string());
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.iter().next().unwrap().0, "Content-Type");
    }

    #[test]
    fn query_preserves_duplicate_key_order() {
        let mut query = Query::new();
        query.push("a".into(), "1".into());
        query.push("a".into(), "2".into());
        assert_eq!(query.get_all("a").collect::<Vec<_>>(), vec!["1", "2"]);
    }
}
