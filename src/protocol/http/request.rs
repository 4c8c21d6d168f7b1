//! The parsed HTTP request type and its serializer (§4.2's `to_string`).

use super::types::{HeaderMap, Method, Query, Version};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

/// A fully parsed request, produced by [`super::parser::Parser`] and
/// consumed by worker code. `log_line` is a one-shot rendering of
/// `"METHOD path version"` captured at parse time for access logging,
/// matching the teacher's habit of stashing a formatted line on the
/// request rather than re-deriving it at log time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Query,
    pub headers: HeaderMap,
    pub version: Version,
    pub body: Vec<u8>,
    pub log_line: String,
}

impl Request {
    /// Splits a raw request target into `(path, query)` per §4.2: decode
    /// the whole target first, then split on the first `?`.
    pub fn split_target(raw_target: &str) -> (String, Query) {
        let decoded = percent_decode_str(raw_target)
            .decode_utf8()
            .map(|cow| cow.into_owned())
            .unwrap_or_else(|_| raw_target.to_owned());

        let mut query = Query::new();
        let (path, query_str) = match decoded.split_once('?') {
            Some((path, rest)) => (path.to_owned(), Some(rest)),
            None => (decoded, None),
        };

        if let Some(query_str) = query_str {
            for pair in query_str.split('&') {
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((key, value)) => query.push(key.to_owned(), value.to_owned()),
                    None => query.push(pair.to_owned(), String::new()),
                }
            }
        }

        (path, query)
    }

    /// Renders `method path?query version\r\nheaders\r\n\r\nbody`,
    /// inserting `Content-Length` when the body is non-empty and the
    /// header is absent (§4.2).
    pub fn to_bytes(&self) -> Vec<u8> {
        // path segments keep their separating '/'; re-decode it since
        // NON_ALPHANUMERIC would otherwise escape it.
        let target = utf8_percent_encode(&self.path, NON_ALPHANUMERIC)
            .to_string()
            .replace("%2F", "/");
        let mut out = target;
        if self.query.iter().next().is_some() {
            out.push('?');
            let mut first = true;
            for (k, v) in self.query.iter() {
                if !first {
                    out.push('&');
                }
                first = false;
                out.push_str(&utf8_percent_encode(k, NON_ALPHANUMERIC).to_string());
                if !v.is_empty() {
                    out.push('=');
                    out.push_str(&utf8_percent_encode(v, NON_ALPHANUMERIC).to_string());
                }
            }
        }

        let mut buf = Vec::with_capacity(out.len() + self.body.len() + 64);
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(out.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        if !self.body.is_empty() && !self.headers.contains("content-length") {
            buf.extend_from_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_target_decodes_then_splits_on_first_question_mark() {
        let (path, query) = Request::split_target("/is_prime?possible_prime=3%2C5");
        assert_eq!(path, "/is_prime");
        assert_eq!(query.get("possible_prime"), Some("3,5"));
    }

    #[test]
    fn split_target_with_no_query_has_empty_query() {
        let (path, query) = Request::split_target("/health");
        assert_eq!(path, "/health");
        assert_eq!(query.iter().next(), None);
    }
}
