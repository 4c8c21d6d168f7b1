//! The HTTP response type, plus the fixed status-line/reason-phrase table
//! (the `set_status_codes!` technique the teacher uses for its own
//! `Response` type — a `macro_rules!` table rather than a runtime match
//! over sparse integers).

use super::types::{HeaderMap, Version};
use memchr::memmem;

macro_rules! set_status_codes {
    ($($code:literal => $reason:literal),* $(,)?) => {
        /// The standard reason phrase for a status code, or `"Unknown"`.
        pub fn reason_phrase(code: u16) -> &'static str {
            match code {
                $($code => $reason,)*
                _ => "Unknown",
            }
        }
    };
}

set_status_codes! {
    200 => "OK",
    400 => "Bad Request",
    404 => "Not Found",
    413 => "Payload Too Large",
    500 => "Internal Server Error",
    501 => "Not Implemented",
    504 => "Gateway Timeout",
    505 => "HTTP Version Not Supported",
}

/// A response a worker produces or the server synthesizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub version: Version,
}

impl Response {
    pub fn new(code: u16, version: Version, body: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            headers: HeaderMap::new(),
            body: body.into(),
            version,
        }
    }

    /// A `200 OK text/plain` response, the only shape the prime demo's
    /// workers need to produce (§14.3).
    pub fn text(version: Version, body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(200, version, body);
        response
            .headers
            .push("content-type".to_string(), "text/plain".to_string());
        response
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.body.len());
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.code.to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(reason_phrase(self.code).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(b"access-control-allow-origin: *\r\n");
        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        if !self.headers.contains("content-length") {
            buf.extend_from_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Scans header bytes (up to but not including the blank line) for a
/// `content-length` line, case-insensitively. Defaults to `0` when absent,
/// matching a bodyless response.
fn parse_content_length(headers: &[u8]) -> usize {
    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let (name, value) = line.split_at(colon);
        if name.eq_ignore_ascii_case(b"content-length") {
            let value = value[1..].trim_ascii();
            if let Ok(text) = std::str::from_utf8(value) {
                return text.trim().parse().unwrap_or(0);
            }
        }
    }
    0
}

/// Splits complete HTTP responses off the front of `buf`, used by the
/// batching client to reassemble replies that arrive split across
/// multiple reads (§4.6). Leaves any trailing partial response buffered
/// for the next call.
pub fn split_responses(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let Some(header_end) = memmem::find(buf, b"\r\n\r\n") else {
            break;
        };
        let body_len = parse_content_length(&buf[..header_end]);
        let total_len = header_end + 4 + body_len;
        if buf.len() < total_len {
            break;
        }
        out.push(buf.drain(..total_len).collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_response_serializes_with_content_length() {
        let response = Response::text(Version::Http11, "42".as_bytes().to_vec());
        let bytes = response.to_bytes();
        let rendered = String::from_utf8_lossy(&bytes);
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.contains("content-length: 2\r\n"));
        assert!(rendered.ends_with("42"));
    }

    #[test]
    fn split_responses_leaves_partial_trailing_fragment_buffered() {
        let first = Response::text(Version::Http11, "1".as_bytes().to_vec()).to_bytes();
        let second = Response::text(Version::Http11, "2".as_bytes().to_vec()).to_bytes();
        let mut buf = first.clone();
        buf.extend_from_slice(&second[..second.len() - 1]);
        let responses = split_responses(&mut buf);
        assert_eq!(responses, vec![first]);
        assert_eq!(buf.len(), second.len() - 1);
    }

    #[test]
    fn split_responses_extracts_every_complete_response_at_once() {
        let first = Response::text(Version::Http11, "1".as_bytes().to_vec()).to_bytes();
        let second = Response::text(Version::Http11, "22".as_bytes().to_vec()).to_bytes();
        let mut buf = first.clone();
        buf.extend_from_slice(&second);
        let responses = split_responses(&mut buf);
        assert_eq!(responses, vec![first, second]);
        assert!(buf.is_empty());
    }
}
