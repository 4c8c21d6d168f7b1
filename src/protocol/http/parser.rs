//! The resumable HTTP streaming parser (§4.2, §9's "coroutine-style
//! streaming" note): an explicit state machine holding
//! `{state, partial_buffer, body_length, consumed}` rather than a
//! suspended coroutine, so it can be fed arbitrary byte spans one call at
//! a time and resume exactly where it left off.

use super::request::Request;
use super::types::{HeaderMap, Method, Version};
use crate::errors::ErrorKind;
use crate::limits::ReqLimits;
use memchr::memmem;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Method,
    Path,
    Version,
    Headers,
    Body { remaining: usize },
    ChunkLength,
    Chunk { remaining: usize },
    Trailer,
}

/// Streaming HTTP/1.x request parser. One instance per client session
/// (§3's `Session`); `feed` may be called any number of times with any
/// split of the input bytes and yields the same requests regardless of
/// the split (§8 invariant 2).
#[derive(Debug, Clone)]
pub struct Parser {
    limits: ReqLimits,
    state: State,
    buf: Vec<u8>,
    consumed: usize,

    method: Option<Method>,
    target: String,
    version: Option<Version>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Parser {
    pub fn new(limits: ReqLimits) -> Self {
        Self {
            limits,
            state: State::Method,
            buf: Vec::new(),
            consumed: 0,
            method: None,
            target: String::new(),
            version: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Best-effort HTTP version to render error responses in, before (or
    /// absent) a successfully parsed request line.
    pub fn version_hint(&self) -> Version {
        self.version.unwrap_or(Version::Http11)
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Request>, ErrorKind> {
        self.buf.extend_from_slice(bytes);
        let mut requests = Vec::new();
        while let Some(request) = self.step()? {
            requests.push(request);
        }
        Ok(requests)
    }

    fn check_size(&self) -> Result<(), ErrorKind> {
        if self.consumed + self.buf.len() > self.limits.max_request_size {
            return Err(ErrorKind::RequestTooLarge);
        }
        Ok(())
    }

    fn drain(&mut self, n: usize) -> Vec<u8> {
        let bytes: Vec<u8> = self.buf.drain(..n).collect();
        self.consumed += n;
        bytes
    }

    fn reset(&mut self) {
        self.state = State::Method;
        self.consumed = 0;
        self.method = None;
        self.target.clear();
        self.version = None;
        self.headers = HeaderMap::new();
        self.body = Vec::new();
    }

    /// Advances as far as possible with the bytes currently buffered.
    /// Returns `Ok(None)` when more input is required.
    fn step(&mut self) -> Result<Option<Request>, ErrorKind> {
        loop {
            self.check_size()?;
            match &self.state {
                State::Method => {
                    let Some(pos) = memmem::find(&self.buf, b" ") else {
                        if self.buf.len() > self.limits.max_method_len {
                            return Err(ErrorKind::MethodTooLong);
                        }
                        return Ok(None);
                    };
                    if pos > self.limits.max_method_len {
                        return Err(ErrorKind::MethodTooLong);
                    }
                    let token = self.drain(pos + 1);
                    let token = &token[..token.len() - 1];
                    self.method = Some(Method::parse(token).ok_or(ErrorKind::UnsupportedMethod)?);
                    self.state = State::Path;
                }
                State::Path => {
                    let Some(pos) = memmem::find(&self.buf, b" ") else {
                        return Ok(None);
                    };
                    let token = self.drain(pos + 1);
                    let token = &token[..token.len() - 1];
                    self.target = String::from_utf8(token.to_vec())
                        .map_err(|_| ErrorKind::InvalidUrl)?;
                    self.state = State::Version;
                }
                State::Version => {
                    let Some(pos) = memmem::find(&self.buf, b"\r\n") else {
                        if self.buf.len() > self.limits.max_version_len {
                            return Err(ErrorKind::VersionTooLong);
                        }
                        return Ok(None);
                    };
                    if pos > self.limits.max_version_len {
                        return Err(ErrorKind::VersionTooLong);
                    }
                    let token = self.drain(pos + 2);
                    let token = &token[..token.len() - 2];
                    self.version = Some(match Version::parse(token) {
                        Some(v) => v,
                        None if token.starts_with(b"HTTP/") => {
                            return Err(ErrorKind::UnsupportedVersion)
                        }
                        None => return Err(ErrorKind::InvalidVersion),
                    });
                    self.state = State::Headers;
                }
                State::Headers => {
                    let Some(pos) = memmem::find(&self.buf, b"\r\n") else {
                        if self.buf.len() > self.limits.max_header_line_len {
                            return Err(ErrorKind::InvalidHeader);
                        }
                        return Ok(None);
                    };
                    if pos == 0 {
                        self.drain(2);
                        self.state = self.body_mode_after_headers()?;
                        continue;
                    }
                    if pos > self.limits.max_header_line_len {
                        return Err(ErrorKind::InvalidHeader);
                    }
                    if self.headers.len() >= self.limits.max_header_count {
                        return Err(ErrorKind::TooManyHeaders);
                    }
                    let line = self.drain(pos + 2);
                    let line = &line[..line.len() - 2];
                    let colon = memmem::find(line, b":").ok_or(ErrorKind::InvalidHeader)?;
                    let name = std::str::from_utf8(&line[..colon])
                        .map_err(|_| ErrorKind::InvalidHeader)?
                        .to_owned();
                    let value = std::str::from_utf8(&line[colon + 1..])
                        .map_err(|_| ErrorKind::InvalidHeader)?
                        .trim()
                        .to_owned();
                    if name.is_empty() {
                        return Err(ErrorKind::InvalidHeader);
                    }
                    self.headers.push(name, value);
                }
                State::Body { remaining } => {
                    let remaining = *remaining;
                    if self.buf.len() < remaining {
                        return Ok(None);
                    }
                    let chunk = self.drain(remaining);
                    self.body.extend_from_slice(&chunk);
                    return Ok(Some(self.emit()));
                }
                State::ChunkLength => {
                    let Some(pos) = memmem::find(&self.buf, b"\r\n") else {
                        if self.buf.len() > self.limits.max_header_line_len {
                            return Err(ErrorKind::InvalidChunkLength);
                        }
                        return Ok(None);
                    };
                    let line = self.drain(pos + 2);
                    let mut line = &line[..line.len() - 2];
                    if let Some(semi) = memmem::find(line, b";") {
                        line = &line[..semi];
                    }
                    let text = std::str::from_utf8(line).map_err(|_| ErrorKind::InvalidChunkLength)?;
                    let size = usize::from_str_radix(text.trim(), 16)
                        .map_err(|_| ErrorKind::InvalidChunkLength)?;
                    if self.consumed + size > self.limits.max_request_size {
                        return Err(ErrorKind::RequestTooLarge);
                    }
                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::Chunk { remaining: size }
                    };
                }
                State::Chunk { remaining } => {
                    let remaining = *remaining;
                    if self.buf.len() < remaining + 2 {
                        return Ok(None);
                    }
                    let chunk = self.drain(remaining);
                    self.body.extend_from_slice(&chunk);
                    let terminator = self.drain(2);
                    if &terminator != b"\r\n" {
                        return Err(ErrorKind::InvalidChunkLength);
                    }
                    self.state = State::ChunkLength;
                }
                State::Trailer => {
                    let Some(pos) = memmem::find(&self.buf, b"\r\n") else {
                        return Ok(None);
                    };
                    self.drain(pos + 2);
                    if pos == 0 {
                        return Ok(Some(self.emit()));
                    }
                    // trailer header lines are read and discarded
                }
            }
        }
    }

    fn body_mode_after_headers(&mut self) -> Result<State, ErrorKind> {
        if let Some(encoding) = self.headers.get("transfer-encoding") {
            if encoding.eq_ignore_ascii_case("chunked") {
                return Ok(State::ChunkLength);
            }
        }
        if let Some(len) = self.headers.get("content-length") {
            let len: usize = len.trim().parse().map_err(|_| ErrorKind::InvalidContentLength)?;
            if self.consumed + len > self.limits.max_request_size {
                return Err(ErrorKind::RequestTooLarge);
            }
            if len == 0 {
                return Ok(State::Body { remaining: 0 });
            }
            return Ok(State::Body { remaining: len });
        }
        Ok(State::Body { remaining: 0 })
    }

    fn emit(&mut self) -> Request {
        let (path, query) = Request::split_target(&self.target);
        let method = self.method.take().unwrap_or(Method::Get);
        let version = self.version.unwrap_or(Version::Http11);
        let log_line = format!("{method} {} {version}", self.target);
        let request = Request {
            method,
            path,
            query,
            headers: std::mem::take(&mut self.headers),
            version,
            body: std::mem::take(&mut self.body),
            log_line,
        };
        self.reset();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get_request() {
        let mut parser = Parser::new(ReqLimits::default());
        let requests = parser
            .feed(b"GET /is_prime?possible_prime=7 HTTP/1.1\r\nhost: x\r\n\r\n")
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/is_prime");
        assert_eq!(requests[0].query.get("possible_prime"), Some("7"));
    }

    #[test]
    fn stream_insensitive_to_arbitrary_chunk_boundaries() {
        let whole = b"GET /a HTTP/1.1\r\nhost: x\r\n\r\n".to_vec();
        let mut one_shot = Parser::new(ReqLimits::default());
        let expected = one_shot.feed(&whole).unwrap();

        let mut chunked = Parser::new(ReqLimits::default());
        let mut got = Vec::new();
        for byte in &whole {
            got.extend(chunked.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn chunked_body_reassembles_exactly() {
        let mut parser = Parser::new(ReqLimits::default());
        let input = b"POST /x HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let requests = parser.feed(input).unwrap();
        assert_eq!(requests[0].body, b"Wikipedia");
    }

    #[test]
    fn oversized_request_yields_request_too_large() {
        let limits = ReqLimits {
            max_request_size: 8,
            ..ReqLimits::default()
        };
        let mut parser = Parser::new(limits);
        let err = parser.feed(b"GET /this-is-long HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, ErrorKind::RequestTooLarge);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut parser = Parser::new(ReqLimits::default());
        let err = parser.feed(b"FROB / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, ErrorKind::UnsupportedMethod);
    }
}
