//! The lightweight netstring protocol (§4.2): `<ascii-decimal length>:<payload>,`.
//! No status codes or headers — malformed input just closes the session,
//! so this module carries its own narrow `Error` type rather than reusing
//! `crate::errors::ErrorKind` (§11).

use crate::limits::NetstringLimits;
use memchr::memchr;

/// A single netstring payload, with no further structure (§3's
/// `NetstringEntity`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub body: Vec<u8>,
}

/// Netstring-specific parse failures. There is no status-code surface to
/// map onto, so the frontend server just closes the connection on `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InvalidLength,
    MissingComma,
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length,
    Body { remaining: usize },
    Comma,
}

/// Streaming netstring parser, resumable across arbitrary chunk splits
/// exactly like [`super::http::parser::Parser`].
#[derive(Debug, Clone)]
pub struct Parser {
    limits: NetstringLimits,
    state: State,
    buf: Vec<u8>,
    body: Vec<u8>,
}

impl Parser {
    pub fn new(limits: NetstringLimits) -> Self {
        Self {
            limits,
            state: State::Length,
            buf: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Entity>, Error> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(entity) = self.step()? {
            out.push(entity);
        }
        Ok(out)
    }

    fn step(&mut self) -> Result<Option<Entity>, Error> {
        loop {
            match self.state {
                State::Length => {
                    let Some(pos) = memchr(b':', &self.buf) else {
                        if self.buf.len() > 20 {
                            return Err(Error::InvalidLength);
                        }
                        return Ok(None);
                    };
                    if pos == 0 {
                        return Err(Error::InvalidLength);
                    }
                    let token = std::str::from_utf8(&self.buf[..pos]).map_err(|_| Error::InvalidLength)?;
                    let len: usize = token.parse().map_err(|_| Error::InvalidLength)?;
                    if len > self.limits.max_body_size {
                        return Err(Error::TooLarge);
                    }
                    self.buf.drain(..pos + 1);
                    self.state = State::Body { remaining: len };
                }
                State::Body { remaining } => {
                    if self.buf.len() < remaining {
                        return Ok(None);
                    }
                    self.body = self.buf.drain(..remaining).collect();
                    self.state = State::Comma;
                }
                State::Comma => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    if self.buf[0] != b',' {
                        return Err(Error::MissingComma);
                    }
                    self.buf.drain(..1);
                    self.state = State::Length;
                    let body = std::mem::take(&mut self.body);
                    return Ok(Some(Entity { body }));
                }
            }
        }
    }

    /// `to_string(body)`: the framed wire form (§4.2).
    pub fn serialize(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 12);
        out.extend_from_slice(body.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(body);
        out.push(b',');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_frame() {
        let mut parser = Parser::new(NetstringLimits::default());
        let framed = Parser::serialize(b"hello world");
        let entities = parser.feed(&framed).unwrap();
        assert_eq!(entities, vec![Entity { body: b"hello world".to_vec() }]);
    }

    #[test]
    fn stream_insensitive_to_arbitrary_chunk_boundaries() {
        let framed = Parser::serialize(b"abcdefg");
        let mut parser = Parser::new(NetstringLimits::default());
        let mut got = Vec::new();
        for byte in &framed {
            got.extend(parser.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(got, vec![Entity { body: b"abcdefg".to_vec() }]);
    }

    #[test]
    fn leading_colon_is_invalid() {
        let mut parser = Parser::new(NetstringLimits::default());
        assert_eq!(parser.feed(b":body,").unwrap_err(), Error::InvalidLength);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let limits = NetstringLimits { max_body_size: 4 };
        let mut parser = Parser::new(limits);
        assert_eq!(parser.feed(b"10:").unwrap_err(), Error::TooLarge);
    }

    #[test]
    fn missing_trailing_comma_is_rejected() {
        let mut parser = Parser::new(NetstringLimits::default());
        assert_eq!(parser.feed(b"2:hix").unwrap_err(), Error::MissingComma);
    }
}
