//! Protocol entities (§4.2) and the tagged-variant dispatch the frontend
//! server is parameterized over (§9's "dynamic dispatch" design note).

pub mod http;
pub mod netstring;
pub mod request_info;

use crate::limits::{NetstringLimits, ReqLimits};
pub use request_info::RequestInfo;

/// A complete, parsed request ready for a worker, tagged by which wire
/// protocol produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Http(http::request::Request),
    Netstring(netstring::Entity),
}

impl Request {
    /// The bytes forwarded to the proxy/worker as the job payload.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self {
            Request::Http(request) => request.to_bytes(),
            Request::Netstring(entity) => entity.body.clone(),
        }
    }

    pub fn http_version(&self) -> Option<http::types::Version> {
        match self {
            Request::Http(request) => Some(request.version),
            Request::Netstring(_) => None,
        }
    }

    pub fn wants_close(&self) -> bool {
        match self {
            Request::Http(request) => request.headers.wants_close(request.version),
            Request::Netstring(_) => false,
        }
    }
}

/// Per §9's "model as a tagged variant with a common interface" note: the
/// frontend server holds one `Protocol` and never matches on it directly,
/// it only calls `feed`/`serialize`/`timeout`.
#[derive(Debug, Clone)]
pub enum Protocol {
    Http(http::parser::Parser),
    Netstring(netstring::Parser),
}

impl Protocol {
    pub fn http(limits: ReqLimits) -> Self {
        Protocol::Http(http::parser::Parser::new(limits))
    }

    pub fn netstring(limits: NetstringLimits) -> Self {
        Protocol::Netstring(netstring::Parser::new(limits))
    }

    /// Feeds newly-arrived bytes in, returning every request the bytes
    /// completed. A parser failure terminates the session; the caller is
    /// responsible for sending `error.as_http(..)`/closing on `Err`.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Request>, crate::errors::ErrorKind> {
        match self {
            Protocol::Http(parser) => Ok(parser
                .feed(bytes)?
                .into_iter()
                .map(Request::Http)
                .collect()),
            Protocol::Netstring(parser) => Ok(parser
                .feed(bytes)
                .map_err(|_| crate::errors::ErrorKind::InvalidChunkLength)?
                .into_iter()
                .map(Request::Netstring)
                .collect()),
        }
    }

    /// The fixed "ran out of time" wire message for this protocol.
    pub fn timeout_message(&self) -> Vec<u8> {
        match self {
            Protocol::Http(parser) => {
                crate::errors::ErrorKind::timeout_response(parser.version_hint()).to_vec()
            }
            Protocol::Netstring(_) => Vec::new(),
        }
    }

    /// The response a parser failure should produce before the session is
    /// closed, if the protocol has a wire concept of an error response at
    /// all (§4.3: netstring sessions just close, no response frame).
    pub fn error_response(&self, err: &crate::errors::ErrorKind) -> Option<Vec<u8>> {
        match self {
            Protocol::Http(parser) => Some(err.as_http(parser.version_hint()).to_vec()),
            Protocol::Netstring(_) => None,
        }
    }
}
