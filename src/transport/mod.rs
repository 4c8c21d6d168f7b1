//! Transport abstraction (§4.1).
//!
//! Every other component — frontend server, proxy, worker loop, batching
//! client — only ever talks to [`Socket`] and [`Context`]. The concrete
//! backend lives in [`inproc`] and is built from `tokio::sync` channels; a
//! real deployment would swap that module for a binding to an actual
//! out-of-process broker transport (e.g. ZeroMQ) without touching anything
//! above this layer.

pub mod inproc;

use std::{fmt, time::Duration};

/// Internal batch size the transport buffers messages in; callers must
/// tolerate a single logical message crossing this boundary (S6).
pub const TRANSPORT_BATCH_SIZE: usize = 8192;

/// A single frame on the wire. Frames are grouped into multi-part messages
/// by the `_all` send/recv variants.
pub type Frame = Vec<u8>;

/// An addressable transport location, e.g. `inproc://upstream`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(pub String);

impl Endpoint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The four socket kinds the framework needs. `Stream` is the client-facing
/// two-frame-envelope socket (§4.1); `Router`/`Dealer` carry request-info
/// envelopes between server/proxy/worker; `Pub`/`Sub` carry loopback results
/// and interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Router,
    Dealer,
    Pub,
    Sub,
}

/// Non-blocking recv found nothing ready; this is not an error (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// A handle through which sockets are created. Mirrors the teacher's
/// builder-owns-shared-state pattern (`Server` owning its queues): the
/// `Context` owns the process-wide endpoint registry.
#[derive(Debug, Clone, Default)]
pub struct Context {
    _private: (),
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Poll timeout: block until a message is ready, or fire once the duration
/// elapses with an empty result (mirrors a zero-length poll list never
/// blocking forever, per §4.1's "poll(items, timeout)").
pub async fn sleep_or_ready<F>(timeout: Duration, fut: F) -> Option<F::Output>
where
    F: std::future::Future,
{
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = tokio::time::sleep(timeout) => None,
    }
}
