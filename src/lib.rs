//! meshrelay - a multi-stage request/response framework over a brokered,
//! in-process message transport.
//!
//! A frontend server speaks a pluggable wire protocol (HTTP/1.x or
//! netstrings) to clients, hands parsed requests to a load-balancing
//! proxy, which fans them out over a FIFO of idle workers. Workers run
//! user-supplied `work` closures and publish results back to the
//! frontend over a loopback channel; a batching client drives the whole
//! pipeline end to end.
//!
//! # Layout
//!
//! - [`transport`] — the socket abstraction every other component talks
//!   to, backed by an in-process `tokio::sync` transport.
//! - [`protocol`] — wire entities: the HTTP and netstring parsers, the
//!   `RequestInfo` envelope, and the tagged `Protocol`/`Request` dispatch.
//! - [`server`] — the session-oriented frontend server and its quiesce
//!   lifecycle object.
//! - [`proxy`] — the load-balancing proxy and its worker FIFO.
//! - [`worker`] — the worker loop, interrupts, and job dispatch.
//! - [`client`] — the batching client.
//! - [`limits`] — one `*Limits` struct per component, each with sensible
//!   defaults.
//! - [`errors`] — the shared `ErrorKind` and its HTTP status mapping.

pub mod client;
pub mod errors;
pub mod limits;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod transport;
pub mod worker;

pub use crate::{
    client::Client,
    errors::ErrorKind,
    protocol::{Protocol, Request, RequestInfo},
    proxy::Proxy,
    server::{quiesce::Quiesce, Server},
    transport::{Context, Endpoint},
    worker::Worker,
};
