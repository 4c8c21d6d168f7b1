//! The batching client (§4.6): alternates a request phase (produce up to
//! `batch_size` outgoing payloads) with a collect phase (receive replies
//! and feed each protocol's `stream_responses` reassembly), voluntarily
//! chunking any outgoing payload larger than the transport's internal
//! batch size so the framework's stream-insensitivity guarantee (§8 #2)
//! gets exercised even over the in-process backend (S6).

use crate::limits::ClientLimits;
use crate::protocol::http::response;
use crate::transport::inproc::StreamClient;
use crate::transport::Endpoint;
use log::error;
use std::io;

/// What the request phase produces: `None` means "nothing left to send".
pub type RequestFn = Box<dyn FnMut() -> Option<Vec<u8>> + Send>;

/// Invoked once per reassembled response; return `false` to end the
/// client's run loop once the current batch drains.
pub type CollectFn = Box<dyn FnMut(Vec<u8>) -> bool + Send>;

pub struct Client {
    socket: StreamClient,
    limits: ClientLimits,
    http_buf: Vec<u8>,
}

impl Client {
    pub fn connect(endpoint: &Endpoint, limits: ClientLimits) -> io::Result<Self> {
        Ok(Self {
            socket: StreamClient::connect(endpoint)?,
            limits,
            http_buf: Vec::new(),
        })
    }

    /// Sends `body`, splitting it into `transport_batch_size`-sized chunks
    /// if it exceeds the transport's internal batching boundary (S6):
    /// the frontend's resumable parser reassembles across the resulting
    /// multiple deliveries regardless of how many pieces arrive.
    fn send_possibly_chunked(&mut self, body: Vec<u8>) -> io::Result<()> {
        let chunk_size = self.limits.transport_batch_size;
        if body.len() <= chunk_size {
            return self.socket.send(body);
        }
        for chunk in body.chunks(chunk_size) {
            self.socket.send(chunk.to_vec())?;
        }
        Ok(())
    }

    /// Runs the HTTP variant of the request/collect loop until
    /// `request_fn` is exhausted and every outstanding response has been
    /// collected, or `collect_fn` asks to stop.
    pub async fn run_http(&mut self, mut request_fn: RequestFn, mut collect_fn: CollectFn) {
        loop {
            let mut sent = 0;
            while sent < self.limits.batch_size {
                let Some(body) = request_fn() else { break };
                if let Err(err) = self.send_possibly_chunked(body) {
                    error!("sending request: {err}");
                    return;
                }
                sent += 1;
            }
            if sent == 0 && self.http_buf.is_empty() {
                return;
            }

            let mut keep_going = true;
            for _ in 0..sent.max(1) {
                let Some(bytes) = self.socket.recv().await else {
                    return;
                };
                if bytes.is_empty() {
                    return;
                }
                self.http_buf.extend_from_slice(&bytes);
                for response in response::split_responses(&mut self.http_buf) {
                    if !collect_fn(response) {
                        keep_going = false;
                    }
                }
            }
            if !keep_going {
                return;
            }
        }
    }

    /// Runs the netstring variant: each `recv()` already yields one
    /// complete, unframed echo (no reassembly needed on this side, since
    /// the server strips the netstring envelope before replying).
    pub async fn run_netstring(&mut self, mut request_fn: RequestFn, mut collect_fn: CollectFn) {
        loop {
            let mut sent = 0;
            while sent < self.limits.batch_size {
                let Some(body) = request_fn() else { break };
                let framed = crate::protocol::netstring::Parser::serialize(&body);
                if let Err(err) = self.send_possibly_chunked(framed) {
                    error!("sending request: {err}");
                    return;
                }
                sent += 1;
            }
            if sent == 0 {
                return;
            }

            let mut keep_going = true;
            for _ in 0..sent {
                let Some(bytes) = self.socket.recv().await else {
                    return;
                };
                if bytes.is_empty() {
                    return;
                }
                if !collect_fn(bytes) {
                    keep_going = false;
                }
            }
            if !keep_going {
                return;
            }
        }
    }
}
