//! In-process transport backend (§4.1).
//!
//! Built from `tokio::sync::mpsc` (point-to-point: stream, router, dealer)
//! and `tokio::sync::broadcast` (fan-out: pub/sub), registered in a
//! process-global table keyed by [`Endpoint`] string so independent
//! `tokio::spawn` tasks can rendezvous without sharing anything but the
//! endpoint name — the same shape a real out-of-process transport would
//! have, just without the wire in between.

use super::{Endpoint, Frame, WouldBlock};
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};
use tokio::sync::{broadcast, mpsc};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection identity (§3 `ClientId` / worker address).
pub type Identity = Vec<u8>;

fn fresh_identity() -> Identity {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec()
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")
}

fn not_bound(endpoint: &Endpoint) -> io::Error {
    io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("nothing bound at {endpoint}"),
    )
}

// -- registry -----------------------------------------------------------

enum Hub {
    RouterLike(Arc<RouterLikeHub>),
    Pub(broadcast::Sender<Frame>),
}

fn registry() -> &'static Mutex<HashMap<String, Hub>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Hub>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn insert_hub(endpoint: &Endpoint, hub: Hub) {
    registry().lock().unwrap().insert(endpoint.0.clone(), hub);
}

fn lookup_router_like(endpoint: &Endpoint) -> io::Result<Arc<RouterLikeHub>> {
    match registry().lock().unwrap().get(&endpoint.0) {
        Some(Hub::RouterLike(hub)) => Ok(hub.clone()),
        _ => Err(not_bound(endpoint)),
    }
}

fn lookup_pub(endpoint: &Endpoint) -> io::Result<broadcast::Sender<Frame>> {
    match registry().lock().unwrap().get(&endpoint.0) {
        Some(Hub::Pub(tx)) => Ok(tx.clone()),
        _ => Err(not_bound(endpoint)),
    }
}

/// Shared state behind both the `router`/`dealer` pair and the
/// client-facing `stream` socket: a bound peer that accepts inbound
/// `(identity, frames)` envelopes and can address individual connected
/// peers by identity. Router and Stream differ only in how connect/
/// disconnect is surfaced, which lives in the public wrapper types below.
struct RouterLikeHub {
    inbound_tx: mpsc::UnboundedSender<(Identity, Vec<Frame>)>,
    peers: Mutex<HashMap<Identity, mpsc::UnboundedSender<Vec<Frame>>>>,
}

// -- Router / Dealer ------------------------------------------------------

/// The bound side of a router/dealer pair (§4.4's "two router sockets").
pub struct RouterSocket {
    hub: Arc<RouterLikeHub>,
    inbound_rx: mpsc::UnboundedReceiver<(Identity, Vec<Frame>)>,
}

impl RouterSocket {
    pub fn bind(endpoint: &Endpoint) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(RouterLikeHub {
            inbound_tx,
            peers: Mutex::new(HashMap::new()),
        });
        insert_hub(endpoint, Hub::RouterLike(hub.clone()));
        Self { hub, inbound_rx }
    }

    /// Receives one envelope, blocking until one is ready.
    pub async fn recv(&mut self) -> Option<(Identity, Vec<Frame>)> {
        self.inbound_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<(Identity, Vec<Frame>), WouldBlock> {
        self.inbound_rx.try_recv().map_err(|_| WouldBlock)
    }

    /// Routes `frames` to the peer previously seen under `identity`
    /// (§4.4's "[worker-addr, request-info, ...payload]" dispatch). A
    /// peer that has since disconnected is silently dropped, matching the
    /// frontend server's "if absent, drop" rule for stale routes.
    pub fn send_to(&self, identity: &Identity, frames: Vec<Frame>) -> io::Result<()> {
        let peers = self.hub.peers.lock().unwrap();
        if let Some(tx) = peers.get(identity) {
            let _ = tx.send(frames);
        }
        Ok(())
    }

    /// Forgets a peer so `send_to` no longer reaches it. Not called by the
    /// proxy's own dispatch path — §4.4's "ineligible until it next
    /// advertises" only removes FIFO membership, not the route itself, so
    /// a worker stays reachable between jobs. Kept for symmetry with
    /// `StreamSocket::send_to`'s close-on-empty-body behavior.
    pub fn forget(&self, identity: &Identity) {
        self.hub.peers.lock().unwrap().remove(identity);
    }
}

/// The connecting side of a router/dealer pair.
pub struct DealerSocket {
    hub: Arc<RouterLikeHub>,
    identity: Identity,
    inbound_rx: mpsc::UnboundedReceiver<Vec<Frame>>,
}

impl DealerSocket {
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let hub = lookup_router_like(endpoint)?;
        let identity = fresh_identity();
        let (tx, inbound_rx) = mpsc::unbounded_channel();
        hub.peers.lock().unwrap().insert(identity.clone(), tx);
        Ok(Self {
            hub,
            identity,
            inbound_rx,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn send(&self, frames: Vec<Frame>) -> io::Result<()> {
        self.hub
            .inbound_tx
            .send((self.identity.clone(), frames))
            .map_err(|_| broken_pipe())
    }

    pub async fn recv(&mut self) -> Option<Vec<Frame>> {
        self.inbound_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Vec<Frame>, WouldBlock> {
        self.inbound_rx.try_recv().map_err(|_| WouldBlock)
    }
}

impl Drop for DealerSocket {
    fn drop(&mut self) {
        self.hub.peers.lock().unwrap().remove(&self.identity);
    }
}

// -- Stream ---------------------------------------------------------------

/// The server-bound side of the client-facing stream socket (§4.1, §4.3).
pub struct StreamSocket {
    hub: Arc<RouterLikeHub>,
    inbound_rx: mpsc::UnboundedReceiver<(Identity, Vec<Frame>)>,
}

impl StreamSocket {
    pub fn bind(endpoint: &Endpoint) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(RouterLikeHub {
            inbound_tx,
            peers: Mutex::new(HashMap::new()),
        });
        insert_hub(endpoint, Hub::RouterLike(hub.clone()));
        Self { hub, inbound_rx }
    }

    /// Receives `(identity, body)`; an empty `body` is the connect/
    /// disconnect notification described in §4.1.
    pub async fn recv(&mut self) -> Option<(Identity, Frame)> {
        let (identity, mut frames) = self.inbound_rx.recv().await?;
        Some((identity, frames.pop().unwrap_or_default()))
    }

    /// Sends a response body to `identity`. An empty body closes the
    /// connection per transport convention (§4.3's loopback handling).
    pub fn send_to(&self, identity: &Identity, body: Frame) -> io::Result<()> {
        let is_close = body.is_empty();
        let peers = self.hub.peers.lock().unwrap();
        if let Some(tx) = peers.get(identity) {
            let _ = tx.send(vec![body]);
        }
        drop(peers);
        if is_close {
            self.hub.peers.lock().unwrap().remove(identity);
        }
        Ok(())
    }
}

/// The client side of the stream socket (used by the batching client and
/// by tests standing in for a raw TCP client).
pub struct StreamClient {
    hub: Arc<RouterLikeHub>,
    identity: Identity,
    inbound_rx: mpsc::UnboundedReceiver<Vec<Frame>>,
    closed: bool,
}

impl StreamClient {
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let hub = lookup_router_like(endpoint)?;
        let identity = fresh_identity();
        let (tx, inbound_rx) = mpsc::unbounded_channel();
        hub.peers.lock().unwrap().insert(identity.clone(), tx);
        let _ = hub.inbound_tx.send((identity.clone(), vec![Vec::new()]));
        Ok(Self {
            hub,
            identity,
            inbound_rx,
            closed: false,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn send(&self, body: Frame) -> io::Result<()> {
        self.hub
            .inbound_tx
            .send((self.identity.clone(), vec![body]))
            .map_err(|_| broken_pipe())
    }

    /// `None` means the server closed the connection; `Some(body)` may
    /// itself be empty if the server replied with an empty frame.
    pub async fn recv(&mut self) -> Option<Frame> {
        let mut frames = self.inbound_rx.recv().await?;
        Some(frames.pop().unwrap_or_default())
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.hub.peers.lock().unwrap().remove(&self.identity);
        let _ = self.hub.inbound_tx.send((self.identity.clone(), vec![Vec::new()]));
    }
}

// -- Pub / Sub --------------------------------------------------------------

/// The publishing side of the loopback/interrupt channels (§4.3, §4.5).
pub struct PubSocket {
    tx: broadcast::Sender<Frame>,
}

impl PubSocket {
    /// Creates the broadcast channel at `endpoint` (e.g. the server
    /// binding the interrupt-endpoint, §6).
    pub fn bind(endpoint: &Endpoint) -> Self {
        let (tx, _rx) = broadcast::channel(4096);
        insert_hub(endpoint, Hub::Pub(tx.clone()));
        Self { tx }
    }

    /// Joins a broadcast channel someone else bound (e.g. a worker
    /// connecting to the server-bound result-endpoint, §6). Multiple
    /// publishers sharing one `broadcast::Sender` is valid.
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        Ok(Self { tx: lookup_pub(endpoint)? })
    }

    pub fn send(&self, frame: Frame) -> io::Result<()> {
        // No subscribers yet is not an error: messages simply have no one
        // to deliver to, matching §9c's "late worker misses it" property.
        let _ = self.tx.send(frame);
        Ok(())
    }
}

/// The subscribing side.
pub struct SubSocket {
    rx: broadcast::Receiver<Frame>,
}

impl SubSocket {
    /// Creates the broadcast channel at `endpoint` (e.g. the server
    /// binding the result-endpoint while workers connect as publishers).
    pub fn bind(endpoint: &Endpoint) -> Self {
        let (tx, rx) = broadcast::channel(4096);
        insert_hub(endpoint, Hub::Pub(tx));
        Self { rx }
    }

    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let tx = lookup_pub(endpoint)?;
        Ok(Self { rx: tx.subscribe() })
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<Frame, WouldBlock> {
        self.rx.try_recv().map_err(|_| WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_dealer_round_trip() {
        let endpoint = Endpoint::new("inproc://test-router-dealer");
        let mut router = RouterSocket::bind(&endpoint);
        let dealer = DealerSocket::connect(&endpoint).unwrap();

        dealer.send(vec![b"hello".to_vec()]).unwrap();
        let (identity, frames) = router.recv().await.unwrap();
        assert_eq!(identity, *dealer.identity());
        assert_eq!(frames, vec![b"hello".to_vec()]);

        router.send_to(&identity, vec![b"world".to_vec()]).unwrap();
        let mut dealer = dealer;
        let reply = dealer.recv().await.unwrap();
        assert_eq!(reply, vec![b"world".to_vec()]);
    }

    #[tokio::test]
    async fn pub_sub_late_subscriber_misses_earlier_sends() {
        let endpoint = Endpoint::new("inproc://test-pub-sub");
        let publisher = PubSocket::bind(&endpoint);
        publisher.send(b"missed".to_vec()).unwrap();

        let mut sub = SubSocket::connect(&endpoint).unwrap();
        publisher.send(b"seen".to_vec()).unwrap();

        assert_eq!(sub.recv().await, Some(b"seen".to_vec()));
    }

    #[tokio::test]
    async fn stream_connect_and_disconnect_notify() {
        let endpoint = Endpoint::new("inproc://test-stream");
        let mut server = StreamSocket::bind(&endpoint);
        let client = StreamClient::connect(&endpoint).unwrap();

        let (id, body) = server.recv().await.unwrap();
        assert_eq!(id, *client.identity());
        assert!(body.is_empty());

        drop(client);
        let (id2, body2) = server.recv().await.unwrap();
        assert_eq!(id2, id);
        assert!(body2.is_empty());
    }
}
