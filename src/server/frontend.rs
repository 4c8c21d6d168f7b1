//! The session-oriented HTTP/netstring frontend server (§4.3): the only
//! component that speaks the client-facing wire protocol. Everything
//! downstream of it only ever sees `[request-info, payload]` frames.

use crate::protocol::{Protocol, Request, RequestInfo};
use crate::server::quiesce::Quiesce;
use crate::server::session::Session;
use crate::transport::inproc::{DealerSocket, PubSocket, StreamSocket, SubSocket};
use crate::transport::{Context, Endpoint};
use crate::limits::ServerLimits;
use log::{debug, error, warn};
use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// An optional direct-reply matcher so load balancers can probe liveness
/// without occupying a worker (§4.3's "health-check short-circuit").
pub struct HealthCheck {
    pub matches: Box<dyn Fn(&Request) -> bool + Send + Sync>,
    pub response: Vec<u8>,
}

pub struct Server {
    client: StreamSocket,
    upstream: DealerSocket,
    loopback: SubSocket,
    interrupts: PubSocket,
    protocol_template: Protocol,
    limits: ServerLimits,
    health_check: Option<HealthCheck>,
    sessions: HashMap<Vec<u8>, Session>,
    requests: HashMap<u64, Vec<u8>>,
    request_history: VecDeque<(u64, Instant)>,
    next_request_id: u32,
    quiesce: Arc<Quiesce>,
}

impl Server {
    /// `_ctx` is accepted for interface symmetry with every other
    /// component (§4.1: "every other component only ever talks to
    /// `Socket` and `Context`") even though the in-process backend's
    /// registry is process-global and doesn't need it threaded through.
    pub fn new(
        _ctx: &Context,
        client_endpoint: &Endpoint,
        upstream_endpoint: &Endpoint,
        result_endpoint: &Endpoint,
        interrupt_endpoint: &Endpoint,
        protocol_template: Protocol,
        limits: ServerLimits,
        quiesce: Arc<Quiesce>,
    ) -> io::Result<Self> {
        Ok(Self {
            client: StreamSocket::bind(client_endpoint),
            upstream: DealerSocket::connect(upstream_endpoint)?,
            loopback: SubSocket::bind(result_endpoint),
            interrupts: PubSocket::bind(interrupt_endpoint),
            protocol_template,
            limits,
            health_check: None,
            sessions: HashMap::new(),
            requests: HashMap::new(),
            request_history: VecDeque::new(),
            next_request_id: 0,
            quiesce,
        })
    }

    pub fn set_health_check(&mut self, health_check: HealthCheck) {
        self.health_check = Some(health_check);
    }

    /// Runs until the quiesce object reports `shutting_down`.
    pub async fn run(&mut self) {
        loop {
            if self.quiesce.is_shutting_down() {
                info_shutdown();
                return;
            }
            self.expire_timeouts();

            tokio::select! {
                biased;
                Some(frame) = self.loopback.recv() => {
                    self.handle_loopback(frame);
                }
                Some((identity, body)) = self.client.recv(), if !self.quiesce.is_draining() => {
                    self.handle_client_bytes(identity, body);
                }
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        }
    }

    fn handle_client_bytes(&mut self, identity: Vec<u8>, body: Vec<u8>) {
        if body.is_empty() {
            match self.sessions.remove(&identity) {
                None => {
                    debug!("session created");
                    self.sessions
                        .insert(identity, Session::new(self.protocol_template.clone()));
                }
                Some(session) => {
                    debug!("session closed, interrupting {} in-flight requests", session.enqueued.len());
                    for info64 in session.enqueued {
                        self.requests.remove(&info64);
                        let _ = self.interrupts.send(info64.to_le_bytes().to_vec());
                    }
                }
            }
            return;
        }

        let Some(session) = self.sessions.get_mut(&identity) else {
            warn!("bytes from a client with no session, dropping");
            return;
        };

        match session.parser.feed(&body) {
            Ok(requests) => {
                for request in requests {
                    if let Some(check) = &self.health_check {
                        if (check.matches)(&request) {
                            let _ = self.client.send_to(&identity, check.response.clone());
                            continue;
                        }
                    }

                    let id = self.next_request_id;
                    self.next_request_id = self.next_request_id.wrapping_add(1);
                    let mut info = RequestInfo::new(id, now_unix());
                    info.http_version = request.http_version();
                    info.flags.close = request.wants_close();
                    info.flags.keep_alive = !info.flags.close;
                    let info64 = info.as_u64();

                    self.requests.insert(info64, identity.clone());
                    session.enqueued.insert(info64);
                    if self.limits.request_history_capacity > 0 {
                        self.request_history.push_back((info64, Instant::now()));
                        while self.request_history.len() > self.limits.request_history_capacity {
                            self.request_history.pop_front();
                        }
                    }

                    let frames = vec![info.to_bytes().to_vec(), request.to_wire_bytes()];
                    if let Err(err) = self.upstream.send(frames) {
                        error!("forwarding request {id} to proxy: {err}");
                    }
                    debug!("enqueued request {id}");
                }
            }
            Err(err) => {
                let response = session.parser.error_response(&err);
                if let Some(bytes) = response {
                    let _ = self.client.send_to(&identity, bytes);
                }
                let _ = self.client.send_to(&identity, Vec::new());
                if let Some(session) = self.sessions.remove(&identity) {
                    for info64 in session.enqueued {
                        self.requests.remove(&info64);
                        let _ = self.interrupts.send(info64.to_le_bytes().to_vec());
                    }
                }
            }
        }
    }

    fn handle_loopback(&mut self, frame: Vec<u8>) {
        if frame.len() < 12 {
            warn!("loopback frame shorter than a RequestInfo, dropping");
            return;
        }
        let mut info_bytes = [0u8; 12];
        info_bytes.copy_from_slice(&frame[..12]);
        let info = RequestInfo::from_bytes(&info_bytes);
        let response = frame[12..].to_vec();
        let info64 = info.as_u64();

        let Some(identity) = self.requests.remove(&info64) else {
            debug!("response for request {info64} has no owner, client already gone");
            return;
        };
        if let Some(session) = self.sessions.get_mut(&identity) {
            session.enqueued.remove(&info64);
        }
        let _ = self.client.send_to(&identity, response);
    }

    fn expire_timeouts(&mut self) {
        if self.limits.request_history_capacity == 0 {
            return;
        }
        let now = Instant::now();
        while let Some(&(info64, inserted)) = self.request_history.front() {
            if now.duration_since(inserted) < self.limits.request_timeout {
                break;
            }
            self.request_history.pop_front();
            let Some(identity) = self.requests.remove(&info64) else {
                continue;
            };
            let message = self
                .sessions
                .get(&identity)
                .map(|session| session.parser.timeout_message())
                .unwrap_or_default();
            if let Some(session) = self.sessions.get_mut(&identity) {
                session.enqueued.remove(&info64);
            }
            warn!("request {info64} timed out");
            let _ = self.client.send_to(&identity, message);
            let _ = self.interrupts.send(info64.to_le_bytes().to_vec());
        }
    }
}

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn info_shutdown() {
    log::info!("frontend server shutting down");
}
