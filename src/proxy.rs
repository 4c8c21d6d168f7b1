//! The load-balancing proxy (§4.4): a single-threaded cooperative loop
//! that matches upstream jobs to idle downstream workers via a FIFO of
//! heartbeats. Per §9's "cyclic references" design note, worker
//! addresses and FIFO membership are tied together with token-keyed
//! side-tables (`HashMap`s), never raw pointers into the `VecDeque`.

use crate::limits::ProxyLimits;
use crate::server::quiesce::Quiesce;
use crate::transport::inproc::RouterSocket;
use crate::transport::{Context, Endpoint};
use log::{debug, error, warn};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

pub type WorkerAddress = Vec<u8>;
type Token = u64;

/// One live entry in the FIFO: a worker's most recent heartbeat.
pub struct FifoEntry {
    pub token: Token,
    pub worker: WorkerAddress,
    pub heartbeat: Vec<u8>,
    last_seen: Instant,
}

/// Invoked with the current FIFO and the job payload; returns the token
/// of the preferred entry, or `None` for "don't care" (§4.4).
pub type ChooseFn = Box<dyn Fn(&VecDeque<FifoEntry>, &[u8]) -> Option<Token> + Send + Sync>;

pub struct Proxy {
    upstream: RouterSocket,
    downstream: RouterSocket,
    limits: ProxyLimits,
    fifo: VecDeque<FifoEntry>,
    workers: HashMap<WorkerAddress, Token>,
    next_token: Token,
    choose: Option<ChooseFn>,
}

impl Proxy {
    pub fn new(
        _ctx: &Context,
        upstream_endpoint: &Endpoint,
        downstream_endpoint: &Endpoint,
        limits: ProxyLimits,
    ) -> Self {
        Self {
            upstream: RouterSocket::bind(upstream_endpoint),
            downstream: RouterSocket::bind(downstream_endpoint),
            limits,
            fifo: VecDeque::new(),
            workers: HashMap::new(),
            next_token: 0,
            choose: None,
        }
    }

    pub fn set_choose(&mut self, choose: ChooseFn) {
        self.choose = Some(choose);
    }

    pub async fn run(&mut self, quiesce: &Quiesce) {
        loop {
            if quiesce.is_shutting_down() {
                return;
            }
            self.cull_expired();

            if self.fifo.is_empty() {
                // No idle workers: polling upstream would only queue jobs
                // we can't dispatch, so let them sit in the transport.
                tokio::select! {
                    biased;
                    Some((worker, frames)) = self.downstream.recv() => self.handle_downstream(worker, frames),
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            } else {
                tokio::select! {
                    biased;
                    Some((worker, frames)) = self.downstream.recv() => self.handle_downstream(worker, frames),
                    Some((_discarded, frames)) = self.upstream.recv() => self.handle_upstream(frames),
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }
        }
    }

    fn handle_downstream(&mut self, worker: WorkerAddress, mut frames: Vec<Vec<u8>>) {
        let heartbeat = frames.pop().unwrap_or_default();
        let now = Instant::now();
        if let Some(&token) = self.workers.get(&worker) {
            if let Some(entry) = self.fifo.iter_mut().find(|entry| entry.token == token) {
                entry.heartbeat = heartbeat;
                entry.last_seen = now;
                debug!("worker re-advertised, position preserved");
                return;
            }
        }
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.fifo.push_back(FifoEntry {
            token,
            worker: worker.clone(),
            heartbeat,
            last_seen: now,
        });
        self.workers.insert(worker, token);
        debug!("worker advertised, fifo depth now {}", self.fifo.len());
    }

    fn handle_upstream(&mut self, frames: Vec<Vec<u8>>) {
        if self.fifo.is_empty() {
            warn!("dropping job: no idle workers advertised");
            return;
        }
        let payload = frames.get(1).map(Vec::as_slice).unwrap_or(&[]);
        let chosen = self
            .choose
            .as_ref()
            .and_then(|choose| choose(&self.fifo, payload))
            .filter(|token| self.fifo.iter().any(|entry| entry.token == *token));
        let used_fallback = chosen.is_none();
        let token = chosen.unwrap_or_else(|| self.fifo.front().expect("checked non-empty").token);

        let position = self
            .fifo
            .iter()
            .position(|entry| entry.token == token)
            .expect("token came from fifo contents");
        let entry = self.fifo.remove(position).expect("position just found");
        self.workers.remove(&entry.worker);

        debug!(
            "dispatching job to worker (fifo head fallback: {used_fallback})"
        );
        if let Err(err) = self.downstream.send_to(&entry.worker, frames) {
            error!("dispatch to worker failed: {err}");
        }
    }

    fn cull_expired(&mut self) {
        let now = Instant::now();
        let expiry = self.limits.worker_expiry;
        let before = self.fifo.len();
        self.fifo.retain(|entry| now.duration_since(entry.last_seen) < expiry);
        if self.fifo.len() != before {
            let surviving: HashSet<Token> = self.fifo.iter().map(|entry| entry.token).collect();
            self.workers.retain(|_, token| surviving.contains(token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: Token, worker: &[u8]) -> FifoEntry {
        FifoEntry {
            token,
            worker: worker.to_vec(),
            heartbeat: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn choose_callback_falls_back_to_fifo_head_on_unknown_token() {
        let mut fifo = VecDeque::new();
        fifo.push_back(entry(1, b"a"));
        fifo.push_back(entry(2, b"b"));
        let choose: ChooseFn = Box::new(|_fifo, _payload| Some(999));
        let result = choose(&fifo, b"anything").filter(|t| fifo.iter().any(|e| e.token == *t));
        assert_eq!(result, None);
    }
}
