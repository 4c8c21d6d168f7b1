//! The worker loop (§4.5): advertises itself to the upstream proxy,
//! accepts jobs, runs user `work`, and either forwards an intermediate
//! result downstream (multi-stage pipelines) or publishes a terminal
//! result to the loopback channel. Everything in one iteration runs
//! synchronously except the `poll` itself (§5's concurrency model), so
//! `interrupt_fn` can do a real non-blocking channel check mid-computation.

use crate::protocol::RequestInfo;
use crate::server::quiesce::Quiesce;
use crate::transport::inproc::{DealerSocket, PubSocket, SubSocket};
use crate::transport::{Context, Endpoint};
use crate::limits::WorkerLimits;
use log::{error, warn};
use std::{collections::HashSet, io};

/// What `work` produced.
pub struct WorkOutput {
    /// `true` forwards `messages` to the downstream dealer (multi-stage);
    /// `false` publishes the first message to the loopback as the
    /// terminal result.
    pub intermediate: bool,
    pub messages: Vec<Vec<u8>>,
    /// Replaces the worker's advertised heartbeat payload.
    pub heartbeat: Vec<u8>,
}

impl WorkOutput {
    pub fn terminal(message: Vec<u8>, heartbeat: Vec<u8>) -> Self {
        Self {
            intermediate: false,
            messages: vec![message],
            heartbeat,
        }
    }

    pub fn forward(messages: Vec<Vec<u8>>, heartbeat: Vec<u8>) -> Self {
        Self {
            intermediate: true,
            messages,
            heartbeat,
        }
    }
}

/// Errors `work` can raise. Neither variant is part of [`crate::errors::ErrorKind`]
/// (§11: they never cross a socket as bytes) — both are logged and
/// swallowed so the worker loop continues.
pub enum WorkError {
    Interrupted(u64),
    Failed(String),
}

pub type WorkFn =
    Box<dyn FnMut(&[u8], &RequestInfo, &mut dyn FnMut() -> bool) -> Result<WorkOutput, WorkError> + Send>;

pub struct Worker {
    upstream: DealerSocket,
    downstream: Option<DealerSocket>,
    loopback: PubSocket,
    interrupts: SubSocket,
    limits: WorkerLimits,
    heartbeat: Vec<u8>,
    work: WorkFn,
    cleanup: Option<Box<dyn FnMut() + Send>>,
    interrupt_set: HashSet<u64>,
    current_job: Option<u64>,
}

impl Worker {
    pub fn new(
        _ctx: &Context,
        upstream_endpoint: &Endpoint,
        downstream_endpoint: Option<&Endpoint>,
        loopback_endpoint: &Endpoint,
        interrupt_endpoint: &Endpoint,
        limits: WorkerLimits,
        initial_heartbeat: Vec<u8>,
        work: WorkFn,
    ) -> io::Result<Self> {
        Ok(Self {
            upstream: DealerSocket::connect(upstream_endpoint)?,
            downstream: downstream_endpoint.map(DealerSocket::connect).transpose()?,
            loopback: PubSocket::connect(loopback_endpoint)?,
            interrupts: SubSocket::connect(interrupt_endpoint)?,
            limits,
            heartbeat: initial_heartbeat,
            work,
            cleanup: None,
            interrupt_set: HashSet::new(),
            current_job: None,
        })
    }

    pub fn set_cleanup(&mut self, cleanup: Box<dyn FnMut() + Send>) {
        self.cleanup = Some(cleanup);
    }

    pub async fn run(&mut self, quiesce: &Quiesce) {
        self.advertise();
        loop {
            if quiesce.is_shutting_down() {
                return;
            }
            tokio::select! {
                biased;
                Some(bytes) = self.interrupts.recv() => {
                    if let Some(key) = decode_interrupt(&bytes) {
                        self.interrupt_set.insert(key);
                    }
                }
                Some(frames) = self.upstream.recv() => {
                    self.handle_job(frames);
                }
                _ = tokio::time::sleep(self.limits.heartbeat_interval) => {
                    self.advertise();
                }
            }
        }
    }

    fn handle_job(&mut self, frames: Vec<Vec<u8>>) {
        if frames.is_empty() || frames[0].len() != 12 {
            warn!("malformed job envelope from proxy, dropping");
            return;
        }
        let mut info_bytes = [0u8; 12];
        info_bytes.copy_from_slice(&frames[0]);
        let info = RequestInfo::from_bytes(&info_bytes);
        let payload = frames.get(1).cloned().unwrap_or_default();
        let info64 = info.as_u64();
        self.current_job = Some(info64);

        self.drain_pending_interrupts();
        if self.interrupt_set.remove(&info64) {
            warn!("job {info64} already interrupted, skipping work");
            self.finish_job();
            return;
        }

        let interrupts = &mut self.interrupts;
        let interrupt_set = &mut self.interrupt_set;
        let mut interrupt_fn = move || -> bool {
            while let Ok(bytes) = interrupts.try_recv() {
                if let Some(key) = decode_interrupt(&bytes) {
                    if key == info64 {
                        return true;
                    }
                    interrupt_set.insert(key);
                }
            }
            interrupt_set.contains(&info64)
        };

        match (self.work)(&payload, &info, &mut interrupt_fn) {
            Ok(output) => {
                self.heartbeat = output.heartbeat;
                if output.intermediate {
                    self.forward_downstream(&info, output.messages);
                } else {
                    self.publish_terminal(&info, output.messages);
                }
            }
            Err(WorkError::Interrupted(id)) => {
                warn!("work for job {id} observed an interrupt and stopped early");
            }
            Err(WorkError::Failed(message)) => {
                warn!("work for job {info64} failed: {message}");
            }
        }
        self.finish_job();
    }

    fn forward_downstream(&mut self, info: &RequestInfo, messages: Vec<Vec<u8>>) {
        let Some(downstream) = &self.downstream else {
            error!("intermediate result produced but worker has no downstream configured");
            return;
        };
        let mut frames = vec![info.to_bytes().to_vec()];
        frames.extend(messages);
        if let Err(err) = downstream.send(frames) {
            error!("forwarding intermediate result downstream: {err}");
        }
    }

    fn publish_terminal(&mut self, info: &RequestInfo, mut messages: Vec<Vec<u8>>) {
        if messages.len() > 1 {
            warn!(
                "work produced {} messages for a terminal result, using the first and dropping the rest",
                messages.len()
            );
        }
        let message = if messages.is_empty() {
            Vec::new()
        } else {
            messages.remove(0)
        };
        let mut frame = info.to_bytes().to_vec();
        frame.extend(message);
        if let Err(err) = self.loopback.send(frame) {
            error!("publishing terminal result: {err}");
        }
    }

    fn finish_job(&mut self) {
        self.current_job = None;
        if let Some(cleanup) = &mut self.cleanup {
            cleanup();
        }
        self.drain_pending_interrupts();
        self.advertise();
    }

    fn drain_pending_interrupts(&mut self) {
        while let Ok(bytes) = self.interrupts.try_recv() {
            if let Some(key) = decode_interrupt(&bytes) {
                self.interrupt_set.insert(key);
            }
        }
    }

    fn advertise(&mut self) {
        if let Err(err) = self.upstream.send(vec![self.heartbeat.clone()]) {
            error!("advertise failed: {err}");
        }
    }
}

fn decode_interrupt(bytes: &[u8]) -> Option<u64> {
    if bytes.len() == 8 {
        Some(u64::from_le_bytes(bytes.try_into().unwrap()))
    } else {
        None
    }
}
