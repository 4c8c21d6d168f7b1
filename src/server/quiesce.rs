//! Daemon lifecycle/quiesce protocol (§6, §9's "global mutable state"
//! note): an explicit object `main` owns and hands to every component,
//! rather than a process-wide singleton flag.

use log::info;
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::signal::unix::{signal, SignalKind};

/// Tracks the two quiesce phases a daemon passes through between
/// receiving a termination signal and exiting: `draining` (stop accepting
/// new work, finish in flight) then `shutting_down` (exit).
pub struct Quiesce {
    draining: AtomicBool,
    shutting_down: AtomicBool,
}

impl Quiesce {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            draining: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Spawns the task that waits for SIGTERM/SIGINT, then walks the
    /// `draining` → `shutting_down` → exit sequence per §6.
    pub fn install_signal_handler(
        self: &Arc<Self>,
        drain: Duration,
        shutdown: Duration,
    ) -> io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            info!("quiesce: draining for {drain:?}");
            tokio::time::sleep(drain).await;
            this.draining.store(true, Ordering::SeqCst);
            info!("quiesce: shutting down in {shutdown:?}");
            tokio::time::sleep(shutdown).await;
            this.shutting_down.store(true, Ordering::SeqCst);
            info!("quiesce: exiting");
            std::process::exit(0);
        });
        Ok(())
    }
}
