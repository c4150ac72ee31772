// src/exec/interrupt.rs

//! One-shot forwarding of host interrupts to a single child.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind, Signal as SignalStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Host signal listeners, registered before the child is spawned so that
/// registration errors surface while nothing is running yet.
pub struct InterruptListener {
    sigint: SignalStream,
    sigterm: SignalStream,
}

impl std::fmt::Debug for InterruptListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptListener").finish_non_exhaustive()
    }
}

impl InterruptListener {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Forward the first SIGINT/SIGTERM the host receives to `pid` as SIGTERM.
    ///
    /// Dropping the returned sender disarms the forwarder.
    pub fn arm(mut self, pid: u32) -> oneshot::Sender<()> {
        let (close_tx, close_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = self.sigint.recv() => forward(pid, "SIGINT"),
                _ = self.sigterm.recv() => forward(pid, "SIGTERM"),
                _ = close_rx => {
                    debug!(pid, "interrupt forwarding closed");
                }
            }
        });

        close_tx
    }
}

fn forward(pid: u32, received: &str) {
    info!(pid, received, "host interrupted; sending SIGTERM to child");
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to forward interrupt to child");
    }
}
