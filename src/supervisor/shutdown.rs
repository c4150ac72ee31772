// src/supervisor/shutdown.rs

//! Host signal listener and the kill-all loop.
//!
//! The listener intercepts SIGINT and SIGTERM. SIGKILL (and SIGSTOP) can never
//! be caught by a process, so a host killed that way leaves its children
//! running; nothing here can change that.

use std::sync::{Arc, Weak};

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::supervisor::managed::ManagedProcess;
use crate::supervisor::registry::{Claimed, ProcessRegistry};
use crate::supervisor::{ProcessSupervisor, SupervisorInner};

/// Listen for the first SIGINT/SIGTERM and run the shutdown protocol.
///
/// Holds only a weak reference, so a dropped supervisor stops listening.
pub(crate) fn spawn_signal_listener(inner: Weak<SupervisorInner>) -> std::io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            Some(()) = sigint.recv() => Signal::SIGINT,
            Some(()) = sigterm.recv() => Signal::SIGTERM,
            else => {
                debug!("signal streams closed; listener exiting");
                return;
            }
        };

        info!(?received, "shutdown signal received");

        let Some(inner) = inner.upgrade() else {
            debug!("supervisor dropped before shutdown signal was handled");
            return;
        };
        ProcessSupervisor::from_inner(inner).shutdown(received).await;
    }))
}

/// Signal every claimed process, deregister it once reaped, and wait for its
/// outcome.
///
/// Waits are unbounded: a child that ignores `signal` blocks this forever.
/// Returns how many processes were handled.
pub(crate) async fn terminate_claimed(
    registry: &Arc<ProcessRegistry<ManagedProcess>>,
    claimed: Vec<Claimed<ManagedProcess>>,
    signal: Signal,
) -> usize {
    let count = claimed.len();
    let mut set = JoinSet::new();

    for Claimed { pid, serial, value: proc } in claimed {
        let registry = Arc::clone(registry);
        set.spawn(async move {
            if let Err(e) = proc.signal(signal).await {
                warn!(pid, error = %e, "error sending signal to process");
                registry.remove_if(pid, serial, false);
                return;
            }

            // Deregister as soon as the pid is reaped, then let the output drain.
            proc.wait_reaped().await;
            registry.remove_if(pid, serial, false);

            match proc.wait().await {
                Ok(()) => info!(pid, "process stopped"),
                Err(e) => debug!(pid, error = %e, "process stopped with error"),
            }
        });
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "kill-all task failed");
        }
    }

    count
}
