// src/supervisor/managed.rs

//! Supervisor-tracked handle around a running [`AsyncProcess`].

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::errors::{ProcError, Result};
use crate::exec::{AsyncProcess, CaptureBuffers};
use crate::supervisor::options::{ErrorHook, ExitHook};
use crate::supervisor::registry::ProcessRegistry;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// How a managed process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Non-zero exit code, or killed by a signal.
    Failed {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Waiting on the process or draining its output failed.
    Error(String),
}

impl ExitOutcome {
    fn from_wait(res: &Result<std::process::ExitStatus>) -> Self {
        match res {
            Ok(_) => ExitOutcome::Success,
            Err(ProcError::Exited { code, signal, .. }) => ExitOutcome::Failed {
                code: *code,
                signal: *signal,
            },
            Err(e) => ExitOutcome::Error(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Success => Some(0),
            ExitOutcome::Failed { code, .. } => *code,
            ExitOutcome::Error(_) => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitOutcome::Failed { signal, .. } => *signal,
            _ => None,
        }
    }

    /// The terminal error for this outcome, if it is not a success.
    pub fn to_result(&self, program: &str) -> Result<()> {
        match self {
            ExitOutcome::Success => Ok(()),
            ExitOutcome::Failed { code, signal } => Err(ProcError::Exited {
                program: program.to_string(),
                code: *code,
                signal: *signal,
            }),
            ExitOutcome::Error(message) => Err(ProcError::Wait {
                program: program.to_string(),
                source: io::Error::other(message.clone()),
            }),
        }
    }
}

/// Callbacks run by the exit task after the outcome is published.
#[derive(Clone, Default)]
pub(crate) struct ExitHooks {
    pub on_error: Option<ErrorHook>,
    pub on_exit: Option<ExitHook>,
}

struct SignalRequest {
    signal: Signal,
    ack: oneshot::Sender<Result<()>>,
}

struct ManagedInner {
    pid: u32,
    serial: u64,
    program: String,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
    reaped_rx: watch::Receiver<bool>,
    signal_tx: mpsc::UnboundedSender<SignalRequest>,
    capture: Option<CaptureBuffers>,
}

/// Handle to a process tracked by a
/// [`ProcessSupervisor`](crate::supervisor::ProcessSupervisor).
///
/// Cheap to clone; every clone refers to the same process. The OS child
/// itself is owned by a background task that races its exit against incoming
/// signal requests, so a signal is only ever delivered to a child that has not
/// been reaped yet.
///
/// Exit happens in two steps. First the child is reaped: from then on it is
/// no longer tracked and signals fail. Then its output pipes are drained,
/// which can take longer if a grandchild kept them open, and only after that
/// is the outcome published.
#[derive(Clone)]
pub struct ManagedProcess {
    inner: Arc<ManagedInner>,
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.inner.pid)
            .field("serial", &self.inner.serial)
            .field("program", &self.inner.program)
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl ManagedProcess {
    /// Start `process`, register it, then hand it to its exit task.
    ///
    /// Registration happens before the exit task exists, so a process that
    /// exits instantly can never be deregistered before it was registered.
    /// If registration fails the child is killed, reaped and never tracked.
    pub(crate) fn launch(
        mut process: AsyncProcess,
        hooks: ExitHooks,
        registry: &Arc<ProcessRegistry<ManagedProcess>>,
    ) -> Result<Self> {
        let capture = process.capture_buffers();
        let pid = process.start()?;
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);

        let (exit_tx, exit_rx) = watch::channel(None);
        let (reaped_tx, reaped_rx) = watch::channel(false);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let handle = ManagedProcess {
            inner: Arc::new(ManagedInner {
                pid,
                serial,
                program: process.spec().program().to_string(),
                exit_rx,
                reaped_rx,
                signal_tx,
                capture,
            }),
        };

        if let Err(e) = registry.insert(pid, serial, handle.clone()) {
            warn!(pid, error = %e, "refusing to track process; killing it");
            if let Err(kill_err) = process.signal(Signal::SIGKILL) {
                warn!(pid, error = %kill_err, "failed to kill untracked process");
            }
            tokio::spawn(async move {
                let _ = process.wait().await;
            });
            return Err(e);
        }

        tokio::spawn(run_exit_task(
            process,
            pid,
            serial,
            ExitChannels { exit_tx, reaped_tx },
            signal_rx,
            Arc::downgrade(registry),
            hooks,
        ));

        Ok(handle)
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn program(&self) -> &str {
        &self.inner.program
    }

    /// Outcome, if the process has exited.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        (*self.inner.exit_rx.borrow()).clone()
    }

    /// Whether the outcome (exit plus fully drained output) is known.
    pub fn has_exited(&self) -> bool {
        self.inner.exit_rx.borrow().is_some()
    }

    /// Whether the OS process has exited and been reaped. Its output may
    /// still be draining.
    pub fn is_reaped(&self) -> bool {
        *self.inner.reaped_rx.borrow()
    }

    /// Resolve once the OS process has been reaped.
    pub async fn wait_reaped(&self) {
        let mut rx = self.inner.reaped_rx.clone();
        // A closed channel means the exit task is gone, which also ends the child.
        let _ = rx.wait_for(|reaped| *reaped).await;
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome().and_then(|outcome| outcome.code())
    }

    /// Wait for the process to exit and return its outcome.
    ///
    /// There is no timeout. Any number of callers may wait concurrently.
    pub async fn wait_outcome(&self) -> Result<ExitOutcome> {
        let mut rx = self.inner.exit_rx.clone();
        let outcome: Option<ExitOutcome> = {
            let guard = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| ProcError::ExitUnreported(self.inner.pid))?;
            (*guard).clone()
        };
        outcome.ok_or(ProcError::ExitUnreported(self.inner.pid))
    }

    /// Wait for the process to exit; `Ok(())` on a clean exit, otherwise the
    /// terminal error.
    pub async fn wait(&self) -> Result<()> {
        self.wait_outcome().await?.to_result(&self.inner.program)
    }

    /// Send `signal` to the process.
    ///
    /// Fails with [`ProcError::Signal`] (`ESRCH`) once the process has been
    /// reaped.
    /// Signalling never resolves the exit outcome; only the exit does.
    pub async fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self.inner.pid;
        let gone = || ProcError::Signal {
            pid,
            source: Errno::ESRCH,
        };

        info!(pid, ?signal, "signalling process");
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .signal_tx
            .send(SignalRequest { signal, ack: ack_tx })
            .map_err(|_| gone())?;
        ack_rx.await.map_err(|_| gone())?
    }

    pub fn stdout_buffer(&self) -> Result<Vec<u8>> {
        self.read_capture(|bufs| &bufs.stdout)
    }

    pub fn stderr_buffer(&self) -> Result<Vec<u8>> {
        self.read_capture(|bufs| &bufs.stderr)
    }

    fn read_capture(
        &self,
        pick: impl Fn(&CaptureBuffers) -> &crate::exec::CaptureBuffer,
    ) -> Result<Vec<u8>> {
        let bufs = self.inner.capture.as_ref().ok_or(ProcError::CaptureNotEnabled)?;
        // The outcome is only published after the drain tasks were joined.
        if !self.has_exited() {
            return Err(ProcError::OutputPending);
        }
        Ok(pick(bufs).contents()?)
    }
}

struct ExitChannels {
    exit_tx: watch::Sender<Option<ExitOutcome>>,
    reaped_tx: watch::Sender<bool>,
}

async fn run_exit_task(
    mut process: AsyncProcess,
    pid: u32,
    serial: u64,
    channels: ExitChannels,
    mut signal_rx: mpsc::UnboundedReceiver<SignalRequest>,
    registry: Weak<ProcessRegistry<ManagedProcess>>,
    hooks: ExitHooks,
) {
    let program = process.spec().program().to_string();

    let reaped = {
        let reap = process.reap();
        tokio::pin!(reap);
        loop {
            tokio::select! {
                res = &mut reap => break res,
                Some(req) = signal_rx.recv() => {
                    let res = kill(Pid::from_raw(pid as i32), req.signal)
                        .map_err(|source| ProcError::Signal { pid, source });
                    let _ = req.ack.send(res);
                }
            }
        }
    };
    // The pid may be reused from here on. Pending and later signal requests
    // fail with ESRCH.
    drop(signal_rx);

    if let Some(registry) = registry.upgrade() {
        // Entries claimed by kill-all are removed by kill-all.
        registry.remove_if(pid, serial, true);
    }
    channels.reaped_tx.send_replace(true);

    let drained = process.drain().await;
    let waited = match (reaped, drained) {
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        (Ok(_), Ok(())) => process.wait().await,
    };

    let outcome = ExitOutcome::from_wait(&waited);
    debug!(pid, program = %program, ?outcome, "managed process finished");

    channels.exit_tx.send_replace(Some(outcome.clone()));
    drop(channels);

    if let (Err(e), Some(on_error)) = (outcome.to_result(&program), hooks.on_error.as_ref()) {
        on_error(&e);
    }
    if let Some(on_exit) = hooks.on_exit.as_ref() {
        on_exit(&outcome);
    }
}
