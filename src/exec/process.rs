// src/exec/process.rs

//! A single external command with configurable stdio handling.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{ProcError, Result};
use crate::exec::command::CommandSpec;
use crate::exec::interrupt::InterruptListener;
use crate::exec::stdio::{CaptureBuffer, LineHook, StdioRouter, StreamRoute};
use crate::types::StreamKind;

/// Options for capture mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Also copy output to the parent's stdout/stderr.
    pub tee: bool,
    /// Also write stderr bytes into the stdout buffer.
    pub combine: bool,
}

/// How the child's output is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Drained and discarded (line hooks still run).
    #[default]
    Drain,
    /// Copied byte-for-byte to the parent's stdout/stderr.
    Bind,
    /// Buffered in memory.
    Capture(CaptureOptions),
}

impl OutputMode {
    fn name(&self) -> &'static str {
        match self {
            OutputMode::Drain => "drain",
            OutputMode::Bind => "bind",
            OutputMode::Capture(_) => "capture",
        }
    }
}

/// Handles to the in-memory buffers of a capturing process.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffers {
    pub stdout: CaptureBuffer,
    pub stderr: CaptureBuffer,
}

/// One external command: spawn, route its output, wait for it.
///
/// Output mode and hooks must be chosen before [`AsyncProcess::start`]; the
/// command itself is fixed by its [`CommandSpec`].
pub struct AsyncProcess {
    spec: CommandSpec,
    mode: OutputMode,
    stdout_hook: Option<LineHook>,
    stderr_hook: Option<LineHook>,
    echo_stdout: bool,
    echo_stderr: bool,
    capture: Option<CaptureBuffers>,
    interrupt_bound: bool,
    interrupt_close: Option<oneshot::Sender<()>>,
    child: Option<Child>,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    router: Option<StdioRouter>,
    reaped: bool,
    drained: bool,
    status: Option<ExitStatus>,
}

impl fmt::Debug for AsyncProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProcess")
            .field("spec", &self.spec)
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl AsyncProcess {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            mode: OutputMode::Drain,
            stdout_hook: None,
            stderr_hook: None,
            echo_stdout: false,
            echo_stderr: false,
            capture: None,
            interrupt_bound: false,
            interrupt_close: None,
            child: None,
            pid: None,
            stdin: None,
            router: None,
            reaped: false,
            drained: false,
            status: None,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn output_mode(&self) -> OutputMode {
        self.mode
    }

    /// OS process id, once started.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Exit code of a finished process; `None` while running or when it was
    /// killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.pid.is_some() {
            return Err(ProcError::AlreadyStarted);
        }
        Ok(())
    }

    /// Pass stdout/stderr straight through to the parent's streams.
    pub fn bind_stdio(&mut self) -> Result<&mut Self> {
        self.ensure_not_started()?;
        match self.mode {
            OutputMode::Bind => {}
            OutputMode::Capture(_) => {
                return Err(ProcError::OutputModeConflict {
                    requested: "bind",
                    active: self.mode.name(),
                });
            }
            OutputMode::Drain => self.mode = OutputMode::Bind,
        }
        Ok(self)
    }

    /// Buffer stdout/stderr in memory.
    pub fn capture_stdio(&mut self, options: CaptureOptions) -> Result<&mut Self> {
        self.ensure_not_started()?;
        match self.mode {
            OutputMode::Capture(_) => {}
            OutputMode::Bind => {
                return Err(ProcError::OutputModeConflict {
                    requested: "capture",
                    active: self.mode.name(),
                });
            }
            OutputMode::Drain => {
                self.mode = OutputMode::Capture(options);
                self.capture = Some(CaptureBuffers::default());
            }
        }
        Ok(self)
    }

    pub fn on_stdout_line<F>(&mut self, hook: F) -> Result<&mut Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ensure_not_started()?;
        self.stdout_hook = Some(Arc::new(hook));
        Ok(self)
    }

    pub fn on_stderr_line<F>(&mut self, hook: F) -> Result<&mut Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ensure_not_started()?;
        self.stderr_hook = Some(Arc::new(hook));
        Ok(self)
    }

    /// Copy one stream to the matching parent stream, whatever the mode.
    ///
    /// Used to echo a single stream, e.g. stderr of an otherwise quiet child.
    pub fn echo_stream(&mut self, kind: StreamKind) -> Result<&mut Self> {
        self.ensure_not_started()?;
        match kind {
            StreamKind::Stdout => self.echo_stdout = true,
            StreamKind::Stderr => self.echo_stderr = true,
        }
        Ok(self)
    }

    /// Forward SIGTERM to the child when the host gets SIGINT or SIGTERM.
    ///
    /// Can be installed once, before or after start. Note that listening for
    /// these signals replaces their default disposition for the whole host
    /// process.
    pub fn bind_interrupt_forwarding(&mut self) -> Result<&mut Self> {
        if self.interrupt_bound {
            return Err(ProcError::InterruptAlreadyBound);
        }
        self.interrupt_bound = true;

        if let (Some(pid), false) = (self.pid, self.reaped) {
            let listener = InterruptListener::register()?;
            self.interrupt_close = Some(listener.arm(pid));
        }
        Ok(self)
    }

    /// Handles to the capture buffers, if capture mode is on.
    pub fn capture_buffers(&self) -> Option<CaptureBuffers> {
        self.capture.clone()
    }

    /// Write end of the child's stdin. Dropping it closes the pipe.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn stdout_buffer(&self) -> Result<Vec<u8>> {
        self.read_capture(|bufs| &bufs.stdout)
    }

    pub fn stderr_buffer(&self) -> Result<Vec<u8>> {
        self.read_capture(|bufs| &bufs.stderr)
    }

    fn read_capture(&self, pick: impl Fn(&CaptureBuffers) -> &CaptureBuffer) -> Result<Vec<u8>> {
        let bufs = self.capture.as_ref().ok_or(ProcError::CaptureNotEnabled)?;
        if !self.drained {
            return Err(ProcError::OutputPending);
        }
        Ok(pick(bufs).contents()?)
    }

    fn routes(&self) -> (StreamRoute, StreamRoute) {
        let mut stdout = StreamRoute {
            hook: self.stdout_hook.clone(),
            ..StreamRoute::default()
        };
        let mut stderr = StreamRoute {
            hook: self.stderr_hook.clone(),
            ..StreamRoute::default()
        };

        match (&self.mode, &self.capture) {
            (OutputMode::Bind, _) => {
                stdout.parent = true;
                stderr.parent = true;
            }
            (OutputMode::Capture(options), Some(bufs)) => {
                stdout.parent = options.tee;
                stderr.parent = options.tee;
                stdout.buffer = Some(bufs.stdout.clone());
                stderr.buffer = Some(bufs.stderr.clone());
                if options.combine && !self.spec.is_stderr_only() {
                    stderr.mirror = Some(bufs.stdout.clone());
                }
            }
            _ => {}
        }
        stdout.parent |= self.echo_stdout;
        stderr.parent |= self.echo_stderr;

        (stdout, stderr)
    }

    /// Launch the process without waiting for it. Returns the pid.
    pub fn start(&mut self) -> Result<u32> {
        self.ensure_not_started()?;

        let listener = if self.interrupt_bound {
            Some(InterruptListener::register()?)
        } else {
            None
        };

        info!(
            cmd = %self.spec.display_command(),
            cwd = ?self.spec.cwd(),
            "starting process"
        );

        let mut child = self
            .spec
            .to_command()
            .spawn()
            .map_err(|source| ProcError::Spawn {
                program: self.spec.program().to_string(),
                source,
            })?;

        let Some(pid) = child.id() else {
            // Only possible if the child was already reaped.
            return Err(ProcError::Other(anyhow::anyhow!(
                "spawned '{}' but it has no pid",
                self.spec.program()
            )));
        };

        self.stdin = child.stdin.take();
        let (stdout_route, stderr_route) = self.routes();
        self.router = Some(StdioRouter::spawn(
            pid,
            child.stdout.take(),
            child.stderr.take(),
            stdout_route,
            stderr_route,
        ));
        self.interrupt_close = listener.map(|l| l.arm(pid));
        self.child = Some(child);
        self.pid = Some(pid);

        debug!(pid, program = %self.spec.program(), "process started");
        Ok(pid)
    }

    /// Wait for the process to exit and its output to be fully drained.
    ///
    /// Equivalent to [`reap`](Self::reap) followed by [`drain`](Self::drain).
    /// A non-zero exit is reported as [`ProcError::Exited`].
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let reaped = self.reap().await;
        let drained = self.drain().await;

        let status = reaped?;
        if let Err(e) = drained {
            warn!(pid = self.pid, error = %e, "output routing failed");
            return Err(e);
        }
        self.check_status(status)
    }

    /// Wait for the OS process to exit, but not for its output.
    ///
    /// On return the pid has been reaped, stdin is closed and the interrupt
    /// forwarder is disarmed. The pipes may stay open for longer when a
    /// grandchild inherited them; [`drain`](Self::drain) waits for those.
    /// The exit status is returned as-is, without mapping failures.
    pub async fn reap(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let Some(child) = self.child.as_mut() else {
            return Err(ProcError::NotStarted);
        };

        let waited = child.wait().await;
        if waited.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.reaped = true;
        drop(self.stdin.take());
        drop(self.interrupt_close.take());

        let status = waited.map_err(|source| ProcError::Wait {
            program: self.spec.program().to_string(),
            source,
        })?;
        self.status = Some(status);

        info!(
            pid = self.pid,
            program = %self.spec.program(),
            exit_code = status.code(),
            signal = status.signal(),
            "process exited"
        );
        Ok(status)
    }

    /// Wait for both output pipes to reach EOF and flush every destination.
    ///
    /// Capture buffers become readable once this returns. A drain error is
    /// reported once; later calls return `Ok(())`.
    pub async fn drain(&mut self) -> Result<()> {
        if self.pid.is_none() {
            return Ok(());
        }
        let drained = match self.router.take() {
            Some(router) => router.join().await,
            None => Ok(()),
        };
        self.drained = true;
        drained
    }

    /// Start, then wait.
    ///
    /// A failed spawn opens nothing; otherwise [`wait`](Self::wait) closes
    /// stdin, the pipes and the interrupt forwarder.
    pub async fn start_and_wait(&mut self) -> Result<ExitStatus> {
        self.start()?;
        self.wait().await
    }

    /// Deliver `signal` to the running child.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self.pid.ok_or(ProcError::NotStarted)?;
        if self.reaped {
            return Err(ProcError::Signal {
                pid,
                source: nix::errno::Errno::ESRCH,
            });
        }
        debug!(pid, ?signal, "signalling process");
        kill(Pid::from_raw(pid as i32), signal).map_err(|source| ProcError::Signal { pid, source })
    }

    fn check_status(&self, status: ExitStatus) -> Result<ExitStatus> {
        if status.success() {
            Ok(status)
        } else {
            Err(ProcError::Exited {
                program: self.spec.program().to_string(),
                code: status.code(),
                signal: status.signal(),
            })
        }
    }
}
