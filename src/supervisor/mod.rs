// src/supervisor/mod.rs

//! Process supervision.
//!
//! A [`ProcessSupervisor`] starts processes, tracks every live one in a
//! [`ProcessRegistry`] keyed by pid, and on SIGINT/SIGTERM runs the kill-all
//! protocol:
//!
//! 1. close the registry to new processes and claim every running entry
//! 2. send the configured [`ChildSignal`] to each claimed process
//! 3. wait, without a timeout, for every one of them to exit
//! 4. run the exit callback, then optionally exit the host
//!
//! - [`registry`] holds the lock-guarded pid map and its entry states.
//! - [`managed`] owns [`ManagedProcess`] and its background exit task.
//! - [`options`] defines the caller-facing [`ProcessOptions`].
//! - [`shutdown`] contains the signal listener and the kill-all loop.

pub mod managed;
pub mod options;
pub mod registry;
pub mod shutdown;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use crate::config::SupervisorSettings;
pub use crate::types::ChildSignal;
pub use managed::{ExitOutcome, ManagedProcess};
pub use options::{ErrorHook, ExitHook, ProcessOptions};
pub use registry::{Claimed, EntryState, ProcessRegistry};

use crate::errors::Result;
use crate::exec::AsyncProcess;
use managed::ExitHooks;

type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct SupervisorInner {
    registry: Arc<ProcessRegistry<ManagedProcess>>,
    settings: SupervisorSettings,
    default_options: ProcessOptions,
    on_exit: Option<ShutdownHook>,
    shutdown_started: AtomicBool,
    shutdown_done: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

/// Registry and shutdown coordinator for every process it starts.
///
/// Cheap to clone. Must be built inside a Tokio runtime when signal capture
/// is enabled.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("settings", &self.inner.settings)
            .field("tracked", &self.inner.registry.pids())
            .field(
                "shutting_down",
                &self.inner.shutdown_started.load(Ordering::SeqCst),
            )
            .finish()
    }
}

/// Builder for [`ProcessSupervisor`].
pub struct SupervisorBuilder {
    settings: SupervisorSettings,
    default_options: ProcessOptions,
    on_exit: Option<ShutdownHook>,
}

impl fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("settings", &self.settings)
            .field("default_options", &self.default_options)
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            settings: SupervisorSettings::default(),
            default_options: ProcessOptions::default(),
            on_exit: None,
        }
    }

    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn log_stdout(mut self, on: bool) -> Self {
        self.settings.log_stdout = on;
        self
    }

    pub fn capture_signals(mut self, on: bool) -> Self {
        self.settings.capture_signals = on;
        self
    }

    pub fn exit_on_signal(mut self, on: bool) -> Self {
        self.settings.exit_on_signal = on;
        self
    }

    pub fn child_signal(mut self, child_signal: ChildSignal) -> Self {
        self.settings.child_signal = child_signal;
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.settings.shell = shell.into();
        self
    }

    /// Options used when a process is started without explicit options.
    pub fn default_options(mut self, options: ProcessOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Callback run after kill-all, before the host exits.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ProcessSupervisor> {
        let (shutdown_done, _) = watch::channel(false);
        let inner = Arc::new(SupervisorInner {
            registry: Arc::new(ProcessRegistry::new()),
            settings: self.settings,
            default_options: self.default_options,
            on_exit: self.on_exit,
            shutdown_started: AtomicBool::new(false),
            shutdown_done,
            listener: Mutex::new(None),
        });

        if inner.settings.capture_signals {
            let handle = shutdown::spawn_signal_listener(Arc::downgrade(&inner))?;
            if let Ok(mut slot) = inner.listener.lock() {
                *slot = Some(handle);
            }
        }

        Ok(ProcessSupervisor { inner })
    }
}

impl ProcessSupervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    pub fn new(settings: SupervisorSettings) -> Result<Self> {
        SupervisorBuilder::new().settings(settings).build()
    }

    pub(crate) fn from_inner(inner: Arc<SupervisorInner>) -> Self {
        Self { inner }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Start `binary` with `args` and track it. Returns immediately.
    ///
    /// `None` options means the supervisor's default options. With
    /// `log_stdout` set, stdout echoing is always turned on.
    pub fn run_async<I, S>(
        &self,
        binary: &str,
        args: I,
        options: Option<ProcessOptions>,
    ) -> Result<ManagedProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = options.unwrap_or_else(|| self.inner.default_options.clone());
        if self.inner.settings.log_stdout {
            options.output_stdout = true;
        }

        let process = options.build_process(binary, args)?;
        let hooks = ExitHooks {
            on_error: options.on_error.clone(),
            on_exit: options.on_exit.clone(),
        };
        ManagedProcess::launch(process, hooks, &self.inner.registry)
    }

    /// [`run_async`](Self::run_async), then wait for the process to exit.
    pub async fn run_async_wait<I, S>(
        &self,
        binary: &str,
        args: I,
        options: Option<ProcessOptions>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_async(binary, args, options)?.wait().await
    }

    /// Run `cmd` through the configured shell as `<shell> -c <cmd>`.
    ///
    /// `cmd` is handed to the shell verbatim with no escaping of any kind.
    /// Never build it from untrusted input.
    pub fn shell(&self, cmd: &str, options: Option<ProcessOptions>) -> Result<ManagedProcess> {
        let shell = self.inner.settings.shell.clone();
        self.run_async(&shell, ["-c", cmd], options)
    }

    pub async fn shell_wait(&self, cmd: &str, options: Option<ProcessOptions>) -> Result<()> {
        self.shell(cmd, options)?.wait().await
    }

    /// Run a script file with the configured shell: `<shell> <script> <args…>`.
    ///
    /// Same trust boundary as [`shell`](Self::shell).
    pub fn exec_script<I, S>(
        &self,
        script: &str,
        args: I,
        options: Option<ProcessOptions>,
    ) -> Result<ManagedProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shell = self.inner.settings.shell.clone();
        let mut argv = vec![script.to_string()];
        argv.extend(args.into_iter().map(Into::into));
        self.run_async(&shell, argv, options)
    }

    pub async fn exec_script_wait<I, S>(
        &self,
        script: &str,
        args: I,
        options: Option<ProcessOptions>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec_script(script, args, options)?.wait().await
    }

    /// Supervise an already configured (not yet started) process as-is.
    pub fn run_process(&self, process: AsyncProcess) -> Result<ManagedProcess> {
        ManagedProcess::launch(process, ExitHooks::default(), &self.inner.registry)
    }

    pub async fn run_process_wait(&self, process: AsyncProcess) -> Result<()> {
        self.run_process(process)?.wait().await
    }

    pub fn get(&self, pid: u32) -> Option<ManagedProcess> {
        self.inner.registry.get(pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.inner.registry.pids()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_started.load(Ordering::SeqCst)
    }

    /// Send `signal` to every running process and wait for all of them.
    ///
    /// Unlike [`shutdown`](Self::shutdown) the supervisor keeps accepting new
    /// processes afterwards. Returns how many processes were signalled.
    pub async fn signal_all(&self, signal: Signal) -> usize {
        let claimed = self.inner.registry.claim_running();
        info!(?signal, count = claimed.len(), "signalling all processes");
        shutdown::terminate_claimed(&self.inner.registry, claimed, signal).await
    }

    /// Run the kill-all protocol as if the host had received `received`.
    ///
    /// Only the first call does the work; later calls wait for it to finish.
    /// With `exit_on_signal` set this does not return: the host exits with
    /// status 0.
    pub async fn shutdown(&self, received: Signal) {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            self.wait_for_shutdown().await;
            return;
        }

        let signal = self.inner.settings.child_signal.resolve(received);
        let claimed = self.inner.registry.begin_shutdown();
        info!(?received, ?signal, count = claimed.len(), "killing all processes");

        let stopped = shutdown::terminate_claimed(&self.inner.registry, claimed, signal).await;
        if !self.inner.registry.is_empty() {
            warn!(remaining = ?self.inner.registry.pids(), "processes still tracked after kill-all");
        }
        info!(stopped, "kill-all complete");

        if let Some(on_exit) = &self.inner.on_exit {
            on_exit();
        }
        self.inner.shutdown_done.send_replace(true);

        if self.inner.settings.exit_on_signal {
            info!("exiting host after shutdown");
            std::process::exit(0);
        }
    }

    /// Resolve once a shutdown has completed.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.inner.shutdown_done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}
