// src/supervisor/options.rs

//! Caller-facing options for processes started through the supervisor.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{ProcError, Result};
use crate::exec::{AsyncProcess, CaptureOptions, CommandSpec, LineHook};
use crate::supervisor::managed::ExitOutcome;
use crate::types::StreamKind;

pub type ErrorHook = Arc<dyn Fn(&ProcError) + Send + Sync>;
pub type ExitHook = Arc<dyn Fn(&ExitOutcome) + Send + Sync>;

/// Per-process options.
///
/// Defaults: inherit the host's working directory and environment, echo
/// stderr but not stdout, no capture, no hooks.
#[derive(Clone)]
pub struct ProcessOptions {
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited host environment.
    pub env: BTreeMap<String, String>,
    /// Copy stdout to the host's stdout.
    pub output_stdout: bool,
    /// Copy stderr to the host's stderr.
    pub output_stderr: bool,
    pub capture: Option<CaptureOptions>,
    pub privileged: bool,
    pub on_stdout_line: Option<LineHook>,
    pub on_stderr_line: Option<LineHook>,
    /// Called with the terminal error when the process fails.
    pub on_error: Option<ErrorHook>,
    /// Called once the process has exited, whatever the outcome.
    pub on_exit: Option<ExitHook>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            output_stdout: false,
            output_stderr: true,
            capture: None,
            privileged: false,
            on_stdout_line: None,
            on_stderr_line: None,
            on_error: None,
            on_exit: None,
        }
    }
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("output_stdout", &self.output_stdout)
            .field("output_stderr", &self.output_stderr)
            .field("capture", &self.capture)
            .field("privileged", &self.privileged)
            .field("on_stdout_line", &self.on_stdout_line.is_some())
            .field("on_stderr_line", &self.on_stderr_line.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output_stdout(mut self, on: bool) -> Self {
        self.output_stdout = on;
        self
    }

    pub fn output_stderr(mut self, on: bool) -> Self {
        self.output_stderr = on;
        self
    }

    pub fn capture(mut self, options: CaptureOptions) -> Self {
        self.capture = Some(options);
        self
    }

    pub fn privileged(mut self, on: bool) -> Self {
        self.privileged = on;
        self
    }

    pub fn on_stdout_line<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_stdout_line = Some(Arc::new(hook));
        self
    }

    pub fn on_stderr_line<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_stderr_line = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProcError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExitOutcome) + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    fn wants_stdout(&self) -> bool {
        self.output_stdout || self.on_stdout_line.is_some() || self.capture.is_some()
    }

    /// Turn these options into a configured, not yet started, process.
    pub fn build_process<I, S>(&self, binary: &str, args: I) -> Result<AsyncProcess>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = CommandSpec::builder(binary)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .privileged(self.privileged)
            .stderr_only(!self.wants_stdout());
        if let Some(dir) = &self.cwd {
            builder = builder.current_dir(dir.clone());
        }

        let mut process = AsyncProcess::new(builder.build());

        if let Some(capture) = self.capture {
            process.capture_stdio(capture)?;
        }
        if self.output_stdout {
            process.echo_stream(StreamKind::Stdout)?;
        }
        if self.output_stderr {
            process.echo_stream(StreamKind::Stderr)?;
        }
        if let Some(hook) = self.on_stdout_line.clone() {
            process.on_stdout_line(move |line| hook(line))?;
        }
        if let Some(hook) = self.on_stderr_line.clone() {
            process.on_stderr_line(move |line| hook(line))?;
        }

        Ok(process)
    }
}
