// src/exec/command.rs

//! Immutable description of a command to spawn.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Wrapper used for non-interactive privilege escalation.
const SUDO: &str = "sudo";

/// Where the child's environment starts from before the overlay is applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvBase {
    /// Inherit the host environment as it is at spawn time.
    #[default]
    Inherit,
    /// Start from an empty environment (full replace).
    Empty,
    /// Start from a copy of the host environment taken at build time.
    Snapshot(Vec<(String, String)>),
}

/// A fully-resolved command: program, arguments, environment, working dir.
///
/// Built once with [`CommandSpecBuilder`] and never changed afterwards; every
/// process started from it sees exactly this configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env_base: EnvBase,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    privileged: bool,
    stderr_only: bool,
}

impl CommandSpec {
    pub fn builder(program: impl Into<String>) -> CommandSpecBuilder {
        CommandSpecBuilder::new(program)
    }

    /// Shorthand for a command with just a program and arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpecBuilder::new(program).args(args).build()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env_base(&self) -> &EnvBase {
        &self.env_base
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Whether stdout is left unpiped (sent to the null device).
    pub fn is_stderr_only(&self) -> bool {
        self.stderr_only
    }

    fn needs_escalation(&self) -> bool {
        self.privileged && !nix::unistd::geteuid().is_root()
    }

    /// The program that will actually be executed.
    ///
    /// A privileged command run by a non-root user goes through `sudo -n`, which
    /// fails immediately instead of prompting for a password.
    pub fn resolved_program(&self) -> &str {
        if self.needs_escalation() {
            SUDO
        } else {
            &self.program
        }
    }

    pub fn resolved_args(&self) -> Vec<String> {
        if self.needs_escalation() {
            let mut args = Vec::with_capacity(self.args.len() + 2);
            args.push("-n".to_string());
            args.push(self.program.clone());
            args.extend(self.args.iter().cloned());
            args
        } else {
            self.args.clone()
        }
    }

    /// Resolved command line, for logs.
    pub fn display_command(&self) -> String {
        let mut line = self.resolved_program().to_string();
        for arg in self.resolved_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    /// Build the `tokio::process::Command` for this command.
    ///
    /// stdin and stderr are always piped; stdout is piped unless the command is
    /// stderr-only.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.resolved_program());
        cmd.args(self.resolved_args());

        match &self.env_base {
            EnvBase::Inherit => {}
            EnvBase::Empty => {
                cmd.env_clear();
            }
            EnvBase::Snapshot(vars) => {
                cmd.env_clear();
                cmd.envs(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let stdout = if self.stderr_only {
            Stdio::null()
        } else {
            Stdio::piped()
        };

        cmd.stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

/// Builder for [`CommandSpec`].
#[derive(Debug, Clone)]
pub struct CommandSpecBuilder {
    spec: CommandSpec,
}

impl CommandSpecBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            spec: CommandSpec {
                program: program.into(),
                args: Vec::new(),
                env_base: EnvBase::Inherit,
                env: Vec::new(),
                cwd: None,
                privileged: false,
                stderr_only: false,
            },
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add one variable to the overlay.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.spec
            .env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Replace the whole environment: the child sees only `vars`.
    pub fn replace_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.spec.env_base = EnvBase::Empty;
        self.spec.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Freeze a copy of the host environment as the base.
    pub fn copy_host_env(mut self) -> Self {
        self.spec.env_base = EnvBase::Snapshot(std::env::vars().collect());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.cwd = Some(dir.into());
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.spec.privileged = privileged;
        self
    }

    pub fn stderr_only(mut self, stderr_only: bool) -> Self {
        self.spec.stderr_only = stderr_only;
        self
    }

    pub fn build(self) -> CommandSpec {
        self.spec
    }
}
