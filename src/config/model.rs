// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::supervisor::ProcessOptions;
use crate::types::ChildSignal;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// log_stdout = false
/// capture_signals = true
/// exit_on_signal = false
/// child_signal = "interrupt"
/// shell = "sh"
///
/// [process]
/// cwd = "/srv/app"
/// output_stdout = true
/// env = { RUST_LOG = "info" }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Defaults applied to every process started without explicit options.
    #[serde(default)]
    pub process: ProcessDefaults,
}

/// A validated configuration. Only constructed via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSettings,
    pub process: ProcessDefaults,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(supervisor: SupervisorSettings, process: ProcessDefaults) -> Self {
        Self {
            supervisor,
            process,
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupervisorSettings {
    /// Force `output_stdout` on for every process.
    #[serde(default)]
    pub log_stdout: bool,

    /// Listen for SIGINT/SIGTERM and run kill-all when one arrives.
    #[serde(default = "default_true")]
    pub capture_signals: bool,

    /// Exit the host with status 0 once kill-all has finished.
    #[serde(default)]
    pub exit_on_signal: bool,

    /// Signal sent to every child during kill-all.
    #[serde(default)]
    pub child_signal: ChildSignal,

    /// Interpreter used by `shell` and `exec_script`.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            log_stdout: false,
            capture_signals: default_true(),
            exit_on_signal: false,
            child_signal: ChildSignal::default(),
            shell: default_shell(),
        }
    }
}

/// `[process]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessDefaults {
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub output_stdout: bool,

    #[serde(default = "default_true")]
    pub output_stderr: bool,

    #[serde(default)]
    pub privileged: bool,
}

impl Default for ProcessDefaults {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            output_stdout: false,
            output_stderr: default_true(),
            privileged: false,
        }
    }
}

impl ProcessDefaults {
    pub fn to_options(&self) -> ProcessOptions {
        ProcessOptions {
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            output_stdout: self.output_stdout,
            output_stderr: self.output_stderr,
            privileged: self.privileged,
            ..ProcessOptions::default()
        }
    }
}
