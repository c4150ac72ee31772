//! Builders that render TOML config text for loader tests.

use std::collections::BTreeMap;

/// Builder for a `Procvisor.toml` document.
///
/// Only keys that were set are written, so the loader's defaults can be
/// exercised too.
#[derive(Debug, Default, Clone)]
pub struct ConfigTomlBuilder {
    supervisor: BTreeMap<String, String>,
    process: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
}

impl ConfigTomlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.supervisor.insert("shell".into(), quote(shell));
        self
    }

    pub fn child_signal(mut self, signal: &str) -> Self {
        self.supervisor.insert("child_signal".into(), quote(signal));
        self
    }

    pub fn log_stdout(mut self, on: bool) -> Self {
        self.supervisor.insert("log_stdout".into(), on.to_string());
        self
    }

    pub fn capture_signals(mut self, on: bool) -> Self {
        self.supervisor.insert("capture_signals".into(), on.to_string());
        self
    }

    pub fn exit_on_signal(mut self, on: bool) -> Self {
        self.supervisor.insert("exit_on_signal".into(), on.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.process.insert("cwd".into(), quote(dir));
        self
    }

    pub fn output_stdout(mut self, on: bool) -> Self {
        self.process.insert("output_stdout".into(), on.to_string());
        self
    }

    pub fn output_stderr(mut self, on: bool) -> Self {
        self.process.insert("output_stderr".into(), on.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        if !self.supervisor.is_empty() {
            out.push_str("[supervisor]\n");
            for (k, v) in &self.supervisor {
                out.push_str(&format!("{k} = {v}\n"));
            }
            out.push('\n');
        }
        if !self.process.is_empty() || !self.env.is_empty() {
            out.push_str("[process]\n");
            for (k, v) in &self.process {
                out.push_str(&format!("{k} = {v}\n"));
            }
            if !self.env.is_empty() {
                out.push_str("\n[process.env]\n");
                for (k, v) in &self.env {
                    out.push_str(&format!("{} = {}\n", quote(k), quote(v)));
                }
            }
        }
        out
    }
}

fn quote(s: &str) -> String {
    format!("{s:?}")
}
