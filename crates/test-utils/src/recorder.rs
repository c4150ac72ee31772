//! Thread-safe recorders for line hooks and exit callbacks.

use std::sync::{Arc, Mutex};

use procvisor::supervisor::ExitOutcome;

/// Collects every line handed to a hook, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct LineRecorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closure suitable for `on_stdout_line` / `on_stderr_line`.
    pub fn hook(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let lines = Arc::clone(&self.lines);
        move |line: &str| lines.lock().unwrap().push(line.to_string())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

/// Collects exit outcomes and error messages reported by supervisor hooks.
#[derive(Debug, Clone, Default)]
pub struct OutcomeRecorder {
    outcomes: Arc<Mutex<Vec<ExitOutcome>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_hook(&self) -> impl Fn(&ExitOutcome) + Send + Sync + 'static {
        let outcomes = Arc::clone(&self.outcomes);
        move |outcome: &ExitOutcome| outcomes.lock().unwrap().push(outcome.clone())
    }

    pub fn error_hook(&self) -> impl Fn(&procvisor::ProcError) + Send + Sync + 'static {
        let errors = Arc::clone(&self.errors);
        move |err: &procvisor::ProcError| errors.lock().unwrap().push(err.to_string())
    }

    pub fn outcomes(&self) -> Vec<ExitOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}
