// src/types.rs

use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::Deserialize;

/// Which signal the supervisor sends to its children during kill-all.
///
/// - `Interrupt`: always SIGINT, whatever the host received (default).
/// - `Terminate`: always SIGTERM.
/// - `Kill`: always SIGKILL. Children get no chance to clean up.
/// - `Forward`: the same signal the supervisor itself received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChildSignal {
    #[default]
    Interrupt,
    Terminate,
    Kill,
    Forward,
}

impl ChildSignal {
    /// Resolve the signal to deliver to children given what the host received.
    pub fn resolve(self, received: Signal) -> Signal {
        match self {
            ChildSignal::Interrupt => Signal::SIGINT,
            ChildSignal::Terminate => Signal::SIGTERM,
            ChildSignal::Kill => Signal::SIGKILL,
            ChildSignal::Forward => received,
        }
    }
}

impl FromStr for ChildSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interrupt" | "int" | "sigint" => Ok(ChildSignal::Interrupt),
            "terminate" | "term" | "sigterm" => Ok(ChildSignal::Terminate),
            "kill" | "sigkill" => Ok(ChildSignal::Kill),
            "forward" => Ok(ChildSignal::Forward),
            other => Err(format!(
                "invalid child_signal: {other} (expected \"interrupt\", \"terminate\", \"kill\" or \"forward\")"
            )),
        }
    }
}

/// Which standard stream a piece of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}
