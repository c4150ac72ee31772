#![allow(dead_code)]

use std::time::Duration;

pub use procvisor_test_utils::recorder::{LineRecorder, OutcomeRecorder};
pub use procvisor_test_utils::{init_tracing, with_timeout};

use procvisor::supervisor::{ProcessSupervisor, SupervisorSettings};

/// Supervisor with signal capture off, so tests never touch the host's
/// SIGINT/SIGTERM disposition.
pub fn quiet_supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorSettings {
        capture_signals: false,
        ..SupervisorSettings::default()
    })
    .expect("build supervisor")
}

/// Poll `cond` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
