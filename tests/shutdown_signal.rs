//! Host signal handling lives in its own test binary: the signal is raised
//! against the whole test process.

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use nix::sys::signal::{raise, Signal};
use procvisor::supervisor::ProcessSupervisor;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread")]
async fn host_sigterm_runs_kill_all() -> TestResult {
    init_tracing();

    let sup = ProcessSupervisor::builder()
        .capture_signals(true)
        .exit_on_signal(false)
        .build()?;

    let proc = sup.run_async("sleep", ["30"], None)?;
    assert_eq!(sup.len(), 1);

    raise(Signal::SIGTERM)?;

    with_timeout(sup.wait_for_shutdown()).await;
    assert!(sup.is_shutting_down());
    assert!(sup.is_empty());

    let outcome = with_timeout(proc.wait_outcome()).await?;
    assert_eq!(outcome.signal(), Some(Signal::SIGINT as i32));

    Ok(())
}
