// src/exec/run.rs

//! One-shot helpers: run a command to completion and report how it went.
//!
//! stderr is kept in memory and logged only when the command fails, so a
//! successful run stays quiet.

use tracing::{info, warn};

use crate::errors::Result;
use crate::exec::command::CommandSpec;
use crate::exec::process::{AsyncProcess, CaptureOptions};

/// Run `spec` and return its stdout as (lossy) UTF-8.
pub async fn run_output(spec: CommandSpec) -> Result<String> {
    let mut process = AsyncProcess::new(spec);
    process.capture_stdio(CaptureOptions::default())?;

    let res = process.start_and_wait().await;
    log_stderr_on_failure(&process, &res);
    res?;

    let stdout = process.stdout_buffer()?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Run `spec` for its side effects; stdout is discarded.
pub async fn run_quiet(spec: CommandSpec) -> Result<()> {
    let mut process = AsyncProcess::new(spec);
    process.capture_stdio(CaptureOptions::default())?;

    let res = process.start_and_wait().await;
    log_stderr_on_failure(&process, &res);
    res.map(|_| ())
}

/// Run `spec`, logging every output line through `tracing` as it arrives.
///
/// A host SIGINT/SIGTERM is forwarded to the child as SIGTERM while it runs.
pub async fn run_logged(spec: CommandSpec) -> Result<()> {
    let program = spec.program().to_string();
    let mut process = AsyncProcess::new(spec);

    let out_program = program.clone();
    process
        .on_stdout_line(move |line| info!(program = %out_program, stream = "stdout", "{line}"))?
        .on_stderr_line(move |line| info!(program = %program, stream = "stderr", "{line}"))?
        .bind_interrupt_forwarding()?;

    process.start_and_wait().await.map(|_| ())
}

fn log_stderr_on_failure<T>(process: &AsyncProcess, res: &Result<T>) {
    let Err(e) = res else {
        return;
    };
    // Spawn failures have no output to show.
    let Ok(stderr) = process.stderr_buffer() else {
        return;
    };
    warn!(
        program = %process.spec().program(),
        error = %e,
        stderr = %String::from_utf8_lossy(&stderr).trim_end(),
        "command failed"
    );
}
