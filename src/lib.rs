// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate, load_or_default};
use crate::config::ConfigFile;
use crate::supervisor::{ExitOutcome, ManagedProcess, ProcessSupervisor};

pub use crate::errors::{ProcError, Result as ProcResult};
pub use crate::exec::{AsyncProcess, CaptureOptions, CommandSpec};
pub use crate::supervisor::ProcessOptions;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor (and its Ctrl-C / SIGTERM handling)
/// - every requested command, run concurrently
///
/// Returns the exit code for the host: 0 if everything succeeded, otherwise
/// the first failing command's code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(PathBuf::from(path))
            .with_context(|| format!("loading config '{path}'"))?,
        None => load_or_default(default_config_path())?,
    };
    apply_overrides(&mut cfg, &args);

    if args.dry_run {
        print_dry_run(&cfg, &args);
        return Ok(0);
    }

    if args.cmds.is_empty() && args.command.is_empty() {
        anyhow::bail!("nothing to run; pass --cmd or a program after `--`");
    }

    let supervisor = ProcessSupervisor::builder()
        .settings(cfg.supervisor.clone())
        .default_options(cfg.process.to_options())
        .build()?;

    let procs = match start_all(&supervisor, &args) {
        Ok(procs) => procs,
        Err(err) => {
            error!(error = %err, "failed to start command; stopping the rest");
            supervisor.signal_all(Signal::SIGTERM).await;
            return Err(err);
        }
    };

    let mut waits = JoinSet::new();
    for (idx, proc) in procs.into_iter().enumerate() {
        waits.spawn(async move {
            let outcome = proc.wait_outcome().await;
            (idx, proc.pid(), outcome)
        });
    }

    let mut results: Vec<(usize, i32)> = Vec::new();
    while let Some(joined) = waits.join_next().await {
        let (idx, pid, outcome) = joined?;
        let code = match outcome {
            Ok(outcome) => exit_code_for(&outcome),
            Err(e) => {
                error!(pid, error = %e, "lost track of process");
                1
            }
        };
        info!(pid, exit_code = code, "command finished");
        results.push((idx, code));
    }

    results.sort_unstable();
    let code = results
        .iter()
        .map(|(_, code)| *code)
        .find(|code| *code != 0)
        .unwrap_or(0);
    Ok(code)
}

fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) {
    if let Some(shell) = &args.shell {
        cfg.supervisor.shell = shell.clone();
    }
    if let Some(child_signal) = args.child_signal {
        cfg.supervisor.child_signal = child_signal;
    }
    cfg.supervisor.capture_signals = true;
    cfg.supervisor.log_stdout = !args.quiet;
}

fn start_all(supervisor: &ProcessSupervisor, args: &CliArgs) -> Result<Vec<ManagedProcess>> {
    let mut procs = Vec::new();

    for cmd in &args.cmds {
        let proc = supervisor
            .shell(cmd, None)
            .with_context(|| format!("starting shell command '{cmd}'"))?;
        procs.push(proc);
    }

    if let Some((program, rest)) = args.command.split_first() {
        let proc = supervisor
            .run_async(program, rest.iter().cloned(), None)
            .with_context(|| format!("starting '{program}'"))?;
        procs.push(proc);
    }

    Ok(procs)
}

/// Shell convention: a child killed by signal N maps to 128 + N.
fn exit_code_for(outcome: &ExitOutcome) -> i32 {
    match outcome {
        ExitOutcome::Success => 0,
        ExitOutcome::Failed { code: Some(code), .. } => *code,
        ExitOutcome::Failed {
            signal: Some(signal),
            ..
        } => 128 + signal,
        _ => 1,
    }
}

/// Simple dry-run output: print settings and the commands that would run.
fn print_dry_run(cfg: &ConfigFile, args: &CliArgs) {
    println!("procvisor dry-run");
    println!("  supervisor.shell = {}", cfg.supervisor.shell);
    println!("  supervisor.child_signal = {:?}", cfg.supervisor.child_signal);
    println!("  supervisor.log_stdout = {}", cfg.supervisor.log_stdout);
    println!("  supervisor.exit_on_signal = {}", cfg.supervisor.exit_on_signal);
    if let Some(cwd) = &cfg.process.cwd {
        println!("  process.cwd = {}", cwd.display());
    }
    if !cfg.process.env.is_empty() {
        println!("  process.env = {:?}", cfg.process.env);
    }
    println!();

    println!("commands ({}):", args.cmds.len() + usize::from(!args.command.is_empty()));
    for cmd in &args.cmds {
        println!("  - {} -c {}", cfg.supervisor.shell, cmd);
    }
    if !args.command.is_empty() {
        println!("  - {}", args.command.join(" "));
    }
}
