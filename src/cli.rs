// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::ChildSignal;

/// Command-line arguments for `procvisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procvisor",
    version,
    about = "Run commands under a supervisor that stops them all on Ctrl-C.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Procvisor.toml` in the current directory is used when it
    /// exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Shell command to run; may be given several times. Passed to the shell
    /// verbatim.
    #[arg(long = "cmd", value_name = "SHELL_CMD")]
    pub cmds: Vec<String>,

    /// Override `[supervisor].shell`.
    #[arg(long, value_name = "PATH")]
    pub shell: Option<String>,

    /// Override `[supervisor].child_signal` (interrupt, terminate, kill, forward).
    #[arg(long, value_name = "SIGNAL", value_parser = parse_child_signal)]
    pub child_signal: Option<ChildSignal>,

    /// Do not echo child stdout.
    #[arg(long)]
    pub quiet: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCVISOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load config and print what would run, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Program (and its arguments) to run directly, after `--`.
    #[arg(last = true, value_name = "PROGRAM")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_child_signal(s: &str) -> Result<ChildSignal, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
