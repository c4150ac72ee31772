// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for spawning external commands with
//! `tokio::process::Command` and handling their standard streams.
//!
//! - [`command`] holds the immutable [`CommandSpec`] and its builder.
//! - [`process`] owns [`AsyncProcess`]: start, wait, output modes, buffers.
//! - [`stdio`] contains the drain tasks that route a child's stdout/stderr.
//! - [`interrupt`] forwards host interrupts to a single child.
//! - [`run`] has one-shot helpers built on [`AsyncProcess`].

pub mod command;
pub mod interrupt;
pub mod process;
pub mod run;
pub mod stdio;

pub use command::{CommandSpec, CommandSpecBuilder, EnvBase};
pub use process::{AsyncProcess, CaptureBuffers, CaptureOptions, OutputMode};
pub use run::{run_logged, run_output, run_quiet};
pub use stdio::{CaptureBuffer, LineHook, LineSplitter};
