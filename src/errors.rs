// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process {0} is already registered with the supervisor")]
    DuplicatePid(u32),

    #[error("process {0} is not registered with the supervisor")]
    UnknownPid(u32),

    #[error("supervisor is shutting down; refusing to track new processes")]
    ShuttingDown,

    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("'{program}' exited unsuccessfully (code: {code:?}, signal: {signal:?})")]
    Exited {
        program: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("waiting for '{program}' failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("routing {stream} failed: {source}")]
    Output {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot enable {requested} mode: {active} mode is already active")]
    OutputModeConflict {
        requested: &'static str,
        active: &'static str,
    },

    #[error("output capture is not enabled for this process")]
    CaptureNotEnabled,

    #[error("output is still being drained; wait for the process first")]
    OutputPending,

    #[error("process has already been started")]
    AlreadyStarted,

    #[error("process has not been started")]
    NotStarted,

    #[error("interrupt forwarding is already bound for this process")]
    InterruptAlreadyBound,

    #[error("process {0} ended without reporting an exit outcome")]
    ExitUnreported(u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcError {
    /// Exit code carried by an [`ProcError::Exited`] error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcError::Exited { code, .. } => *code,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcError>;
