// src/config/validate.rs

use crate::config::model::{ConfigFile, ProcessDefaults, RawConfigFile, SupervisorSettings};
use crate::errors::{ProcError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ProcError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.supervisor, raw.process))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_supervisor(&cfg.supervisor)?;
    validate_process_defaults(&cfg.process)?;
    Ok(())
}

fn validate_supervisor(settings: &SupervisorSettings) -> Result<()> {
    // child_signal is strongly typed and validated during deserialization.

    if settings.shell.trim().is_empty() {
        return Err(ProcError::ConfigError(
            "[supervisor].shell must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_process_defaults(process: &ProcessDefaults) -> Result<()> {
    if let Some(cwd) = &process.cwd {
        if !cwd.is_dir() {
            return Err(ProcError::ConfigError(format!(
                "[process].cwd '{}' is not an existing directory",
                cwd.display()
            )));
        }
    }

    for key in process.env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ProcError::ConfigError(format!(
                "[process].env has invalid variable name '{}'",
                key
            )));
        }
    }

    Ok(())
}
