// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
///
/// Used for the default config path, which is allowed not to exist. An
/// explicitly requested file must exist.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return ConfigFile::try_from(RawConfigFile::default());
    }
    load_and_validate(path)
}

/// Default config location: `Procvisor.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Procvisor.toml")
}
