///
/// CLI error types.
///

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Binding(#[from] cozo_binding::Error),

    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Invalid {what}: {reason}")]
    InvalidJson { what: &'static str, reason: String },

    #[error("No script given. Pass it inline or with --file.")]
    MissingScript,
}

impl From<cozo_binding::ConfigError> for CliError {
    fn from(e: cozo_binding::ConfigError) -> Self {
        CliError::Binding(e.into())
    }
}

impl From<cozo_binding::LoadError> for CliError {
    fn from(e: cozo_binding::LoadError) -> Self {
        CliError::Binding(e.into())
    }
}
