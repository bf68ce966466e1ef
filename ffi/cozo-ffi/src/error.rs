///
/// Library loading errors.
///

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load engine library {path}: {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("Engine library {path} is missing symbol `{symbol}`: {reason}")]
    Symbol {
        path: PathBuf,
        symbol: String,
        reason: String,
    },

    #[error("No engine library configured. Set {var} to the path of libcozo_c.")]
    NotConfigured { var: &'static str },
}
