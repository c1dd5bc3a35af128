//! Error types for art-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading `art.toml` or `makepkg.conf`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the file that could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error on load.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The file parsed but a required value is missing or empty.
    #[error("parse {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
