//! `art.toml` loading and validation.
//!
//! # Layout
//!
//! ```toml
//! [[source]]
//! path = "packages"
//!
//! [target]
//! name = "myrepo"
//! path = "repo"
//! ```
//!
//! # API pattern
//!
//! - `load_at(root)`: explicit project directory; used in tests with `TempDir`
//! - `load()`: uses the current working directory, delegates to `load_at`
//!
//! Relative paths in the file are resolved against the directory that holds it.

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::Configuration;

/// File name of the configuration file.
pub const CONFIG_FILE: &str = "art.toml";

/// `<root>/art.toml`. Pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Load and validate `<root>/art.toml`.
///
/// Returns `ConfigError::Io` if the file is missing, `ConfigError::Parse` if it
/// is malformed and `ConfigError::Invalid` if a required value is absent.
pub fn load_at(root: &Path) -> Result<Configuration, ConfigError> {
    let path = config_path_at(root);
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let mut cfg = parse(&path, &contents)?;
    cfg.resolve_paths(root);
    Ok(cfg)
}

/// `load_at` convenience wrapper for the current directory.
pub fn load() -> Result<Configuration, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
    load_at(&cwd)
}

/// Parse and validate configuration text. `path` is only used for messages.
pub fn parse(path: &Path, contents: &str) -> Result<Configuration, ConfigError> {
    let cfg: Configuration = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(path, &cfg)?;
    Ok(cfg)
}

fn validate(path: &Path, cfg: &Configuration) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    if cfg.target.path.as_os_str().is_empty() {
        return Err(invalid("missing value for target.path".into()));
    }
    if cfg.target.name.is_empty() {
        return Err(invalid("missing value for target.name".into()));
    }
    if cfg.sources.is_empty() {
        return Err(invalid("no sources specified".into()));
    }
    for (idx, source) in cfg.sources.iter().enumerate() {
        if source.path.as_os_str().is_empty() {
            return Err(invalid(format!("missing value for source[{idx}].path")));
        }
    }
    Ok(())
}
