//! The subset of `makepkg.conf` that the build pipeline cares about.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::{io_err, ConfigError};

/// System-wide makepkg configuration.
pub const MAKEPKG_CONF: &str = "/etc/makepkg.conf";

/// Suffixes of package archives produced by makepkg and holo-build.
pub const PACKAGE_SUFFIXES: &[&str] = &[".pkg.tar.xz", ".pkg.tar.zst"];

/// Fields from makepkg.conf(5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakepkgConfig {
    /// `CARCH`, e.g. `x86_64`.
    pub architecture: String,
    /// `GPGKEY`; `None` disables signing.
    pub gpg_key_id: Option<String>,
}

impl Default for MakepkgConfig {
    fn default() -> Self {
        Self {
            architecture: std::env::consts::ARCH.to_string(),
            gpg_key_id: None,
        }
    }
}

impl MakepkgConfig {
    /// Read [`MAKEPKG_CONF`], seeding the key from `$GPGKEY`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(MAKEPKG_CONF), std::env::var("GPGKEY").ok())
    }

    /// Read the given makepkg.conf.
    ///
    /// A missing file yields the host architecture and `env_key`; any other
    /// read failure is an error.
    pub fn load_from(path: &Path, env_key: Option<String>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents, env_key)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    "{} not found, assuming architecture {}",
                    path.display(),
                    std::env::consts::ARCH
                );
                Ok(Self {
                    gpg_key_id: non_empty(env_key),
                    ..Self::default()
                })
            }
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Parse makepkg.conf text. A `GPGKEY` line overrides `env_key`.
    pub fn parse(contents: &str, env_key: Option<String>) -> Self {
        let mut result = Self {
            gpg_key_id: env_key,
            ..Self::default()
        };
        for line in contents.lines() {
            let Some((key, value)) = parse_assignment(line.trim()) else {
                continue;
            };
            match key {
                "CARCH" => result.architecture = value.to_string(),
                "GPGKEY" => result.gpg_key_id = Some(value.to_string()),
                _ => {}
            }
        }
        result.gpg_key_id = non_empty(result.gpg_key_id);
        result
    }

    /// Keep only the package files built for the current architecture or `any`.
    pub fn filter_for_current_arch(&self, output_files: Vec<String>) -> Vec<String> {
        let arch = format!("-{}", self.architecture);
        output_files
            .into_iter()
            .filter(|name| {
                let stem = PACKAGE_SUFFIXES
                    .iter()
                    .find_map(|suffix| name.strip_suffix(suffix))
                    .unwrap_or(name);
                stem.ends_with(&arch) || stem.ends_with("-any")
            })
            .collect()
    }
}

/// Split `KEY=value`, `KEY = "value"` or `KEY='value'`. Keys are upper-case ASCII.
fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim_end();
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let value = value.trim_start();
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    let value = value.strip_suffix(['"', '\'']).unwrap_or(value);
    Some((key, value))
}

fn non_empty(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
}
