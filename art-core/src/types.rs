//! Domain types shared by discovery, the sync engine and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Configuration types deserialize from `art.toml` via serde + toml.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Package definitions
// ---------------------------------------------------------------------------

/// How a package definition is turned into package files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    /// A `*.pkg.toml` file built with holo-build(8).
    HoloBuild,
    /// A directory containing a `PKGBUILD`, built with makepkg(8).
    Native,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageKind::HoloBuild => "holo-build",
            PackageKind::Native => "makepkg",
        };
        f.write_str(s)
    }
}

/// A discovered package definition.
///
/// Identified by its path: the `.pkg.toml` file for holo-build packages, the
/// directory holding the `PKGBUILD` for native packages. Re-read from the
/// filesystem on every run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDefinition {
    pub path: PathBuf,
    pub kind: PackageKind,
}

impl PackageDefinition {
    pub fn new(path: impl Into<PathBuf>, kind: PackageKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Unique key under which this definition is fingerprinted.
    pub fn cache_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Modification time of the definition file or directory.
    pub fn last_modified(&self) -> std::io::Result<DateTime<Utc>> {
        let mtime = std::fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(mtime))
    }
}

impl fmt::Display for PackageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Suffix of the metadata archive maintained by repo-add(8).
pub const METADATA_SUFFIX: &str = ".db.tar.xz";

/// A directory of package files plus its metadata archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
}

impl Repository {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Base name of the metadata archive, e.g. `myrepo.db.tar.xz`.
    pub fn metadata_file_name(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.name)
    }

    /// Full path of the metadata archive inside the repository directory.
    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(self.metadata_file_name())
    }

    /// Path of a package file inside the repository directory.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A directory scanned for package definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub path: PathBuf,
}

/// Contents of `art.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(rename = "source", default)]
    pub sources: Vec<Source>,
    pub target: Repository,
}

impl Configuration {
    /// Rebase relative source and target paths onto `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        for source in &mut self.sources {
            source.path = root.join(&source.path);
        }
        self.target.path = root.join(&self.target.path);
    }
}
