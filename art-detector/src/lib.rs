//! Package discovery for `art-detector`.
//!
//! `detect_packages(path)` lists a source directory and classifies its entries.
//! Entries are visited in file-name order so that builds run in a stable order:
//!
//! - a subdirectory containing a `PKGBUILD` gives [`PackageKind::Native`]
//! - a regular file or symlink named `*.pkg.toml` gives [`PackageKind::HoloBuild`]
//!
//! Everything else is ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use art_core::types::{PackageDefinition, PackageKind, Source};
use thiserror::Error;

/// File name that marks a directory as a makepkg package.
pub const PKGBUILD: &str = "PKGBUILD";

/// Suffix of holo-build package definitions.
pub const HOLO_BUILD_SUFFIX: &str = ".pkg.toml";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from package discovery.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("cannot scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Discover all package definitions directly inside `path`.
pub fn detect_packages(path: &Path) -> Result<Vec<PackageDefinition>, DetectError> {
    let mut entries: Vec<_> = fs::read_dir(path)
        .map_err(|e| io_err(path, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| io_err(path, e))?;
    entries.sort_by_key(|e| e.file_name());

    let mut packages = Vec::new();
    for entry in entries {
        let entry_path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&entry_path, e))?;

        if file_type.is_dir() {
            if has_pkgbuild(&entry_path)? {
                packages.push(PackageDefinition::new(entry_path, PackageKind::Native));
            }
            continue;
        }

        let is_regular_or_symlink = file_type.is_file() || file_type.is_symlink();
        let name = entry.file_name();
        if is_regular_or_symlink && name.to_string_lossy().ends_with(HOLO_BUILD_SUFFIX) {
            packages.push(PackageDefinition::new(entry_path, PackageKind::HoloBuild));
        }
    }

    tracing::debug!(
        "discovered {} package(s) in {}",
        packages.len(),
        path.display()
    );
    Ok(packages)
}

/// Discover packages across all sources, in configuration order.
pub fn detect_all(sources: &[Source]) -> Result<Vec<PackageDefinition>, DetectError> {
    let mut packages = Vec::new();
    for source in sources {
        packages.extend(detect_packages(&source.path)?);
    }
    Ok(packages)
}

fn has_pkgbuild(dir: &Path) -> Result<bool, DetectError> {
    let path = dir.join(PKGBUILD);
    // Follows symlinks: a symlinked PKGBUILD counts.
    match fs::metadata(&path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}
