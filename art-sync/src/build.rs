//! Build gate: decide per package whether to skip, build or refuse.
//!
//! For every expected output file in the target directory:
//!
//! | On disk                                    | Meaning       |
//! |--------------------------------------------|---------------|
//! | missing                                    | needs build   |
//! | newer than the cached definition mtime     | already built |
//! | not newer than the cached definition mtime | stale, refuse |
//!
//! A mix of "already built" and "needs build" is refused as well. The builder
//! only runs when every output is missing.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};

use art_core::PackageDefinition;

use crate::cache::{Cache, PackageEntry};
use crate::error::{io_err, SyncError};
use crate::tools::Builder;

/// What the gate decided for a package whose outputs are consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Every expected output is present and newer than the definition.
    UpToDate,
    /// No expected output is present.
    NeedsBuild,
}

/// Outcome of [`build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Nothing to do.
    UpToDate,
    /// The builder ran successfully.
    Built,
}

/// Inspect the target directory for the outputs listed in `entry`.
///
/// Never touches the filesystem beyond `stat`.
pub fn inspect(
    package_key: &str,
    entry: &PackageEntry,
    target_dir: &Path,
) -> Result<GateDecision, SyncError> {
    let mut present = Vec::new();
    let mut missing = Vec::new();

    for file_name in &entry.output_files {
        let path = target_dir.join(file_name);
        match std::fs::metadata(&path) {
            Ok(meta) => {
                let mtime = meta.modified().map_err(|e| io_err(&path, e))?;
                if DateTime::<Utc>::from(mtime) > entry.last_modified {
                    present.push(file_name.clone());
                } else {
                    return Err(SyncError::StaleTarget {
                        package: package_key.to_string(),
                        file: file_name.clone(),
                    });
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => missing.push(file_name.clone()),
            Err(e) => return Err(io_err(path, e)),
        }
    }

    if !present.is_empty() && !missing.is_empty() {
        return Err(SyncError::PartialOutputs {
            package: package_key.to_string(),
            present,
            missing,
        });
    }

    if missing.is_empty() {
        Ok(GateDecision::UpToDate)
    } else {
        Ok(GateDecision::NeedsBuild)
    }
}

/// Build `package` into `target_dir` if (and only if) none of its outputs exist.
///
/// Builder failures are passed through unchanged and never retried.
pub fn build(
    package: &PackageDefinition,
    target_dir: &Path,
    cache: &mut Cache,
    builder: &dyn Builder,
) -> Result<BuildOutcome, SyncError> {
    let key = package.cache_key();
    let entry = cache.entry_for(package, builder)?;

    match inspect(&key, &entry, target_dir)? {
        GateDecision::UpToDate => {
            tracing::debug!("up to date: {key}");
            Ok(BuildOutcome::UpToDate)
        }
        GateDecision::NeedsBuild => {
            tracing::info!("building {package}");
            builder
                .build(package, target_dir)
                .map_err(|source| SyncError::Build {
                    package: key,
                    source,
                })?;
            Ok(BuildOutcome::Built)
        }
    }
}
