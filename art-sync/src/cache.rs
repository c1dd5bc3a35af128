//! Fingerprint cache: what each package definition produces, and what each
//! published file contains.
//!
//! Persists a [`Cache`] JSON document at `<root>/.art-cache`:
//!
//! ```json
//! {
//!   "packages": { "<definition path>": { "lastModified": "…", "outputFiles": ["…"] } },
//!   "outputs":  { "<file base name>": { "contentDigest": { "md5": "…", "sha256": "…" } } }
//! }
//! ```
//!
//! Writes use a `.tmp` sibling + rename. A missing file loads as an empty
//! cache; a malformed one is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use art_core::PackageDefinition;

use crate::error::{io_err, SyncError};
use crate::tools::Builder;

/// File name of the cache, relative to the project root.
pub const CACHE_FILE: &str = ".art-cache";

/// `<root>/.art-cache`. Pure, no I/O.
pub fn cache_path_at(root: &Path) -> PathBuf {
    root.join(CACHE_FILE)
}

/// Two timestamps closer than this are considered equal. Some filesystems and
/// archive round-trips drop sub-second precision.
const TIME_TOLERANCE_NANOS: i64 = 1_000_000_000;

/// Returns true if the two times differ by less than a second.
pub fn fuzzy_time_eq(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b)
        .num_nanoseconds()
        .is_some_and(|diff| diff.abs() < TIME_TOLERANCE_NANOS)
}

/// Fingerprint of one package definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntry {
    /// Modification time of the definition when `output_files` was computed.
    pub last_modified: DateTime<Utc>,
    pub output_files: Vec<String>,
}

/// Hex digests of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest {
    pub md5: String,
    pub sha256: String,
}

impl ContentDigest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self {
            md5: hex::encode(Md5::digest(bytes)),
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }
}

/// Cached digest of one published output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    pub content_digest: ContentDigest,
}

/// In-memory cache, loaded once per run and saved explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageEntry>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputEntry>,
}

impl Cache {
    /// Load the cache at `path`.
    ///
    /// Returns an empty cache if the file does not yet exist.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&contents).map_err(|source| SyncError::CacheParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save the cache atomically.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`.
    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        tracing::debug!("saved cache to {}", path.display());
        Ok(())
    }

    /// Retrieve (or recompute) the fingerprint of `package`.
    ///
    /// The stored entry is reused while its timestamp matches the definition's
    /// current mtime within a second. Otherwise `builder` is asked for the
    /// output list and the in-memory entry is replaced.
    pub fn entry_for(
        &mut self,
        package: &PackageDefinition,
        builder: &dyn Builder,
    ) -> Result<PackageEntry, SyncError> {
        let key = package.cache_key();
        let mtime = package
            .last_modified()
            .map_err(|e| io_err(&package.path, e))?;

        if let Some(entry) = self.packages.get(&key) {
            if fuzzy_time_eq(entry.last_modified, mtime) {
                tracing::debug!("cache hit: {key}");
                return Ok(entry.clone());
            }
        }

        tracing::debug!("cache miss: {key}");
        let output_files =
            builder
                .output_files(package)
                .map_err(|source| SyncError::OutputList {
                    package: key.clone(),
                    source,
                })?;
        let entry = PackageEntry {
            last_modified: mtime,
            output_files,
        };
        self.packages.insert(key, entry.clone());
        Ok(entry)
    }

    /// Digest of the file at `path`, keyed by its base name.
    ///
    /// Computed on first request and then trusted for the rest of the run.
    pub fn digest_for(&mut self, path: &Path) -> Result<ContentDigest, SyncError> {
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        if let Some(entry) = self.outputs.get(&key) {
            return Ok(entry.content_digest.clone());
        }

        let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
        let content_digest = ContentDigest::of_bytes(&bytes);
        self.outputs.insert(
            key,
            OutputEntry {
                content_digest: content_digest.clone(),
            },
        );
        Ok(content_digest)
    }

    /// Drop cached digests for `file_names`, e.g. after they were rebuilt.
    pub fn forget_digests(&mut self, file_names: &[String]) {
        for name in file_names {
            self.outputs.remove(name);
        }
    }
}
