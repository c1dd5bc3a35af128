//! Repository metadata reader.
//!
//! A repo-add database is a compressed tar archive with one directory per
//! package. Each directory holds a `desc` file made of field blocks:
//!
//! ```text
//! %FILENAME%
//! foo-1.0-1-x86_64.pkg.tar.xz
//!
//! %NAME%
//! foo
//! ```
//!
//! Decompression is delegated to a [`Decompressor`]; the tar stream itself is
//! read in-process.

use std::io::Read;

use art_core::Repository;

use crate::cache::ContentDigest;
use crate::error::SyncError;
use crate::tools::Decompressor;

/// One package record from the metadata archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryEntry {
    /// `%NAME%`: the package name repo-remove addresses.
    pub name: String,
    /// `%FILENAME%`: base name of the package file.
    pub file_name: String,
    /// `%MD5SUM%`
    pub md5sum: Option<String>,
    /// `%SHA256SUM%`, written by newer repo-add versions.
    pub sha256sum: Option<String>,
}

impl RepositoryEntry {
    /// Whether the recorded checksum matches `digest`. SHA-256 is preferred;
    /// an entry without any checksum never matches.
    pub fn matches_digest(&self, digest: &ContentDigest) -> bool {
        if let Some(sha256) = &self.sha256sum {
            return sha256.eq_ignore_ascii_case(&digest.sha256);
        }
        if let Some(md5) = &self.md5sum {
            return md5.eq_ignore_ascii_case(&digest.md5);
        }
        false
    }
}

/// Read all package records of `repository`'s metadata archive.
///
/// A missing archive is a fresh repository and yields no entries.
pub fn read_metadata(
    repository: &Repository,
    decompressor: &dyn Decompressor,
) -> Result<Vec<RepositoryEntry>, SyncError> {
    let path = repository.metadata_path();
    if !path.exists() {
        tracing::debug!("no metadata archive at {}", path.display());
        return Ok(Vec::new());
    }

    let bytes = decompressor
        .decompress(&path)
        .map_err(|source| SyncError::MetadataDecompress {
            path: path.clone(),
            source,
        })?;
    parse_archive(&bytes).map_err(|source| SyncError::MetadataRead { path, source })
}

/// Parse an uncompressed tar stream. Only regular files named `desc` are read.
pub fn parse_archive(bytes: &[u8]) -> std::io::Result<Vec<RepositoryEntry>> {
    let mut archive = tar::Archive::new(bytes);
    let mut result = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let is_desc = entry.path()?.file_name().is_some_and(|n| n == "desc");
        if !is_desc {
            continue;
        }
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        result.push(parse_desc(&text));
    }
    Ok(result)
}

/// Parse one `desc` file. Unknown fields are ignored.
pub fn parse_desc(text: &str) -> RepositoryEntry {
    let mut entry = RepositoryEntry::default();
    let mut current_field = "";
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.len() >= 2 && line.starts_with('%') && line.ends_with('%') {
            current_field = line;
            continue;
        }
        match current_field {
            "%NAME%" => entry.name = line.to_string(),
            "%FILENAME%" => entry.file_name = line.to_string(),
            "%MD5SUM%" => entry.md5sum = Some(line.to_string()),
            "%SHA256SUM%" => entry.sha256sum = Some(line.to_string()),
            _ => {}
        }
    }
    entry
}
