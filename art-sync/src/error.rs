//! Error types for art-sync.

use std::path::PathBuf;

use thiserror::Error;

use crate::tools::ToolError;

/// All errors that can arise from building and repository synchronisation.
///
/// Leaf operations only describe what went wrong; [`crate::pipeline`] decides
/// whether an error ends the run or only the current item.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not valid.
    #[error("failed to parse cache at {path}: {source}")]
    CacheParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (cache save path).
    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The builder could not report what a package produces.
    #[error("cannot list output files of {package}: {source}")]
    OutputList {
        package: String,
        #[source]
        source: ToolError,
    },

    /// An output exists but is not newer than its package definition.
    #[error("refusing to build {file}: target file exists and is older than package definition {package}")]
    StaleTarget { package: String, file: String },

    /// Some outputs of a package exist at the target and some do not.
    #[error(
        "cannot build {package}: {} exist at target, but {} do not",
        .present.join(", "),
        .missing.join(", ")
    )]
    PartialOutputs {
        package: String,
        present: Vec<String>,
        missing: Vec<String>,
    },

    /// The builder ran and failed.
    #[error("build of {package} failed: {source}")]
    Build {
        package: String,
        #[source]
        source: ToolError,
    },

    /// Detached signature could not be created.
    #[error("cannot sign {path}: {source}")]
    Sign {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// The metadata archive could not be decompressed.
    #[error("error reading {path}: {source}")]
    MetadataDecompress {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// The decompressed metadata archive is not a readable tar stream.
    #[error("error reading {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// repo-add or repo-remove failed.
    #[error("cannot update {path}: {source}")]
    MetadataUpdate {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// An orphaned package file could not be removed.
    #[error("cannot delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
