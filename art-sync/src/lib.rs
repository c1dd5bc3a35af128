//! # art-sync
//!
//! Build engine and repository reconciliation.
//!
//! Call [`pipeline::run`] to build every package whose outputs are missing and
//! bring the repository's metadata archive and package files in line with the
//! result, or [`pipeline::plan`] to see what a run would do without changing
//! anything.

pub mod build;
pub mod cache;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod reconcile;
pub mod sign;
pub mod tools;

pub use cache::{cache_path_at, Cache};
pub use error::SyncError;
pub use pipeline::{plan, run, PackageState, RunPlan, RunReport, Signing, Toolbox};
pub use tools::{
    Builder, CommandBuilder, CommandDecompressor, Decompressor, GpgSigner, MetadataTool,
    RepoTools, Signer, ToolError,
};
