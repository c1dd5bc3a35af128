//! Sync pipeline entrypoint used by the CLI.
//!
//! This is the only place that decides whether an error ends the run or only
//! the current item:
//!
//! - cache save, unreadable metadata archive: abort (`Err`)
//! - gate conflicts, builder and signing failures, desired files missing at
//!   add time, failed deletions: record in [`RunReport::errors`] and carry on
//!
//! Pruning is destructive, so it only runs when the picture is complete: every
//! package's output list is known and the add step succeeded.

use std::path::Path;

use serde::Serialize;

use art_core::{PackageDefinition, PackageKind, Repository};

use crate::build::{self, BuildOutcome, GateDecision};
use crate::cache::Cache;
use crate::error::{io_err, SyncError};
use crate::metadata::read_metadata;
use crate::reconcile::{
    plan_additions, plan_metadata_removals, plan_package_removals, Reconciler,
};
use crate::sign::add_missing_signatures;
use crate::tools::{Builder, Decompressor, MetadataTool, Signer};

/// Signing configuration for a run.
#[derive(Clone, Copy)]
pub struct Signing<'a> {
    pub signer: &'a dyn Signer,
    pub key_id: &'a str,
}

/// External collaborators used by a run.
#[derive(Clone, Copy)]
pub struct Toolbox<'a> {
    pub builder: &'a dyn Builder,
    pub decompressor: &'a dyn Decompressor,
    pub metadata_tool: &'a dyn MetadataTool,
    /// `None` when no signing key is configured.
    pub signing: Option<Signing<'a>>,
}

/// Everything a run did, plus every per-item error.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Keys of packages the builder ran for.
    pub built: Vec<String>,
    /// Keys of packages whose outputs were already current.
    pub up_to_date: Vec<String>,
    pub signed: Vec<String>,
    /// Files handed to the metadata tool for addition.
    pub added: Vec<String>,
    /// Package names removed from the metadata archive.
    pub removed: Vec<String>,
    /// Files deleted from the repository directory.
    pub deleted: Vec<String>,
    pub pruning_skipped: bool,
    pub errors: Vec<SyncError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn aborts_run(err: &SyncError) -> bool {
    matches!(
        err,
        SyncError::CacheParse { .. }
            | SyncError::Json(_)
            | SyncError::MetadataDecompress { .. }
            | SyncError::MetadataRead { .. }
    )
}

/// Build what is missing and reconcile `repository` with the result.
///
/// The cache is saved to `cache_path` after the build phase, after the add
/// step (before anything is pruned) and at the end.
pub fn run(
    packages: &[PackageDefinition],
    repository: &Repository,
    cache: &mut Cache,
    cache_path: &Path,
    tools: &Toolbox<'_>,
) -> Result<RunReport, SyncError> {
    std::fs::create_dir_all(&repository.path).map_err(|e| io_err(&repository.path, e))?;

    let mut report = RunReport::default();
    // Outputs of packages that passed their gate; these get added.
    let mut ready = Vec::new();
    // Outputs of every package with a known fingerprint; these are protected from pruning.
    let mut known = Vec::new();
    let mut complete = true;

    tracing::info!("building {} package(s)", packages.len());
    for package in packages {
        let key = package.cache_key();
        let entry = match cache.entry_for(package, tools.builder) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("{e}");
                complete = false;
                report.errors.push(e);
                continue;
            }
        };
        known.extend(entry.output_files.iter().cloned());

        match build::build(package, &repository.path, cache, tools.builder) {
            Ok(BuildOutcome::Built) => {
                // Rebuilt files may keep their names but not their contents.
                cache.forget_digests(&entry.output_files);
                report.built.push(key);
            }
            Ok(BuildOutcome::UpToDate) => report.up_to_date.push(key),
            Err(e) => {
                tracing::error!("{e}");
                report.errors.push(e);
                continue;
            }
        }

        if let Some(signing) = tools.signing {
            let outcome = add_missing_signatures(
                &entry.output_files,
                &repository.path,
                signing.signer,
                signing.key_id,
            );
            report.signed.extend(outcome.signed);
            report.errors.extend(outcome.errors);
        }
        ready.extend(entry.output_files);
    }
    cache.save(cache_path)?;

    let reconciler = Reconciler::new(repository, tools.decompressor, tools.metadata_tool);
    let added = match reconciler.add_new_packages(&ready, cache) {
        Ok(outcome) => {
            report.added = outcome.added;
            report.errors.extend(outcome.errors);
            true
        }
        Err(e) if aborts_run(&e) => return Err(e),
        Err(e) => {
            tracing::error!("{e}");
            report.errors.push(e);
            false
        }
    };
    // New digests must survive a crash before anything destructive happens.
    cache.save(cache_path)?;

    if !complete || !added {
        tracing::warn!("skipping repository pruning: not every package could be processed");
        report.pruning_skipped = true;
    } else {
        prune(&reconciler, &known, &mut report)?;
    }

    cache.save(cache_path)?;
    Ok(report)
}

fn prune(
    reconciler: &Reconciler<'_>,
    known: &[String],
    report: &mut RunReport,
) -> Result<(), SyncError> {
    match reconciler.prune_metadata(known) {
        Ok(removed) => report.removed = removed,
        Err(e) if aborts_run(&e) => return Err(e),
        Err(e) => {
            // Files stay until their metadata entries are gone.
            tracing::error!("{e}");
            report.errors.push(e);
            report.pruning_skipped = true;
            return Ok(());
        }
    }

    match reconciler.prune_packages(known) {
        Ok(outcome) => {
            report.deleted = outcome.deleted;
            report.errors.extend(outcome.errors);
        }
        Err(e) => {
            tracing::error!("{e}");
            report.errors.push(e);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan (read-only)
// ---------------------------------------------------------------------------

/// Gate result for one package, as shown by `art status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum PackageState {
    UpToDate,
    NeedsBuild,
    /// The gate refused the package.
    Conflict(String),
    /// The output list could not be determined.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagePlan {
    pub key: String,
    pub kind: PackageKind,
    pub output_files: Vec<String>,
    #[serde(flatten)]
    pub state: PackageState,
}

/// What [`run`] would do, computed without building, signing, deleting or
/// editing the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub packages: Vec<PackagePlan>,
    /// Files that would be handed to the metadata tool, including outputs of
    /// packages that still need building.
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
    pub to_delete: Vec<String>,
    pub pruning_skipped: bool,
}

impl RunPlan {
    /// Nothing to build and nothing to change in the repository.
    pub fn is_current(&self) -> bool {
        self.packages
            .iter()
            .all(|p| p.state == PackageState::UpToDate)
            && self.to_add.is_empty()
            && self.to_remove.is_empty()
            && self.to_delete.is_empty()
    }
}

/// Compute a [`RunPlan`]. `cache` is updated in memory only; the caller
/// decides whether to save it.
pub fn plan(
    packages: &[PackageDefinition],
    repository: &Repository,
    cache: &mut Cache,
    builder: &dyn Builder,
    decompressor: &dyn Decompressor,
) -> Result<RunPlan, SyncError> {
    let mut result = RunPlan::default();
    let mut present = Vec::new();
    let mut pending = Vec::new();
    let mut known = Vec::new();
    let mut complete = true;

    for package in packages {
        let key = package.cache_key();
        let (output_files, state) = match cache.entry_for(package, builder) {
            Err(e) => {
                complete = false;
                (Vec::new(), PackageState::Unknown(e.to_string()))
            }
            Ok(entry) => {
                known.extend(entry.output_files.iter().cloned());
                let state = match build::inspect(&key, &entry, &repository.path) {
                    Ok(GateDecision::UpToDate) => {
                        present.extend(entry.output_files.iter().cloned());
                        PackageState::UpToDate
                    }
                    Ok(GateDecision::NeedsBuild) => {
                        pending.extend(entry.output_files.iter().cloned());
                        PackageState::NeedsBuild
                    }
                    Err(e) => PackageState::Conflict(e.to_string()),
                };
                (entry.output_files, state)
            }
        };
        result.packages.push(PackagePlan {
            key,
            kind: package.kind,
            output_files,
            state,
        });
    }

    let entries = read_metadata(repository, decompressor)?;
    result.to_add = plan_additions(repository, &entries, &present, cache).queue;
    for file_name in pending {
        if !result.to_add.contains(&file_name) {
            result.to_add.push(file_name);
        }
    }

    if complete {
        result.to_remove = plan_metadata_removals(&entries, &known);
        result.to_delete = plan_package_removals(repository, &known)?;
    } else {
        result.pruning_skipped = true;
    }
    Ok(result)
}
