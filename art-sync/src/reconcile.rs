//! Repository reconciler. Brings the metadata archive and the package files on
//! disk in line with the set of files the current package definitions produce.
//!
//! Three steps, always in this order:
//!
//! 1. [`Reconciler::add_new_packages`]: repo-add files that are new or whose
//!    content changed under the same name.
//! 2. [`Reconciler::prune_metadata`]: repo-remove packages whose file is no
//!    longer produced.
//! 3. [`Reconciler::prune_packages`]: delete orphaned package files and
//!    their signatures from the repository directory.
//!
//! Each step re-reads the archive, so each is idempotent on its own. The
//! `plan_*` functions compute the same queues without touching anything.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use art_core::makepkg::PACKAGE_SUFFIXES;
use art_core::Repository;

use crate::cache::Cache;
use crate::error::{io_err, SyncError};
use crate::metadata::{read_metadata, RepositoryEntry};
use crate::tools::{Decompressor, MetadataTool};

/// Suffix of detached signatures.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Whether `file_name` is a package archive (`.pkg.tar.xz`, `.pkg.tar.zst`).
pub fn is_package_file(file_name: &str) -> bool {
    PACKAGE_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Files to hand to the metadata tool, plus the desired files that had to be
/// left out.
#[derive(Debug, Default)]
pub struct AdditionPlan {
    pub queue: Vec<String>,
    pub errors: Vec<SyncError>,
}

/// Desired files that are absent from `entries` or whose digest differs.
///
/// Files without an entry are queued as long as they exist; only files with
/// an entry are hashed, using `cache`. A desired file that is missing or
/// unreadable is recorded in [`AdditionPlan::errors`] and skipped.
pub fn plan_additions(
    repository: &Repository,
    entries: &[RepositoryEntry],
    desired_files: &[String],
    cache: &mut Cache,
) -> AdditionPlan {
    let by_file_name: HashMap<&str, &RepositoryEntry> = entries
        .iter()
        .map(|e| (e.file_name.as_str(), e))
        .collect();

    let mut seen = HashSet::new();
    let mut plan = AdditionPlan::default();
    for file_name in desired_files {
        if !seen.insert(file_name.as_str()) {
            continue;
        }
        let path = repository.file_path(file_name);
        let Some(entry) = by_file_name.get(file_name.as_str()) else {
            match std::fs::metadata(&path) {
                Ok(_) => plan.queue.push(file_name.clone()),
                Err(e) => {
                    tracing::error!("cannot add {file_name}: {e}");
                    plan.errors.push(io_err(&path, e));
                }
            }
            continue;
        };
        match cache.digest_for(&path) {
            Ok(digest) if entry.matches_digest(&digest) => {}
            Ok(_) => {
                tracing::debug!("content changed: {file_name}");
                plan.queue.push(file_name.clone());
            }
            Err(e) => {
                tracing::error!("{e}");
                plan.errors.push(e);
            }
        }
    }
    plan
}

/// Package names of entries whose file is not desired, in archive order.
pub fn plan_metadata_removals(entries: &[RepositoryEntry], desired_files: &[String]) -> Vec<String> {
    let desired: HashSet<&str> = desired_files.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| !desired.contains(e.file_name.as_str()))
        .filter(|e| seen.insert(e.name.clone()))
        .map(|e| e.name.clone())
        .collect()
}

/// Package files (and their signatures) in the repository directory that are
/// not desired, sorted by name. A missing directory has nothing to remove.
pub fn plan_package_removals(
    repository: &Repository,
    desired_files: &[String],
) -> Result<Vec<String>, SyncError> {
    let dir = &repository.path;
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir, e)),
    };

    let desired: HashSet<&str> = desired_files.iter().map(String::as_str).collect();
    let mut orphans = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let base = name.strip_suffix(SIGNATURE_SUFFIX).unwrap_or(&name);
        if desired.contains(base) || !is_package_file(base) {
            continue;
        }
        orphans.push(name);
    }
    orphans.sort();
    Ok(orphans)
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Result of [`Reconciler::add_new_packages`].
#[derive(Debug, Default)]
pub struct AddOutcome {
    /// File names handed to the metadata tool.
    pub added: Vec<String>,
    pub errors: Vec<SyncError>,
}

/// Result of [`Reconciler::prune_packages`]: deletions are independent, so
/// failures are collected rather than returned.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<SyncError>,
}

/// Applies reconciliation steps to one repository.
pub struct Reconciler<'a> {
    repository: &'a Repository,
    decompressor: &'a dyn Decompressor,
    metadata_tool: &'a dyn MetadataTool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        repository: &'a Repository,
        decompressor: &'a dyn Decompressor,
        metadata_tool: &'a dyn MetadataTool,
    ) -> Self {
        Self {
            repository,
            decompressor,
            metadata_tool,
        }
    }

    /// Current contents of the metadata archive.
    pub fn read_metadata(&self) -> Result<Vec<RepositoryEntry>, SyncError> {
        read_metadata(self.repository, self.decompressor)
    }

    /// Add new and changed files with a single metadata-tool call.
    ///
    /// Desired files that cannot be considered end up in
    /// [`AddOutcome::errors`]; the rest are still added. Once the tool
    /// succeeds, the added files are hashed into `cache`.
    pub fn add_new_packages(
        &self,
        desired_files: &[String],
        cache: &mut Cache,
    ) -> Result<AddOutcome, SyncError> {
        tracing::info!("adding new packages to {}", self.repository.name);
        let entries = self.read_metadata()?;
        let AdditionPlan { queue, errors } =
            plan_additions(self.repository, &entries, desired_files, cache);
        if queue.is_empty() {
            tracing::debug!("no packages to add");
            return Ok(AddOutcome {
                added: queue,
                errors,
            });
        }

        self.metadata_tool
            .add(self.repository, &queue)
            .map_err(|source| SyncError::MetadataUpdate {
                path: self.repository.metadata_path(),
                source,
            })?;

        for file_name in &queue {
            if let Err(e) = cache.digest_for(&self.repository.file_path(file_name)) {
                tracing::warn!("not caching digest of {file_name}: {e}");
            }
        }
        Ok(AddOutcome {
            added: queue,
            errors,
        })
    }

    /// Remove entries for files that are no longer desired, by package name.
    ///
    /// Returns the package names handed to the tool.
    pub fn prune_metadata(&self, desired_files: &[String]) -> Result<Vec<String>, SyncError> {
        tracing::info!("removing stale entries from {}", self.repository.name);
        let entries = self.read_metadata()?;
        let queue = plan_metadata_removals(&entries, desired_files);
        if queue.is_empty() {
            tracing::debug!("no metadata entries to remove");
            return Ok(queue);
        }

        self.metadata_tool
            .remove(self.repository, &queue)
            .map_err(|source| SyncError::MetadataUpdate {
                path: self.repository.metadata_path(),
                source,
            })?;
        Ok(queue)
    }

    /// Delete orphaned package files. Listing the directory may fail the step;
    /// individual deletions only record their failure.
    pub fn prune_packages(&self, desired_files: &[String]) -> Result<PruneOutcome, SyncError> {
        tracing::info!("pruning package files in {}", self.repository.path.display());
        let orphans = plan_package_removals(self.repository, desired_files)?;
        Ok(self.delete_files(orphans))
    }

    fn delete_files(&self, file_names: Vec<String>) -> PruneOutcome {
        let mut outcome = PruneOutcome::default();
        for name in file_names {
            let path = self.repository.file_path(&name);
            match remove_file(&path) {
                Ok(()) => {
                    tracing::info!("deleted {}", path.display());
                    outcome.deleted.push(name);
                }
                Err(e) => {
                    tracing::error!("{e}");
                    outcome.errors.push(e);
                }
            }
        }
        outcome
    }
}

fn remove_file(path: &Path) -> Result<(), SyncError> {
    std::fs::remove_file(path).map_err(|source| SyncError::Delete {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use crate::cache::ContentDigest;
    use crate::tools::ToolError;

    fn entry(name: &str, file_name: &str, content: &[u8]) -> RepositoryEntry {
        RepositoryEntry {
            name: name.into(),
            file_name: file_name.into(),
            md5sum: Some(ContentDigest::of_bytes(content).md5),
            sha256sum: None,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("foo-1-1-x86_64.pkg.tar.xz", true)]
    #[case("foo-1-1-any.pkg.tar.zst", true)]
    #[case("holo.db.tar.xz", false)]
    #[case("holo.db", false)]
    #[case("README", false)]
    #[case("foo-1-1-any.pkg.tar.xz.part", false)]
    #[case("foo-1-1-any.pkg.tar.xz.sig", false)]
    fn package_naming_convention(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_package_file(name), expected);
    }

    #[test]
    fn additions_include_new_and_changed_files_only() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        fs::write(tmp.path().join("a-1-1-any.pkg.tar.xz"), b"same").unwrap();
        fs::write(tmp.path().join("b-1-1-any.pkg.tar.xz"), b"rebuilt").unwrap();
        fs::write(tmp.path().join("c-1-1-any.pkg.tar.xz"), b"new").unwrap();
        let entries = vec![
            entry("a", "a-1-1-any.pkg.tar.xz", b"same"),
            entry("b", "b-1-1-any.pkg.tar.xz", b"original"),
        ];
        let mut cache = Cache::default();

        let plan = plan_additions(
            &repo,
            &entries,
            &names(&[
                "a-1-1-any.pkg.tar.xz",
                "b-1-1-any.pkg.tar.xz",
                "c-1-1-any.pkg.tar.xz",
            ]),
            &mut cache,
        );
        assert!(plan.errors.is_empty(), "errors: {:?}", plan.errors);
        assert_eq!(
            plan.queue,
            names(&["b-1-1-any.pkg.tar.xz", "c-1-1-any.pkg.tar.xz"])
        );
        // Only files with an archive entry needed a digest.
        assert_eq!(cache.outputs.len(), 2);
        assert!(!cache.outputs.contains_key("c-1-1-any.pkg.tar.xz"));
    }

    #[test]
    fn missing_new_file_is_recorded_and_others_still_queued() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        fs::write(tmp.path().join("a-1-1-any.pkg.tar.xz"), b"a").unwrap();
        let mut cache = Cache::default();

        let plan = plan_additions(
            &repo,
            &[],
            &names(&["a-1-1-any.pkg.tar.xz", "b-1-1-any.pkg.tar.xz"]),
            &mut cache,
        );
        assert_eq!(plan.queue, names(&["a-1-1-any.pkg.tar.xz"]));
        assert_eq!(plan.errors.len(), 1);
        assert!(matches!(&plan.errors[0], SyncError::Io { path, .. } if path.ends_with("b-1-1-any.pkg.tar.xz")));
    }

    #[test]
    fn additions_deduplicate_desired_files() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        fs::write(tmp.path().join("a-1-1-any.pkg.tar.xz"), b"a").unwrap();
        let mut cache = Cache::default();
        let plan = plan_additions(
            &repo,
            &[],
            &names(&["a-1-1-any.pkg.tar.xz", "a-1-1-any.pkg.tar.xz"]),
            &mut cache,
        );
        assert_eq!(plan.queue, names(&["a-1-1-any.pkg.tar.xz"]));
    }

    #[test]
    fn metadata_removals_address_packages_by_name() {
        let entries = vec![
            entry("a", "a-1-1-any.pkg.tar.xz", b""),
            entry("b", "b-1-1-any.pkg.tar.xz", b""),
            entry("c", "c-2-1-any.pkg.tar.xz", b""),
        ];
        let queue = plan_metadata_removals(
            &entries,
            &names(&["a-1-1-any.pkg.tar.xz", "b-1-1-any.pkg.tar.xz"]),
        );
        assert_eq!(queue, names(&["c"]));
    }

    #[test]
    fn package_removals_cover_signatures_and_skip_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        for name in [
            "keep-1-1-any.pkg.tar.xz",
            "keep-1-1-any.pkg.tar.xz.sig",
            "old-1-1-any.pkg.tar.xz",
            "old-1-1-any.pkg.tar.xz.sig",
            "holo.db.tar.xz",
            "holo.db",
            "index.html",
            "new-1-1-any.pkg.tar.xz.part",
        ] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(tmp.path().join("sub.pkg.tar.xz")).unwrap();

        let orphans = plan_package_removals(&repo, &names(&["keep-1-1-any.pkg.tar.xz"])).unwrap();
        assert_eq!(
            orphans,
            names(&["old-1-1-any.pkg.tar.xz", "old-1-1-any.pkg.tar.xz.sig"])
        );
    }

    #[test]
    fn package_removals_in_missing_directory_are_empty() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path().join("absent"));
        assert!(plan_package_removals(&repo, &[]).unwrap().is_empty());
    }

    struct NoTools;

    impl Decompressor for NoTools {
        fn decompress(&self, _: &Path) -> Result<Vec<u8>, ToolError> {
            unreachable!("archive is not read while deleting files")
        }
    }

    impl MetadataTool for NoTools {
        fn add(&self, _: &Repository, _: &[String]) -> Result<(), ToolError> {
            unreachable!("archive is not edited while deleting files")
        }

        fn remove(&self, _: &Repository, _: &[String]) -> Result<(), ToolError> {
            unreachable!("archive is not edited while deleting files")
        }
    }

    #[test]
    fn prune_packages_deletes_orphans_and_their_signatures() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        for name in [
            "keep-1-1-any.pkg.tar.xz",
            "old-1-1-any.pkg.tar.xz",
            "old-1-1-any.pkg.tar.xz.sig",
        ] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let reconciler = Reconciler::new(&repo, &NoTools, &NoTools);

        let outcome = reconciler
            .prune_packages(&names(&["keep-1-1-any.pkg.tar.xz"]))
            .unwrap();
        assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
        assert_eq!(
            outcome.deleted,
            names(&["old-1-1-any.pkg.tar.xz", "old-1-1-any.pkg.tar.xz.sig"])
        );
        assert!(tmp.path().join("keep-1-1-any.pkg.tar.xz").exists());
        assert!(!tmp.path().join("old-1-1-any.pkg.tar.xz").exists());
        assert!(!tmp.path().join("old-1-1-any.pkg.tar.xz.sig").exists());
    }

    #[test]
    fn failed_deletion_does_not_stop_the_others() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::new("holo", tmp.path());
        fs::write(tmp.path().join("a-1-1-any.pkg.tar.xz"), b"x").unwrap();
        fs::write(tmp.path().join("c-1-1-any.pkg.tar.xz"), b"x").unwrap();
        // remove_file refuses directories, even for root.
        fs::create_dir(tmp.path().join("b-1-1-any.pkg.tar.xz")).unwrap();
        let reconciler = Reconciler::new(&repo, &NoTools, &NoTools);

        let outcome = reconciler.delete_files(names(&[
            "a-1-1-any.pkg.tar.xz",
            "b-1-1-any.pkg.tar.xz",
            "c-1-1-any.pkg.tar.xz",
        ]));
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(&outcome.errors[0], SyncError::Delete { path, .. } if path.ends_with("b-1-1-any.pkg.tar.xz")));
        assert_eq!(
            outcome.deleted,
            names(&["a-1-1-any.pkg.tar.xz", "c-1-1-any.pkg.tar.xz"])
        );
        assert!(!tmp.path().join("a-1-1-any.pkg.tar.xz").exists());
        assert!(!tmp.path().join("c-1-1-any.pkg.tar.xz").exists());
    }
}
