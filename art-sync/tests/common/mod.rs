//! Shared fakes for pipeline integration tests.
//!
//! `FakeRepoDb` stands in for both repo-add/repo-remove and the decompressor:
//! it keeps its entries in memory and serves them back as a tar stream.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use art_core::{PackageDefinition, PackageKind, Repository};
use art_sync::cache::{cache_path_at, Cache, ContentDigest};
use art_sync::metadata::RepositoryEntry;
use art_sync::pipeline::{self, RunReport, Signing, Toolbox};
use art_sync::{Builder, Decompressor, MetadataTool, Signer, SyncError, ToolError};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

fn exit(program: &str) -> ToolError {
    ToolError::Exit {
        program: program.into(),
        status: "exit status: 1".into(),
    }
}

fn definition_name(package: &PackageDefinition) -> String {
    package
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Produces configured outputs per definition file name. Every build writes
/// fresh contents, so a rebuilt file never matches its previous digest.
#[derive(Default)]
pub struct FakeBuilder {
    outputs: HashMap<String, Vec<String>>,
    generation: Cell<u32>,
    pub builds: RefCell<Vec<String>>,
    pub fail_build: RefCell<HashSet<String>>,
    pub fail_list: RefCell<HashSet<String>>,
    /// Definitions whose build reports success but writes nothing.
    pub write_nothing: RefCell<HashSet<String>>,
}

impl FakeBuilder {
    pub fn with(mut self, definition: &str, outputs: &[&str]) -> Self {
        self.outputs.insert(
            definition.to_string(),
            outputs.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.borrow().len()
    }
}

impl Builder for FakeBuilder {
    fn output_files(&self, package: &PackageDefinition) -> Result<Vec<String>, ToolError> {
        let name = definition_name(package);
        if self.fail_list.borrow().contains(&name) {
            return Err(exit("holo-build"));
        }
        Ok(self.outputs.get(&name).cloned().unwrap_or_default())
    }

    fn build(&self, package: &PackageDefinition, target_dir: &Path) -> Result<(), ToolError> {
        let name = definition_name(package);
        self.builds.borrow_mut().push(name.clone());
        if self.fail_build.borrow().contains(&name) {
            return Err(exit("holo-build"));
        }
        if self.write_nothing.borrow().contains(&name) {
            return Ok(());
        }
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        for file_name in self.outputs.get(&name).into_iter().flatten() {
            fs::write(
                target_dir.join(file_name),
                format!("{file_name} #{generation}"),
            )
            .unwrap();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Repository database
// ---------------------------------------------------------------------------

/// Package name of a file, e.g. `foo-bar` for `foo-bar-1.0-1-any.pkg.tar.xz`.
pub fn package_name(file_name: &str) -> String {
    let stem = file_name
        .find(".pkg.tar.")
        .map_or(file_name, |i| &file_name[..i]);
    stem.rsplitn(4, '-').last().unwrap_or(stem).to_string()
}

#[derive(Default)]
pub struct FakeRepoDb {
    pub entries: RefCell<Vec<RepositoryEntry>>,
    /// One line per tool invocation, e.g. `add a-1-1-any.pkg.tar.xz`.
    pub calls: RefCell<Vec<String>>,
    pub fail_add: Cell<bool>,
    pub unreadable: Cell<bool>,
}

impl FakeRepoDb {
    pub fn entry_names(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|e| e.name.clone()).collect()
    }

    fn touch_archive(&self, repository: &Repository) {
        fs::write(repository.metadata_path(), b"fake db").unwrap();
    }
}

impl Decompressor for FakeRepoDb {
    fn decompress(&self, _: &Path) -> Result<Vec<u8>, ToolError> {
        if self.unreadable.get() {
            return Err(exit("xz"));
        }
        let mut builder = tar::Builder::new(Vec::new());
        for entry in self.entries.borrow().iter() {
            let desc = format!(
                "%FILENAME%\n{}\n\n%NAME%\n{}\n\n%MD5SUM%\n{}\n\n%SHA256SUM%\n{}\n\n",
                entry.file_name,
                entry.name,
                entry.md5sum.as_deref().unwrap_or_default(),
                entry.sha256sum.as_deref().unwrap_or_default(),
            );
            let mut header = tar::Header::new_gnu();
            header.set_size(desc.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/desc", entry.name), desc.as_bytes())
                .unwrap();
        }
        Ok(builder.into_inner().unwrap())
    }
}

impl MetadataTool for FakeRepoDb {
    fn add(&self, repository: &Repository, file_names: &[String]) -> Result<(), ToolError> {
        self.calls
            .borrow_mut()
            .push(format!("add {}", file_names.join(" ")));
        if self.fail_add.get() {
            return Err(exit("repo-add"));
        }
        let mut entries = self.entries.borrow_mut();
        for file_name in file_names {
            let path = repository.file_path(file_name);
            let bytes = fs::read(&path).map_err(|source| ToolError::Input {
                program: "repo-add".into(),
                path,
                source,
            })?;
            let digest = ContentDigest::of_bytes(&bytes);
            let name = package_name(file_name);
            entries.retain(|e| e.name != name);
            entries.push(RepositoryEntry {
                name,
                file_name: file_name.clone(),
                md5sum: Some(digest.md5),
                sha256sum: Some(digest.sha256),
            });
        }
        self.touch_archive(repository);
        Ok(())
    }

    fn remove(&self, repository: &Repository, package_names: &[String]) -> Result<(), ToolError> {
        self.calls
            .borrow_mut()
            .push(format!("remove {}", package_names.join(" ")));
        self.entries
            .borrow_mut()
            .retain(|e| !package_names.contains(&e.name));
        self.touch_archive(repository);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSigner {
    pub signed: RefCell<Vec<PathBuf>>,
}

impl Signer for RecordingSigner {
    fn sign(&self, path: &Path, _key_id: &str) -> Result<(), ToolError> {
        let mut sig = path.as_os_str().to_owned();
        sig.push(".sig");
        fs::write(PathBuf::from(sig), b"signature").unwrap();
        self.signed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A source directory, a repository directory and a cache file in one `TempDir`.
pub struct Workspace {
    _tmp: TempDir,
    pub root: PathBuf,
    pub src: PathBuf,
    pub repo: Repository,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let src = root.join("src");
        fs::create_dir(&src).unwrap();
        Self {
            repo: Repository::new("test", root.join("repo")),
            _tmp: tmp,
            root,
            src,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        cache_path_at(&self.root)
    }

    pub fn load_cache(&self) -> Cache {
        Cache::load(&self.cache_path()).unwrap()
    }

    /// A holo-build definition last modified `age_secs` ago.
    pub fn definition_aged(&self, name: &str, age_secs: u64) -> PackageDefinition {
        let path = self.src.join(name);
        fs::write(&path, "[package]\n").unwrap();
        set_mtime(&path, age_secs);
        PackageDefinition::new(path, PackageKind::HoloBuild)
    }

    /// A holo-build definition last modified an hour ago.
    pub fn definition(&self, name: &str) -> PackageDefinition {
        self.definition_aged(name, 3600)
    }

    pub fn repo_file(&self, name: &str) -> PathBuf {
        self.repo.file_path(name)
    }

    pub fn run(
        &self,
        packages: &[PackageDefinition],
        builder: &FakeBuilder,
        db: &FakeRepoDb,
    ) -> Result<RunReport, SyncError> {
        self.run_with(packages, builder, db, None)
    }

    pub fn run_with(
        &self,
        packages: &[PackageDefinition],
        builder: &FakeBuilder,
        db: &FakeRepoDb,
        signing: Option<Signing<'_>>,
    ) -> Result<RunReport, SyncError> {
        let mut cache = self.load_cache();
        let tools = Toolbox {
            builder,
            decompressor: db,
            metadata_tool: db,
            signing,
        };
        pipeline::run(packages, &self.repo, &mut cache, &self.cache_path(), &tools)
    }
}

pub fn set_mtime(path: &Path, age_secs: u64) {
    let at = SystemTime::now() - Duration::from_secs(age_secs);
    set_file_mtime(path, FileTime::from_system_time(at)).unwrap();
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
