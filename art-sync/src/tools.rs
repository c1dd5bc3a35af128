//! External collaborators.
//!
//! Every program the engine shells out to sits behind a trait so that the
//! decision logic in [`crate::build`] and [`crate::reconcile`] can run against
//! fakes. The `Command*` types are the real implementations used by the CLI.
//!
//! All invocations block until the child exits. Child stdout and stderr are
//! passed through unless the output is consumed.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use art_core::{MakepkgConfig, PackageDefinition, PackageKind, Repository};
use thiserror::Error;

/// Failure of an external program.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open input {path} for {program}: {source}")]
    Input {
        program: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: String },

    #[error("{program}: {message}")]
    Output { program: String, message: String },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces package files from a package definition.
pub trait Builder {
    /// Base names of the files a build of `package` will produce.
    fn output_files(&self, package: &PackageDefinition) -> Result<Vec<String>, ToolError>;

    /// Build `package`, placing its files into `target_dir`.
    fn build(&self, package: &PackageDefinition, target_dir: &Path) -> Result<(), ToolError>;
}

/// Turns a compressed metadata archive into the raw tar stream.
pub trait Decompressor {
    fn decompress(&self, path: &Path) -> Result<Vec<u8>, ToolError>;
}

/// Edits a repository's metadata archive.
pub trait MetadataTool {
    /// Add (or replace) entries for the given package files in the repository directory.
    fn add(&self, repository: &Repository, file_names: &[String]) -> Result<(), ToolError>;

    /// Remove entries by package name.
    fn remove(&self, repository: &Repository, package_names: &[String]) -> Result<(), ToolError>;
}

/// Creates detached signatures next to package files.
pub trait Signer {
    fn sign(&self, path: &Path, key_id: &str) -> Result<(), ToolError>;
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

fn program_of(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run to completion with inherited stdout/stderr.
fn run(cmd: &mut Command) -> Result<(), ToolError> {
    let program = program_of(cmd);
    tracing::info!("running {:?}", cmd);
    let status = cmd
        .stdin(Stdio::null())
        .status()
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;
    if !status.success() {
        return Err(ToolError::Exit {
            program,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Run to completion and return stdout; stderr is inherited.
fn capture(cmd: &mut Command) -> Result<Vec<u8>, ToolError> {
    let program = program_of(cmd);
    tracing::debug!("running {:?}", cmd);
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(ToolError::Exit {
            program,
            status: output.status.to_string(),
        });
    }
    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// CommandBuilder: holo-build(8) and makepkg(8)
// ---------------------------------------------------------------------------

/// File name of the build script inside a native package directory.
const PKGBUILD: &str = "PKGBUILD";

/// Builds packages with holo-build or makepkg depending on their kind.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    makepkg: MakepkgConfig,
}

impl CommandBuilder {
    pub fn new(makepkg: MakepkgConfig) -> Self {
        Self { makepkg }
    }
}

impl Builder for CommandBuilder {
    fn output_files(&self, package: &PackageDefinition) -> Result<Vec<String>, ToolError> {
        let names = match package.kind {
            PackageKind::HoloBuild => {
                let stdout = capture(
                    Command::new("holo-build")
                        .arg("--suggest-filename")
                        .arg(&package.path)
                        .stdin(Stdio::null()),
                )?;
                let name = String::from_utf8_lossy(&stdout).trim().to_string();
                if name.is_empty() {
                    return Err(ToolError::Output {
                        program: "holo-build".into(),
                        message: format!("no file name suggested for {}", package.path.display()),
                    });
                }
                vec![name]
            }
            PackageKind::Native => {
                let stdout = capture(
                    Command::new("makepkg")
                        .args(["--packagelist", "-p", PKGBUILD])
                        .current_dir(&package.path)
                        .stdin(Stdio::null()),
                )?;
                String::from_utf8_lossy(&stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| {
                        Path::new(line)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| line.to_string())
                    })
                    .collect()
            }
        };
        Ok(self.makepkg.filter_for_current_arch(names))
    }

    fn build(&self, package: &PackageDefinition, target_dir: &Path) -> Result<(), ToolError> {
        match package.kind {
            PackageKind::HoloBuild => {
                let definition =
                    std::fs::canonicalize(&package.path).map_err(|source| ToolError::Input {
                        program: "holo-build".into(),
                        path: package.path.clone(),
                        source,
                    })?;
                run(Command::new("holo-build")
                    .arg(definition)
                    .current_dir(target_dir))
            }
            PackageKind::Native => {
                let pkgdest =
                    std::fs::canonicalize(target_dir).map_err(|source| ToolError::Input {
                        program: "makepkg".into(),
                        path: target_dir.to_path_buf(),
                        source,
                    })?;
                run(Command::new("makepkg")
                    .args(["-s", "-p", PKGBUILD])
                    .current_dir(&package.path)
                    .env("PKGDEST", pkgdest))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CommandDecompressor: xz / zstd / gzip / bzip2
// ---------------------------------------------------------------------------

/// Decompresses by piping the archive through the program matching its extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDecompressor;

impl CommandDecompressor {
    fn program_for(path: &Path) -> Option<&'static str> {
        match path.extension()?.to_str()? {
            "xz" => Some("xz"),
            "zst" => Some("zstd"),
            "gz" => Some("gzip"),
            "bz2" => Some("bzip2"),
            _ => None,
        }
    }
}

impl Decompressor for CommandDecompressor {
    fn decompress(&self, path: &Path) -> Result<Vec<u8>, ToolError> {
        let program = Self::program_for(path).ok_or_else(|| ToolError::Output {
            program: "decompress".into(),
            message: format!("unknown compression for {}", path.display()),
        })?;
        let input = File::open(path).map_err(|source| ToolError::Input {
            program: program.into(),
            path: path.to_path_buf(),
            source,
        })?;
        capture(Command::new(program).arg("-dc").stdin(Stdio::from(input)))
    }
}

// ---------------------------------------------------------------------------
// RepoTools: repo-add(8) / repo-remove(8)
// ---------------------------------------------------------------------------

/// Edits the metadata archive with pacman's repo-add and repo-remove.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoTools;

impl MetadataTool for RepoTools {
    fn add(&self, repository: &Repository, file_names: &[String]) -> Result<(), ToolError> {
        run(Command::new("repo-add")
            .arg(repository.metadata_file_name())
            .args(file_names)
            .current_dir(&repository.path))
    }

    fn remove(&self, repository: &Repository, package_names: &[String]) -> Result<(), ToolError> {
        run(Command::new("repo-remove")
            .arg(repository.metadata_file_name())
            .args(package_names)
            .current_dir(&repository.path))
    }
}

// ---------------------------------------------------------------------------
// GpgSigner
// ---------------------------------------------------------------------------

/// Signs with `gpg --detach-sign`, producing `<file>.sig`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpgSigner;

impl Signer for GpgSigner {
    fn sign(&self, path: &Path, key_id: &str) -> Result<(), ToolError> {
        run(Command::new("gpg")
            .args(["--detach-sign", "--use-agent", "-u", key_id, "--no-armor"])
            .arg(path))
    }
}
