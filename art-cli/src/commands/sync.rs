//! `art sync`: build missing packages and reconcile the repository.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use art_sync::{
    cache_path_at,
    pipeline::{self, RunReport, Signing, Toolbox},
    Cache, CommandBuilder, CommandDecompressor, GpgSigner, RepoTools,
};

use super::Project;

/// Arguments for `art sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Directory containing art.toml.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let project = Project::load(&self.dir)?;
        let cache_path = cache_path_at(&self.dir);
        let mut cache = Cache::load(&cache_path).context("failed to load cache")?;

        let builder = CommandBuilder::new(project.makepkg.clone());
        let decompressor = CommandDecompressor;
        let repo_tools = RepoTools;
        let signer = GpgSigner;
        let signing = project
            .makepkg
            .gpg_key_id
            .as_deref()
            .map(|key_id| Signing {
                signer: &signer,
                key_id,
            });
        let tools = Toolbox {
            builder: &builder,
            decompressor: &decompressor,
            metadata_tool: &repo_tools,
            signing,
        };

        let repository = &project.config.target;
        let report = pipeline::run(&project.packages, repository, &mut cache, &cache_path, &tools)
            .with_context(|| format!("sync of repository '{}' failed", repository.name))?;

        print_report(&repository.name, &report);
        if !report.is_success() {
            bail!("{} error(s) during sync", report.errors.len());
        }
        Ok(())
    }
}

fn print_report(repository: &str, report: &RunReport) {
    let mark = if report.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{mark} '{repository}': {} built, {} up to date, {} signed, {} added, {} removed, {} deleted",
        report.built.len(),
        report.up_to_date.len(),
        report.signed.len(),
        report.added.len(),
        report.removed.len(),
        report.deleted.len(),
    );

    for file_name in &report.added {
        println!("  {}  {file_name}", "+".green());
    }
    for name in &report.removed {
        println!("  {}  {name}", "-".red());
    }
    for file_name in &report.deleted {
        println!("  {}  {file_name}", "✗".bright_black());
    }
    if report.pruning_skipped {
        println!("  {}", "pruning skipped".yellow());
    }
    for err in &report.errors {
        eprintln!("  {} {err}", "error:".red().bold());
    }
}
