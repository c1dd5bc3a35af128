//! `art status`: what a sync would do, without doing it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use art_sync::{
    cache_path_at,
    pipeline::{self, PackageState, RunPlan},
    Cache, CommandBuilder, CommandDecompressor,
};

use super::Project;

/// Arguments for `art status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Directory containing art.toml.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let project = Project::load(&self.dir)?;
        // Loaded for reuse only; never written back.
        let mut cache = Cache::load(&cache_path_at(&self.dir)).context("failed to load cache")?;

        let builder = CommandBuilder::new(project.makepkg.clone());
        let repository = &project.config.target;
        let plan = pipeline::plan(
            &project.packages,
            repository,
            &mut cache,
            &builder,
            &CommandDecompressor,
        )
        .with_context(|| format!("status of repository '{}' failed", repository.name))?;

        if self.json {
            print_json(&repository.name, &plan)?;
            return Ok(());
        }
        print_table(&repository.name, plan);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    repository: &'a str,
    current: bool,
    #[serde(flatten)]
    plan: &'a RunPlan,
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "package")]
    package: String,
    #[tabled(rename = "builder")]
    builder: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "outputs")]
    outputs: String,
}

fn print_json(repository: &str, plan: &RunPlan) -> Result<()> {
    let payload = StatusJson {
        repository,
        current: plan.is_current(),
        plan,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(repository: &str, plan: RunPlan) {
    println!(
        "art v{} | repository '{repository}' | {} packages",
        env!("CARGO_PKG_VERSION"),
        plan.packages.len(),
    );

    let current = plan.is_current();
    if plan.packages.is_empty() {
        println!("No package definitions found.");
    } else {
        let rows: Vec<PackageRow> = plan
            .packages
            .into_iter()
            .map(|p| PackageRow {
                package: p.key,
                builder: p.kind.to_string(),
                state: state_label(&p.state),
                outputs: p.output_files.join("\n"),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for file_name in &plan.to_add {
        println!("  {}  {file_name}", "+".green());
    }
    for name in &plan.to_remove {
        println!("  {}  {name}", "-".red());
    }
    for file_name in &plan.to_delete {
        println!("  {}  {file_name}", "✗".bright_black());
    }
    if plan.pruning_skipped {
        println!("{}", "Pruning would be skipped: some output lists are unknown.".yellow());
    }

    if current {
        println!("{}", "Repository is up to date.".green());
    } else {
        println!("Run 'art sync' to apply.");
    }
}

fn state_label(state: &PackageState) -> String {
    match state {
        PackageState::UpToDate => "up to date".to_string(),
        PackageState::NeedsBuild => "needs build".to_string(),
        PackageState::Conflict(reason) => format!("conflict: {reason}"),
        PackageState::Unknown(reason) => format!("unknown: {reason}"),
    }
}
