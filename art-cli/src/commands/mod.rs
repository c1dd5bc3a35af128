pub mod status;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use art_core::{config, Configuration, MakepkgConfig, PackageDefinition};
use art_detector::detect_all;

/// Everything both subcommands read before touching the repository.
pub struct Project {
    pub config: Configuration,
    pub makepkg: MakepkgConfig,
    pub packages: Vec<PackageDefinition>,
}

impl Project {
    pub fn load(dir: &Path) -> Result<Self> {
        let config = config::load_at(dir).context("failed to load configuration")?;
        let makepkg = MakepkgConfig::load().context("failed to read makepkg configuration")?;
        let packages = detect_all(&config.sources).context("package discovery failed")?;
        tracing::info!(
            "found {} package definition(s) for repository {}",
            packages.len(),
            config.target.name
        );
        Ok(Self {
            config,
            makepkg,
            packages,
        })
    }
}
