//! art core library: domain types, configuration loading, errors.
//!
//! - [`types`]: package definitions, repositories, configuration
//! - [`config`]: `art.toml` load / validate
//! - [`makepkg`]: architecture and signing key from makepkg.conf
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod makepkg;
pub mod types;

pub use error::ConfigError;
pub use makepkg::MakepkgConfig;
pub use types::{Configuration, PackageDefinition, PackageKind, Repository, Source};
