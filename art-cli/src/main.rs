//! art: build package definitions into a pacman repository.
//!
//! # Usage
//!
//! ```text
//! art sync [--dir <path>]
//! art status [--dir <path>] [--json]
//! ```
//!
//! Log verbosity follows `RUST_LOG`; `-v` and `-q` override it.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "art",
    version,
    about = "Build package definitions and keep a pacman repository in sync",
    long_about = None,
)]
struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build missing packages and reconcile the target repository.
    Sync(SyncArgs),

    /// Show what `sync` would build, add and remove.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match (verbose, quiet) {
        (true, _) => EnvFilter::new("debug"),
        (_, true) => EnvFilter::new("warn"),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
