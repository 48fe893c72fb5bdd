//! # schema-enforcer CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use enforcer_cli::schema::{run_schema, SchemaArgs};
use enforcer_cli::validate::{run_validate, ValidateArgs};
use enforcer_cli::EXIT_FATAL;

/// Validate structured configuration data against JSON Schemas.
///
/// Schemas live under the schema root, instance documents under the data
/// search directories; both are configured in `schema_enforcer.toml` or the
/// `[tool.schema_enforcer]` table of `pyproject.toml`.
#[derive(Parser, Debug)]
#[command(name = "schema-enforcer", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate every instance document against its applicable schemas.
    Validate(ValidateArgs),

    /// List schemas, run their fixtures, or generate fixture expectations.
    Schema(SchemaArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Logs go to stderr; stdout carries only rendered results.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "schema-enforcer starting");

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args, config),
        Commands::Schema(args) => run_schema(&args, config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("ERROR: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
