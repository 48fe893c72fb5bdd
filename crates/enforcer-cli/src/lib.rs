//! # enforcer-cli: CLI for schema-enforcer
//!
//! Provides the `schema-enforcer` command-line interface. The binary is a
//! thin shell over [`enforcer_schema::SchemaManager`]: it resolves settings,
//! runs a workflow, renders the structured results and maps the overall
//! verdict to an exit code. No validation logic lives here.
//!
//! ## Subcommands
//!
//! ```bash
//! schema-enforcer validate [--show-pass] [--output text|json]
//! schema-enforcer schema --list
//! schema-enforcer schema --check [--schema-id ID]
//! schema-enforcer schema --generate-invalid --schema-id ID
//! ```
//!
//! ## Exit Codes
//!
//! - `0`: every check passed.
//! - `1`: at least one validation, fixture, or load failure.
//! - `2`: fatal: settings unusable, schema root missing, duplicate
//!   schema identifiers.

pub mod schema;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use enforcer_core::Settings;

/// Every check passed.
pub const EXIT_SUCCESS: u8 = 0;
/// A check failed.
pub const EXIT_FAILURE: u8 = 1;
/// The run could not be carried out.
pub const EXIT_FATAL: u8 = 2;

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per result.
    #[default]
    Text,
    /// A single JSON document.
    Json,
}

/// Resolve settings from `--config`, or from the working directory.
pub fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    Settings::resolve(config, &cwd).context("failed to load settings")
}

/// `path` relative to the working directory when it lies below it.
pub fn display_path(path: &Path) -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Exit code for an overall verdict.
pub fn exit_code(success: bool) -> u8 {
    if success {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_maps_to_exit_code() {
        assert_eq!(exit_code(true), EXIT_SUCCESS);
        assert_eq!(exit_code(false), EXIT_FAILURE);
    }

    #[test]
    fn paths_outside_cwd_are_kept() {
        let p = Path::new("/definitely/not/below/cwd.yml");
        assert_eq!(display_path(p), p);
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("custom.toml");
        std::fs::write(&config, "main_directory = \"schemas\"\n").unwrap();
        let settings = load_settings(Some(&config)).unwrap();
        assert_eq!(settings.main_directory, dir.path().join("schemas"));
    }
}
