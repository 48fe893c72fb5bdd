//! # Schema Subcommand
//!
//! Operations on the schemas themselves: listing them, running their
//! pass/fail fixtures, and recording expected error records for fail
//! fixtures.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use enforcer_core::SchemaId;
use enforcer_schema::{
    CancellationToken, LoadError, SchemaListing, SchemaManager, SchemaTestReport,
};

use crate::{display_path, exit_code, OutputFormat, EXIT_SUCCESS};

/// Arguments for the `schema-enforcer schema` subcommand.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// List every loaded schema with its applies-to keys.
    #[arg(long, conflicts_with_all = ["check", "generate_invalid"])]
    pub list: bool,

    /// Run the schemas' pass/fail fixtures.
    #[arg(long, conflicts_with = "generate_invalid")]
    pub check: bool,

    /// Write expected error records for the fail fixtures of one schema.
    #[arg(long, requires = "schema_id")]
    pub generate_invalid: bool,

    /// Restrict to a single schema identifier.
    #[arg(long, value_name = "ID")]
    pub schema_id: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Serialize)]
struct JsonTestReport<'a> {
    success: bool,
    load_errors: &'a [LoadError],
    #[serde(flatten)]
    report: &'a SchemaTestReport,
}

/// Execute the schema subcommand.
pub fn run_schema(args: &SchemaArgs, config: Option<&Path>) -> Result<u8> {
    if !args.list && !args.check && !args.generate_invalid {
        bail!("one of --list, --check or --generate-invalid is required");
    }

    let settings = crate::load_settings(config)?;
    let manager = SchemaManager::load(&settings).context("failed to load schemas")?;
    let schema_id = args.schema_id.as_deref().map(SchemaId::from);

    if args.list {
        let listing = manager.schema_listing();
        match args.output {
            OutputFormat::Text => print!("{}", render_listing(&listing)),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&listing).context("failed to serialize listing")?
            ),
        }
        return Ok(EXIT_SUCCESS);
    }

    if args.generate_invalid {
        let Some(id) = schema_id else {
            bail!("--generate-invalid requires --schema-id");
        };
        let written = manager
            .generate_invalid_expected(&id)
            .with_context(|| format!("failed to generate expected results for {id}"))?;
        for path in &written {
            println!("Generated {}", display_path(path).display());
        }
        if written.is_empty() {
            println!("No fail case directories found for {id}");
        }
        return Ok(EXIT_SUCCESS);
    }

    let token = CancellationToken::new();
    let report = match &schema_id {
        Some(id) => manager.test_schema(id, &token)?,
        None => manager.test_schemas(&token),
    };
    let success = manager.summarize(None, Some(&report));

    match args.output {
        OutputFormat::Text => print!("{}", render_test_report(manager.load_errors(), &report, success)),
        OutputFormat::Json => {
            let json = JsonTestReport {
                success,
                load_errors: manager.load_errors(),
                report: &report,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("failed to serialize report")?
            );
        }
    }
    Ok(exit_code(success))
}

/// Render the schema listing as an aligned table.
pub fn render_listing(listing: &[SchemaListing]) -> String {
    let width = listing
        .iter()
        .map(|l| l.schema_id.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Schema ID".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<5}  {}", "Schema ID", "Valid", "Applies To");
    let _ = writeln!(out, "{}", "-".repeat(width + 20));
    for l in listing {
        let _ = writeln!(
            out,
            "{:<width$}  {:<5}  {}",
            l.schema_id.as_str(),
            if l.runnable { "yes" } else { "no" },
            l.applies_to.join(", ")
        );
    }
    out
}

/// Render a fixture test report as text.
pub fn render_test_report(load_errors: &[LoadError], report: &SchemaTestReport, success: bool) -> String {
    let mut out = String::new();

    for e in load_errors.iter().chain(&report.fixture_errors) {
        let _ = writeln!(
            out,
            "FAIL | [LOAD] {} [FILE] {}",
            e.message,
            display_path(&e.path).display()
        );
    }

    for r in report.results.iter().filter(|r| !r.matches) {
        let _ = writeln!(
            out,
            "FAIL | [SCHEMA] {} | [FILE] {} | expected {}, got {}: {}",
            r.schema_id,
            display_path(&r.fixture).display(),
            r.expected,
            r.actual,
            r.detail.as_deref().unwrap_or("mismatch")
        );
        for e in &r.errors {
            let _ = writeln!(out, "    [PROPERTY] {} [ERROR] {}", e.path, e.message);
        }
    }

    for id in &report.untested {
        let _ = writeln!(out, "WARN | [SCHEMA] {id} has no fixtures");
    }

    if report.cancelled {
        out.push_str("FAIL | [ERROR] schema tests were cancelled\n");
    }

    if success {
        let _ = writeln!(
            out,
            "ALL SCHEMAS ARE VALID ({} fixtures across {} schemas)",
            report.results.len(),
            report.self_consistent().len()
        );
    }
    out
}
