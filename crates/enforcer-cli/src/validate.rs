//! # Validate Subcommand
//!
//! Validates every instance document under the configured search
//! directories against the schemas that apply to it.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use enforcer_schema::{
    CancellationToken, LoadError, SchemaManager, UnresolvedReason, ValidationReport,
};

use crate::{display_path, exit_code, OutputFormat};

/// Arguments for the `schema-enforcer validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also print instances that passed.
    #[arg(long)]
    pub show_pass: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    success: bool,
    load_errors: &'a [LoadError],
    #[serde(flatten)]
    report: &'a ValidationReport,
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 on success, 1 on any failure.
pub fn run_validate(args: &ValidateArgs, config: Option<&Path>) -> Result<u8> {
    let settings = crate::load_settings(config)?;
    let manager = SchemaManager::load(&settings).context("failed to load schemas")?;
    tracing::info!(schemas = manager.store().len(), "loaded schema store");

    let report = manager.validate_discovered(&CancellationToken::new());
    let success = manager.summarize(Some(&report), None);

    match args.output {
        OutputFormat::Text => {
            print!("{}", render_text(manager.load_errors(), &report, args.show_pass, success));
        }
        OutputFormat::Json => {
            let json = JsonReport {
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

/// Render a validation report as text, one line per finding.
pub fn render_text(
    load_errors: &[LoadError],
    report: &ValidationReport,
    show_pass: bool,
    success: bool,
) -> String {
    let mut out = String::new();

    for e in load_errors.iter().chain(&report.instance_errors) {
        let _ = writeln!(
            out,
            "FAIL | [LOAD] {} [FILE] {}",
            e.message,
            display_path(&e.path).display()
        );
    }

    for result in &report.results {
        let file = display_path(&result.instance);
        if result.passed() {
            if show_pass {
                let _ = writeln!(
                    out,
                    "PASS | [SCHEMA] {} | [FILE] {}",
                    result.schema_id,
                    file.display()
                );
            }
            continue;
        }
        for e in &result.errors {
            let _ = writeln!(
                out,
                "FAIL | [ERROR] {} [FILE] {} [PROPERTY] {} [SCHEMA] {}",
                e.message,
                file.display(),
                e.path,
                result.schema_id
            );
        }
    }

    for u in &report.unresolved {
        let reason = match u.reason {
            UnresolvedReason::NotFound => "schema not found",
            UnresolvedReason::NotRunnable => "schema is not runnable",
        };
        let _ = writeln!(
            out,
            "FAIL | [ERROR] {} [FILE] {} [SCHEMA] {}",
            reason,
            display_path(&u.instance).display(),
            u.schema_id
        );
    }

    if report.cancelled {
        out.push_str("FAIL | [ERROR] validation was cancelled\n");
    }

    if success {
        out.push_str("ALL SCHEMA VALIDATION CHECKS PASSED\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use enforcer_core::{DocumentPath, PathSegment, SchemaId};
    use enforcer_schema::{LoadErrorKind, Outcome, UnresolvedReference, ValidationError, ValidationResult};
    use std::path::PathBuf;

    fn result(outcome: Outcome, errors: Vec<ValidationError>) -> ValidationResult {
        ValidationResult {
            schema_id: SchemaId::from("schemas/dns_servers"),
            instance: PathBuf::from("/nowhere/hostvars/router1/dns.yml"),
            outcome,
            errors,
        }
    }

    #[test]
    fn failures_are_listed_per_error() {
        let report = ValidationReport {
            results: vec![result(
                Outcome::Fail,
                vec![ValidationError {
                    path: DocumentPath(vec![PathSegment::Key("dns_servers".into()), PathSegment::Index(0)]),
                    message: "\"address\" is a required property".into(),
                    schema_path: String::new(),
                }],
            )],
            ..ValidationReport::default()
        };
        let text = render_text(&[], &report, false, false);
        assert_eq!(
            text,
            "FAIL | [ERROR] \"address\" is a required property [FILE] /nowhere/hostvars/router1/dns.yml \
             [PROPERTY] dns_servers[0] [SCHEMA] schemas/dns_servers\n"
        );
    }

    #[test]
    fn passes_are_hidden_unless_requested() {
        let report = ValidationReport {
            results: vec![result(Outcome::Pass, Vec::new())],
            ..ValidationReport::default()
        };
        let quiet = render_text(&[], &report, false, true);
        assert_eq!(quiet, "ALL SCHEMA VALIDATION CHECKS PASSED\n");
        let loud = render_text(&[], &report, true, true);
        assert!(loud.starts_with("PASS | [SCHEMA] schemas/dns_servers | [FILE] "));
    }

    #[test]
    fn load_errors_and_unresolved_references_are_failures() {
        let report = ValidationReport {
            unresolved: vec![UnresolvedReference {
                instance: PathBuf::from("/nowhere/dns.yml"),
                schema_id: SchemaId::from("schemas/missing"),
                reason: UnresolvedReason::NotFound,
            }],
            ..ValidationReport::default()
        };
        let load = [LoadError::new("/nowhere/bad.json", LoadErrorKind::Parse, "expected value")];
        let text = render_text(&load, &report, false, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("FAIL | [LOAD] expected value"));
        assert!(lines[1].contains("schema not found"));
        assert!(!text.contains("PASSED"));
    }
}
