//! # Fixture Tester
//!
//! Tests a schema against documents written to exercise it. Fixtures live
//! under `<test_directory>/<schema id>/`:
//!
//! ```text
//! tests/schemas/dns_servers/
//!   pass/                      expected to validate
//!     single_server.yml
//!   fail/                      expected to be rejected
//!     missing_address.yml
//!     bad_ip/                  case directory
//!       data.yml
//!       results.yml            optional expected error records
//! ```
//!
//! A `pass` fixture that fails means the schema is too strict (or the
//! fixture is stale). A `fail` fixture that passes means the schema is too
//! permissive. When a fail case carries a results file, the actual error
//! records (path and message) must also equal the recorded ones.

use std::fmt;
use std::path::{Path, PathBuf};

use enforcer_core::{Document, DocumentError, DocumentFormat, SchemaId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{walk_files, LoadError, LoadErrorKind, Schema};
use crate::validate::{validate, Outcome, ValidationError};

/// Directory of expected-valid fixtures.
pub const PASS_DIR: &str = "pass";
/// Directory of expected-invalid fixtures.
pub const FAIL_DIR: &str = "fail";
/// Stem of the document inside a fail case directory.
pub const CASE_DATA_STEM: &str = "data";
/// Stem of the expected-results file inside a fail case directory.
pub const CASE_RESULTS_STEM: &str = "results";

const DOCUMENT_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

/// What a fixture is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Under `pass/`.
    Valid,
    /// Under `fail/`.
    Invalid,
}

impl Expectation {
    /// The validation outcome that satisfies this expectation.
    pub fn outcome(self) -> Outcome {
        match self {
            Self::Valid => Outcome::Pass,
            Self::Invalid => Outcome::Fail,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}

/// One discovered fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    /// The document to validate.
    pub path: PathBuf,
    /// Group the fixture was found in.
    pub expected: Expectation,
    /// Case directory, for fail fixtures laid out as `fail/<case>/data.*`.
    pub case_dir: Option<PathBuf>,
    /// Recorded error records, for case directories that have one.
    pub results_file: Option<PathBuf>,
}

/// Outcome of running one fixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureTestResult {
    /// Schema under test.
    pub schema_id: SchemaId,
    /// Fixture document.
    pub fixture: PathBuf,
    /// Expected outcome, from the fixture's group.
    pub expected: Expectation,
    /// What validation actually produced.
    pub actual: Outcome,
    /// Whether `actual` satisfied `expected` (and recorded results, if any).
    pub matches: bool,
    /// Error records produced by validation.
    pub errors: Vec<ValidationError>,
    /// Why the fixture did not match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Recorded error records of a fail case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedResults {
    /// Expected errors in document order.
    pub results: Vec<ValidationError>,
}

/// Failure while writing expected results.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Reading the fixture document failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The results file could not be written.
    #[error("cannot write {path}: {source}")]
    Write {
        /// Results file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The results could not be serialized.
    #[error("cannot serialize results for {path}: {reason}")]
    Serialize {
        /// Results file path.
        path: String,
        /// Serializer message.
        reason: String,
    },
}

/// Fixture directory of a schema.
pub fn fixtures_dir_for(tests_dir: &Path, schema_id: &SchemaId) -> PathBuf {
    schema_id
        .as_str()
        .split('/')
        .fold(tests_dir.to_path_buf(), |dir, part| dir.join(part))
}

fn is_document(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_some()
}

/// First `<stem>.{yml,yaml,json}` present in `dir`.
fn find_with_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    DOCUMENT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Discover the fixtures under a schema's fixture directory, sorted by path.
///
/// A missing fixture directory yields no fixtures and no errors.
pub fn discover(fixtures_dir: &Path) -> (Vec<Fixture>, Vec<LoadError>) {
    let mut fixtures = Vec::new();
    let mut errors = Vec::new();

    let pass_dir = fixtures_dir.join(PASS_DIR);
    if pass_dir.is_dir() {
        let mut files = Vec::new();
        walk_files(&pass_dir, &[], &is_document, &mut files, &mut errors);
        files.sort();
        fixtures.extend(files.into_iter().map(|path| Fixture {
            path,
            expected: Expectation::Valid,
            case_dir: None,
            results_file: None,
        }));
    }

    let fail_dir = fixtures_dir.join(FAIL_DIR);
    if fail_dir.is_dir() {
        match std::fs::read_dir(&fail_dir) {
            Ok(entries) => {
                let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
                paths.sort();
                for path in paths {
                    if path.is_dir() {
                        match find_with_stem(&path, CASE_DATA_STEM) {
                            Some(data) => fixtures.push(Fixture {
                                path: data,
                                expected: Expectation::Invalid,
                                results_file: find_with_stem(&path, CASE_RESULTS_STEM),
                                case_dir: Some(path),
                            }),
                            None => errors.push(LoadError::new(
                                &path,
                                LoadErrorKind::Instance,
                                format!("fail case has no {CASE_DATA_STEM}.yml/.yaml/.json document"),
                            )),
                        }
                    } else if is_document(&path) {
                        fixtures.push(Fixture {
                            path,
                            expected: Expectation::Invalid,
                            case_dir: None,
                            results_file: None,
                        });
                    }
                }
            }
            Err(e) => errors.push(LoadError::new(&fail_dir, LoadErrorKind::Unreadable, e.to_string())),
        }
    }

    (fixtures, errors)
}

/// Run one fixture against `schema`.
///
/// A fixture document that cannot be loaded is never validated; it comes
/// back as a [`LoadError`] instead of a result.
pub fn run_fixture(schema: &Schema, fixture: &Fixture) -> Result<FixtureTestResult, LoadError> {
    let doc = Document::load(&fixture.path).map_err(|e| {
        tracing::warn!(fixture = %fixture.path.display(), error = %e, "cannot load fixture");
        LoadError::new(&fixture.path, LoadErrorKind::Instance, format!("cannot load fixture: {e}"))
    })?;
    let result = validate(schema, &fixture.path, &doc.content);

    let mut matches = result.outcome == fixture.expected.outcome();
    let mut detail = match (fixture.expected, matches) {
        (_, true) => None,
        (Expectation::Valid, false) => {
            Some("schema rejects a pass fixture: too strict, or the fixture is stale".to_string())
        }
        (Expectation::Invalid, false) => {
            Some("schema accepts a fail fixture: too permissive, or a constraint is missing".to_string())
        }
    };

    if matches {
        if let Some(results_file) = &fixture.results_file {
            match load_expected(results_file) {
                Ok(expected) if same_records(&expected.results, &result.errors) => {}
                Ok(_) => {
                    matches = false;
                    detail = Some(format!(
                        "error records differ from {}",
                        results_file.display()
                    ));
                }
                Err(reason) => {
                    matches = false;
                    detail = Some(reason);
                }
            }
        }
    }

    tracing::debug!(
        schema_id = %schema.id(),
        fixture = %fixture.path.display(),
        expected = %fixture.expected,
        actual = %result.outcome,
        matches,
        "fixture checked"
    );
    Ok(FixtureTestResult {
        schema_id: result.schema_id,
        fixture: result.instance,
        expected: fixture.expected,
        actual: result.outcome,
        matches,
        errors: result.errors,
        detail,
    })
}

/// Run every fixture of `schema` found under `fixtures_dir`, sequentially.
///
/// Returns an empty result list when the schema has no fixtures; callers
/// report that as untested, not as a pass.
pub fn test_schema(schema: &Schema, fixtures_dir: &Path) -> (Vec<FixtureTestResult>, Vec<LoadError>) {
    let (fixtures, mut errors) = discover(fixtures_dir);
    let mut results = Vec::with_capacity(fixtures.len());
    for fixture in &fixtures {
        match run_fixture(schema, fixture) {
            Ok(result) => results.push(result),
            Err(e) => errors.push(e),
        }
    }
    (results, errors)
}

/// Record the current error records of every fail case directory of
/// `schema` into its results file (`results.yml` unless one exists).
///
/// Returns the files written.
pub fn generate_expected(schema: &Schema, fixtures_dir: &Path) -> Result<Vec<PathBuf>, FixtureError> {
    let (fixtures, _) = discover(fixtures_dir);
    let mut written = Vec::new();
    for fixture in fixtures {
        let Some(case_dir) = &fixture.case_dir else {
            continue;
        };
        let doc = Document::load(&fixture.path)?;
        let result = validate(schema, &fixture.path, &doc.content);
        let expected = ExpectedResults {
            results: result
                .errors
                .into_iter()
                .map(|e| ValidationError {
                    schema_path: String::new(),
                    ..e
                })
                .collect(),
        };
        let target = fixture
            .results_file
            .clone()
            .unwrap_or_else(|| case_dir.join(format!("{CASE_RESULTS_STEM}.yml")));
        let text = match DocumentFormat::from_path(&target) {
            Some(DocumentFormat::Json) => serde_json::to_string_pretty(&expected).map_err(|e| e.to_string()),
            _ => serde_yaml::to_string(&expected).map_err(|e| e.to_string()),
        }
        .map_err(|reason| FixtureError::Serialize {
            path: target.display().to_string(),
            reason,
        })?;
        std::fs::write(&target, text).map_err(|source| FixtureError::Write {
            path: target.display().to_string(),
            source,
        })?;
        tracing::info!(schema_id = %schema.id(), path = %target.display(), "wrote expected results");
        written.push(target);
    }
    Ok(written)
}

fn load_expected(path: &Path) -> Result<ExpectedResults, String> {
    let doc = Document::load(path).map_err(|e| format!("cannot load results file: {e}"))?;
    serde_json::from_value(doc.content)
        .map_err(|e| format!("invalid results file {}: {e}", path.display()))
}

/// Records are compared on path and message; schema paths are informational.
fn same_records(expected: &[ValidationError], actual: &[ValidationError]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| e.path == a.path && e.message == a.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SchemaStore;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    const NTP_SCHEMA: &str = r#"
type: object
properties:
  ntp_servers:
    type: array
    items:
      type: object
      properties:
        name: {type: string}
        address: {type: string, format: ipv4}
      required: [address]
required: [ntp_servers]
"#;

    fn ntp_store(root: &Path) -> SchemaStore {
        write(root, "schemas/ntp.yml", NTP_SCHEMA);
        let (store, errors) = SchemaStore::load_dir(root).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
        store
    }

    #[test]
    fn fixtures_dir_follows_identifier_components() {
        let dir = fixtures_dir_for(Path::new("/s/tests"), &SchemaId::from("schemas/ntp"));
        assert_eq!(dir, PathBuf::from("/s/tests/schemas/ntp"));
    }

    #[test]
    fn pass_and_fail_fixtures_match_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ntp_store(dir.path());
        let fixtures = dir.path().join("tests/schemas/ntp");
        write(&fixtures, "pass/valid_fixture.yml", "ntp_servers:\n  - address: 10.1.1.1\n");
        write(&fixtures, "fail/invalid_fixture.yml", "ntp_servers:\n  - name: x\n");

        let schema = store.get(&SchemaId::from("schemas/ntp")).unwrap();
        let (results, errors) = test_schema(schema, &fixtures);
        assert!(errors.is_empty());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.matches), "{results:?}");
        assert_eq!(results[0].expected, Expectation::Valid);
        assert_eq!(results[0].actual, Outcome::Pass);
        assert_eq!(results[1].expected, Expectation::Invalid);
        assert_eq!(results[1].actual, Outcome::Fail);
    }

    #[test]
    fn mismatches_are_reported_in_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ntp_store(dir.path());
        let fixtures = dir.path().join("tests/schemas/ntp");
        // Too strict: valid-looking data rejected.
        write(&fixtures, "pass/hostname.yml", "ntp_servers:\n  - address: ntp.example.com\n");
        // Too permissive: nothing forbids extra keys.
        write(&fixtures, "fail/extra_key.yml", "ntp_servers: []\nextra: true\n");

        let schema = store.get(&SchemaId::from("schemas/ntp")).unwrap();
        let (results, _) = test_schema(schema, &fixtures);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.matches));
        assert!(results[0].detail.as_deref().unwrap().contains("too strict"));
        assert!(results[1].detail.as_deref().unwrap().contains("too permissive"));
    }

    #[test]
    fn no_fixtures_yields_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = ntp_store(dir.path());
        let schema = store.get(&SchemaId::from("schemas/ntp")).unwrap();
        let (results, errors) = test_schema(schema, &dir.path().join("tests/schemas/ntp"));
        assert!(results.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn unparsable_fixture_is_a_load_error_not_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = ntp_store(dir.path());
        let fixtures = dir.path().join("tests/schemas/ntp");
        write(&fixtures, "fail/broken.json", "{ nope");
        write(&fixtures, "fail/missing_address.yml", "ntp_servers:\n  - name: x\n");
        let schema = store.get(&SchemaId::from("schemas/ntp")).unwrap();
        let (results, errors) = test_schema(schema, &fixtures);

        assert_eq!(results.len(), 1);
        assert!(results[0].matches);
        assert_eq!(results[0].fixture, fixtures.join("fail/missing_address.yml"));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, LoadErrorKind::Instance);
        assert_eq!(errors[0].path, fixtures.join("fail/broken.json"));
        assert!(errors[0].message.starts_with("cannot load fixture"));
    }

    #[test]
    fn case_directory_without_data_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = dir.path().join("tests/schemas/ntp");
        write(&fixtures, "fail/empty_case/notes.txt", "nothing here");
        let (found, errors) = discover(&fixtures);
        assert!(found.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, LoadErrorKind::Instance);
    }

    #[test]
    fn generated_results_are_then_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = ntp_store(dir.path());
        let fixtures = dir.path().join("tests/schemas/ntp");
        write(&fixtures, "fail/bad_ip/data.yml", "ntp_servers:\n  - address: 300.1.1.1\n");
        let schema = store.get(&SchemaId::from("schemas/ntp")).unwrap();

        let written = generate_expected(schema, &fixtures).unwrap();
        assert_eq!(written, vec![fixtures.join("fail/bad_ip/results.yml")]);

        let (results, _) = test_schema(schema, &fixtures);
        assert_eq!(results.len(), 1);
        assert!(results[0].matches, "{:?}", results[0]);

        // A recorded expectation that no longer holds is a mismatch.
        write(
            &fixtures,
            "fail/bad_ip/results.yml",
            "results:\n  - path: [ntp_servers]\n    message: something else\n",
        );
        let (results, _) = test_schema(schema, &fixtures);
        assert!(!results[0].matches);
        assert!(results[0].detail.as_deref().unwrap().contains("differ"));
    }
}
