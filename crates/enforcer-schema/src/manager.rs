//! # Schema Manager
//!
//! Composes the store, matcher, validator and fixture tester behind the
//! workflows a front end needs:
//!
//! - [`SchemaManager::validate_all`]: match and validate instance documents.
//! - [`SchemaManager::test_schemas`]: run every schema's fixtures.
//! - [`summarize`]: one pass/fail verdict over everything.
//!
//! Loading is single-threaded so duplicate detection is deterministic. The
//! two workflows fan out one task per (instance, schema) or (schema,
//! fixture) pair on the rayon pool; results come back in input order.
//! Cancellation is honoured between pairs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use enforcer_core::{Document, SchemaId, Settings, SettingsError};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::fixtures::{self, Fixture, FixtureError, FixtureTestResult};
use crate::matcher::{self, MappingRules};
use crate::store::{walk_files, LoadError, LoadErrorKind, Schema, SchemaStore, StoreError};
use crate::validate::{validate, ValidationResult};

/// Run-level failures. Everything per-unit is reported as data instead.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Settings name a missing schema root or search directory.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The schema store could not be built.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A schema identifier given by the caller is not in the store.
    #[error("schema not found: {0}")]
    SchemaNotFound(SchemaId),

    /// Writing fixture expectations failed.
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Why an explicitly referenced schema could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No schema with that identifier was loaded.
    NotFound,
    /// The schema loaded but failed to compile.
    NotRunnable,
}

/// An instance that names a schema the store cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    /// Instance document.
    pub instance: PathBuf,
    /// Schema it asked for.
    pub schema_id: SchemaId,
    /// Why it could not be applied.
    pub reason: UnresolvedReason,
}

/// Everything produced by one validate-all pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// One result per (instance, schema) pair, instances in input order,
    /// schemas in identifier order.
    pub results: Vec<ValidationResult>,
    /// Instances no schema applied to. Informational.
    pub unmatched: Vec<PathBuf>,
    /// Explicit references to unknown or non-runnable schemas.
    pub unresolved: Vec<UnresolvedReference>,
    /// Instance documents that could not be loaded.
    pub instance_errors: Vec<LoadError>,
    /// Whether cancellation cut the pass short.
    pub cancelled: bool,
}

impl ValidationReport {
    /// Whether nothing in this report fails the run.
    pub fn is_clean(&self) -> bool {
        !self.cancelled
            && self.unresolved.is_empty()
            && self.instance_errors.is_empty()
            && self.results.iter().all(ValidationResult::passed)
    }
}

/// Everything produced by one test-schemas pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaTestReport {
    /// One result per (schema, fixture) pair, schemas in identifier order.
    pub results: Vec<FixtureTestResult>,
    /// Runnable schemas without any fixture. Not a pass.
    pub untested: Vec<SchemaId>,
    /// Fixture trees that could not be read.
    pub fixture_errors: Vec<LoadError>,
    /// Whether cancellation cut the pass short.
    pub cancelled: bool,
}

impl SchemaTestReport {
    /// Whether nothing in this report fails the run.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.fixture_errors.is_empty() && self.results.iter().all(|r| r.matches)
    }

    /// Schemas whose fixtures all matched, in identifier order.
    pub fn self_consistent(&self) -> Vec<&SchemaId> {
        let failing: BTreeSet<&SchemaId> = self
            .results
            .iter()
            .filter(|r| !r.matches)
            .map(|r| &r.schema_id)
            .collect();
        let tested: BTreeSet<&SchemaId> = self.results.iter().map(|r| &r.schema_id).collect();
        tested.difference(&failing).copied().collect()
    }
}

/// One row of the schema listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaListing {
    /// Identifier.
    pub schema_id: SchemaId,
    /// Source file.
    pub source: PathBuf,
    /// Declared (or automapped) applies-to keys.
    pub applies_to: Vec<String>,
    /// Whether the schema compiled.
    pub runnable: bool,
}

/// Overall verdict: success iff there are no load errors, every validation
/// passed, and every fixture matched its expectation.
pub fn summarize(
    load_errors: &[LoadError],
    validations: &[ValidationResult],
    fixture_results: &[FixtureTestResult],
) -> bool {
    load_errors.is_empty()
        && validations.iter().all(ValidationResult::passed)
        && fixture_results.iter().all(|r| r.matches)
}

/// The Schema Manager.
#[derive(Debug)]
pub struct SchemaManager {
    settings: Settings,
    store: SchemaStore,
    load_errors: Vec<LoadError>,
    rules: MappingRules,
}

impl SchemaManager {
    /// Check the settings and build the schema store.
    ///
    /// # Errors
    ///
    /// Fails before any validation work when the schema root or a search
    /// directory is missing, or when schema identifiers collide.
    pub fn load(settings: &Settings) -> Result<Self, ManagerError> {
        settings.check()?;
        let (store, load_errors) = SchemaStore::load(settings)?;
        Ok(Self {
            settings: settings.clone(),
            store,
            load_errors,
            rules: MappingRules::from_settings(settings),
        })
    }

    /// Settings the manager was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The schema store.
    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Non-fatal errors from building the store.
    pub fn load_errors(&self) -> &[LoadError] {
        &self.load_errors
    }

    /// Runnable schemas in identifier order.
    pub fn iter_schemas(&self) -> impl Iterator<Item = (&SchemaId, &Schema)> + '_ {
        self.store.iter()
    }

    /// Every loaded schema as a listing row, in identifier order.
    pub fn schema_listing(&self) -> Vec<SchemaListing> {
        self.store
            .iter_all()
            .map(|(id, schema)| SchemaListing {
                schema_id: id.clone(),
                source: schema.source().to_path_buf(),
                applies_to: schema.applies_to().iter().cloned().collect(),
                runnable: schema.is_runnable(),
            })
            .collect()
    }

    /// Instance documents under the search directories, sorted, skipping
    /// the schema root and dot-directories.
    pub fn discover_instances(&self) -> (Vec<PathBuf>, Vec<LoadError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        let skip = [self.settings.main_directory.clone()];
        for dir in &self.settings.data_file_search_directories {
            walk_files(
                dir,
                &skip,
                &|p: &Path| self.settings.is_data_file(p),
                &mut files,
                &mut errors,
            );
        }
        files.sort();
        files.dedup();
        tracing::debug!(count = files.len(), "discovered instance documents");
        (files, errors)
    }

    /// Load instance documents; unparsable ones become load errors.
    pub fn load_instances(&self, paths: &[PathBuf]) -> (Vec<Document>, Vec<LoadError>) {
        let mut documents = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();
        for path in paths {
            match Document::load(path) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparsable instance");
                    errors.push(LoadError::new(path, LoadErrorKind::Instance, e.to_string()));
                }
            }
        }
        (documents, errors)
    }

    /// Discover, load and validate every instance under the search directories.
    pub fn validate_discovered(&self, cancel: &CancellationToken) -> ValidationReport {
        let (paths, mut errors) = self.discover_instances();
        let (documents, load_errors) = self.load_instances(&paths);
        errors.extend(load_errors);
        let mut report = self.validate_all(&documents, cancel);
        report.instance_errors.extend(errors);
        report
    }

    /// Resolve and run the applicable schemas for each instance.
    pub fn validate_all(&self, instances: &[Document], cancel: &CancellationToken) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut pairs: Vec<(&Document, &Schema)> = Vec::new();

        for doc in instances {
            let resolution = matcher::resolve(
                &doc.path,
                &doc.top_level_keys(),
                &doc.tags,
                &self.rules,
                &self.settings.data_file_search_directories,
                &self.store,
            );
            if resolution.schema_ids.is_empty() {
                tracing::info!(instance = %doc.path.display(), "no schema applies");
                report.unmatched.push(doc.path.clone());
                continue;
            }
            for id in resolution.schema_ids {
                match self.store.get(&id) {
                    Some(schema) if schema.is_runnable() => pairs.push((doc, schema)),
                    found => report.unresolved.push(UnresolvedReference {
                        instance: doc.path.clone(),
                        reason: if found.is_some() {
                            UnresolvedReason::NotRunnable
                        } else {
                            UnresolvedReason::NotFound
                        },
                        schema_id: id,
                    }),
                }
            }
        }

        let outcomes: Vec<Option<ValidationResult>> = pairs
            .par_iter()
            .map(|(doc, schema)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(validate(schema, &doc.path, &doc.content))
            })
            .collect();
        report.cancelled = outcomes.iter().any(Option::is_none);
        report.results = outcomes.into_iter().flatten().collect();

        tracing::info!(
            instances = instances.len(),
            results = report.results.len(),
            failed = report.results.iter().filter(|r| !r.passed()).count(),
            unmatched = report.unmatched.len(),
            unresolved = report.unresolved.len(),
            cancelled = report.cancelled,
            "validation pass complete"
        );
        report
    }

    /// Run the fixtures of every runnable schema.
    pub fn test_schemas(&self, cancel: &CancellationToken) -> SchemaTestReport {
        self.run_fixtures(self.store.iter().map(|(_, s)| s).collect(), cancel)
    }

    /// Run the fixtures of a single schema.
    pub fn test_schema(&self, id: &SchemaId, cancel: &CancellationToken) -> Result<SchemaTestReport, ManagerError> {
        let schema = self.runnable(id)?;
        Ok(self.run_fixtures(vec![schema], cancel))
    }

    /// Record current error records as the expectation of every fail case
    /// directory of `id`. Returns the files written.
    pub fn generate_invalid_expected(&self, id: &SchemaId) -> Result<Vec<PathBuf>, ManagerError> {
        let schema = self.runnable(id)?;
        let dir = fixtures::fixtures_dir_for(&self.settings.tests_dir(), id);
        Ok(fixtures::generate_expected(schema, &dir)?)
    }

    /// Overall verdict over this manager's load errors and the given reports.
    pub fn summarize(&self, validation: Option<&ValidationReport>, tests: Option<&SchemaTestReport>) -> bool {
        let validations = validation.map(|r| r.results.as_slice()).unwrap_or_default();
        let fixture_results = tests.map(|r| r.results.as_slice()).unwrap_or_default();
        summarize(&self.load_errors, validations, fixture_results)
            && validation.map_or(true, ValidationReport::is_clean)
            && tests.map_or(true, SchemaTestReport::is_clean)
    }

    fn runnable(&self, id: &SchemaId) -> Result<&Schema, ManagerError> {
        self.store
            .get(id)
            .filter(|s| s.is_runnable())
            .ok_or_else(|| ManagerError::SchemaNotFound(id.clone()))
    }

    fn run_fixtures(&self, schemas: Vec<&Schema>, cancel: &CancellationToken) -> SchemaTestReport {
        let tests_dir = self.settings.tests_dir();
        let mut report = SchemaTestReport::default();
        let mut pairs: Vec<(&Schema, Fixture)> = Vec::new();

        for schema in schemas {
            let dir = fixtures::fixtures_dir_for(&tests_dir, schema.id());
            let (found, errors) = fixtures::discover(&dir);
            report.fixture_errors.extend(errors);
            if found.is_empty() {
                tracing::info!(schema_id = %schema.id(), "schema has no fixtures");
                report.untested.push(schema.id().clone());
                continue;
            }
            pairs.extend(found.into_iter().map(|f| (schema, f)));
        }

        let outcomes: Vec<Option<Result<FixtureTestResult, LoadError>>> = pairs
            .par_iter()
            .map(|(schema, fixture)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(fixtures::run_fixture(schema, fixture))
            })
            .collect();
        report.cancelled = outcomes.iter().any(Option::is_none);
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(e) => report.fixture_errors.push(e),
            }
        }

        tracing::info!(
            fixtures = report.results.len(),
            mismatched = report.results.iter().filter(|r| !r.matches).count(),
            untested = report.untested.len(),
            cancelled = report.cancelled,
            "schema test pass complete"
        );
        report
    }
}
