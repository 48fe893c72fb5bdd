//! # enforcer-schema: The Schema Manager
//!
//! Validates configuration instance documents against JSON Schema
//! definitions, and tests the schemas themselves against author-supplied
//! pass/fail fixtures.
//!
//! ## Components
//!
//! - [`store`]: discovers schema files under the schema root, parses and
//!   compiles them once, keyed by a path-derived [`SchemaId`].
//! - [`matcher`]: decides which schemas apply to an instance: explicit
//!   mapping (configured rules and inline tags) first and exclusively,
//!   convention matching on `x-applies-to` keys otherwise.
//! - [`validate`]: runs one compiled schema against one document and
//!   returns every violation, located and in document order.
//! - [`fixtures`]: runs a schema's `pass` and `fail` fixtures and reports
//!   mismatches in either direction.
//! - [`manager`]: [`SchemaManager`], composing the above into the
//!   validate-all and test-schemas workflows plus [`summarize`].
//!
//! ## Crate Policy
//!
//! - Per-unit failures (one schema, one instance, one fixture) are data.
//!   Only run-level misconfiguration is returned as `Err`.
//! - Nothing here prints or exits; callers render the structured results.
//!
//! [`SchemaId`]: enforcer_core::SchemaId

pub mod cancel;
pub mod fixtures;
pub mod manager;
pub mod matcher;
pub mod store;
pub mod validate;

pub use cancel::CancellationToken;
pub use fixtures::{Expectation, FixtureTestResult};
pub use manager::{
    summarize, ManagerError, SchemaListing, SchemaManager, SchemaTestReport, UnresolvedReason,
    UnresolvedReference, ValidationReport,
};
pub use matcher::{MappingRules, MatchResolution, MatchStrategy};
pub use store::{LoadError, LoadErrorKind, Schema, SchemaStore, StoreError, APPLIES_TO_KEY};
pub use validate::{validate, Outcome, ValidationError, ValidationResult};
