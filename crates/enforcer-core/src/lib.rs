//! # enforcer-core: Foundational Types for schema-enforcer
//!
//! Leaf crate of the workspace. Everything the Schema Manager consumes but
//! does not own lives here:
//!
//! - [`Settings`]: the immutable run configuration (schema root, search
//!   directories, explicit schema mapping). Built once, passed by reference.
//! - [`SchemaId`]: newtype for schema identifiers, derived from the schema
//!   file path relative to the schema root.
//! - [`document`]: YAML/JSON document loading into a `serde_json::Value`
//!   tree, inline `# jsonschema:` tags, and [`DocumentPath`] locations.
//! - [`error`]: structured error enums for settings and documents.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `enforcer-*` crates.
//! - No `.unwrap()` outside tests.

pub mod document;
pub mod error;
pub mod identity;
pub mod settings;

pub use document::{Document, DocumentFormat, DocumentPath, PathSegment};
pub use error::{DocumentError, SettingsError};
pub use identity::SchemaId;
pub use settings::Settings;
