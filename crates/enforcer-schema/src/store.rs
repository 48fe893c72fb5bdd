//! # Schema Store
//!
//! Discovers schema definition files under the schema root, parses each
//! into a `serde_json::Value` tree and compiles it once into a reusable
//! validator.
//!
//! ## Identifiers
//!
//! A schema's identifier is its path relative to the schema root with the
//! extension stripped (`schemas/dns_servers.yml` → `schemas/dns_servers`).
//! Two files normalizing to the same identifier abort the whole load with
//! [`StoreError::DuplicateSchemaIdentifier`].
//!
//! ## Partial failure
//!
//! Unreadable subdirectories, unparsable files and schemas that fail to
//! compile are recorded as [`LoadError`]s and the load continues. A schema
//! that parsed but did not compile stays in the store (for listing and
//! error reporting) but is not runnable.
//!
//! ## Reference resolution
//!
//! Every parsed schema and every document under the definitions directory
//! is registered with a local retriever, so `$ref`s across documents
//! resolve without network access. Lookup keys are the identifier, the
//! relative file path, and the document's own `$id`. A schema without an
//! `$id` is compiled at `json-schema:///<path relative to the root>`, so a
//! relative `$ref` is read from the schema file's own directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use enforcer_core::{Document, SchemaId, Settings};
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Reserved top-level schema key naming the instance keys a schema governs.
pub const APPLIES_TO_KEY: &str = "x-applies-to";

/// Base URI the validator assigns to documents without an absolute `$id`.
const DEFAULT_BASE_URI: &str = "json-schema:///";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal store build failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The schema root does not exist or is not a directory.
    #[error("schema root not found: {path}")]
    RootNotFound {
        /// The configured schema root.
        path: String,
    },

    /// The schema root exists but cannot be listed.
    #[error("cannot read schema root {path}: {source}")]
    RootUnreadable {
        /// The configured schema root.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Two schema files normalize to the same identifier.
    #[error("duplicate schema identifier {schema_id}: {first} and {second}")]
    DuplicateSchemaIdentifier {
        /// The colliding identifier.
        schema_id: SchemaId,
        /// First file (in sorted path order).
        first: String,
        /// Second file.
        second: String,
    },
}

/// What went wrong with a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorKind {
    /// A directory below the root could not be listed.
    Unreadable,
    /// The file is not valid YAML or JSON.
    Parse,
    /// The schema parsed but could not be compiled into a validator.
    Compile,
    /// A schema path that cannot be turned into an identifier.
    Identifier,
    /// An instance document or fixture could not be loaded.
    Instance,
}

/// Non-fatal, per-file load failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadError {
    /// File or directory concerned.
    pub path: PathBuf,
    /// Failure category.
    pub kind: LoadErrorKind,
    /// Human-readable reason.
    pub message: String,
}

impl LoadError {
    /// Build a load error for `path`.
    pub fn new(path: impl Into<PathBuf>, kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

enum Compiled {
    Ready(Validator),
    Invalid(String),
}

/// One loaded schema definition.
pub struct Schema {
    id: SchemaId,
    source: PathBuf,
    definition: Value,
    applies_to: BTreeSet<String>,
    compiled: Compiled,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("applies_to", &self.applies_to)
            .field("runnable", &self.is_runnable())
            .finish()
    }
}

impl Schema {
    /// Compile `definition` into a schema.
    ///
    /// `resolver` supplies cross-document `$ref` targets. Compilation failure
    /// yields a non-runnable schema carrying the reason.
    pub fn compile(
        id: SchemaId,
        source: PathBuf,
        definition: Value,
        automap: bool,
        validate_formats: bool,
        resolver: &ReferenceResolver,
    ) -> Self {
        Self::compile_at(id, source, definition, None, automap, validate_formats, resolver)
    }

    /// Like [`Schema::compile`], resolving relative `$ref`s against
    /// `base_uri` (the schema's own location) unless the definition
    /// declares its own identifier.
    pub fn compile_at(
        id: SchemaId,
        source: PathBuf,
        definition: Value,
        base_uri: Option<&str>,
        automap: bool,
        validate_formats: bool,
        resolver: &ReferenceResolver,
    ) -> Self {
        let applies_to = declared_applies_to(&definition, automap);
        let mut opts = jsonschema::options();
        opts.should_validate_formats(validate_formats);
        opts.with_retriever(resolver.clone());
        let built = match base_uri.and_then(|base| with_base_uri(&definition, base)) {
            Some(anchored) => opts.build(&anchored),
            None => opts.build(&definition),
        };
        let compiled = match built {
            Ok(validator) => Compiled::Ready(validator),
            Err(e) => Compiled::Invalid(e.to_string()),
        };
        Self {
            id,
            source,
            definition,
            applies_to,
            compiled,
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> &SchemaId {
        &self.id
    }

    /// File the schema was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Parsed definition.
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// Top-level instance keys this schema claims authority over.
    pub fn applies_to(&self) -> &BTreeSet<String> {
        &self.applies_to
    }

    /// The compiled validator, `None` for schemas that failed to compile.
    pub fn validator(&self) -> Option<&Validator> {
        match &self.compiled {
            Compiled::Ready(v) => Some(v),
            Compiled::Invalid(_) => None,
        }
    }

    /// Compilation failure reason, if any.
    pub fn compile_error(&self) -> Option<&str> {
        match &self.compiled {
            Compiled::Ready(_) => None,
            Compiled::Invalid(reason) => Some(reason),
        }
    }

    /// Whether the schema compiled and can validate documents.
    pub fn is_runnable(&self) -> bool {
        matches!(self.compiled, Compiled::Ready(_))
    }
}

/// Copy of `definition` carrying `base` as its identifier, or `None` when
/// the definition is not an object or already names itself. Draft 4 spells
/// the keyword `id`.
fn with_base_uri(definition: &Value, base: &str) -> Option<Value> {
    let map = definition.as_object()?;
    if map.contains_key("$id") || map.contains_key("id") {
        return None;
    }
    let draft4 = map
        .get("$schema")
        .and_then(Value::as_str)
        .is_some_and(|uri| uri.contains("draft-04"));
    let keyword = if draft4 { "id" } else { "$id" };
    let mut anchored = map.clone();
    anchored.insert(keyword.to_string(), Value::String(base.to_string()));
    Some(Value::Object(anchored))
}

/// Characters usable verbatim in a URI path. Schemas whose relative path
/// needs escaping keep the default base.
fn is_uri_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '/')
}

/// Applies-to set: explicit `x-applies-to` (string or list of strings), or
/// with `automap` the top-level `properties` keys.
fn declared_applies_to(definition: &Value, automap: bool) -> BTreeSet<String> {
    match definition.get(APPLIES_TO_KEY) {
        Some(Value::String(key)) => BTreeSet::from([key.clone()]),
        Some(Value::Array(keys)) => keys
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => BTreeSet::new(),
        None if automap => definition
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default(),
        None => BTreeSet::new(),
    }
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Resolves `$ref` URIs to documents loaded from disk.
///
/// Keeps the validator from making network requests: anything not found
/// here is an error, which makes the referring schema non-runnable.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    documents: Arc<HashMap<String, Value>>,
}

impl ReferenceResolver {
    fn new(documents: HashMap<String, Value>) -> Self {
        Self {
            documents: Arc::new(documents),
        }
    }

    fn lookup(&self, uri: &str) -> Option<&Value> {
        if let Some(v) = self.documents.get(uri) {
            return Some(v);
        }
        let path = uri
            .strip_prefix(DEFAULT_BASE_URI)
            .unwrap_or(uri)
            .trim_start_matches('/');
        if let Some(v) = self.documents.get(path) {
            return Some(v);
        }
        let stem = Path::new(path).with_extension("");
        self.documents.get(stem.to_str()?)
    }
}

impl jsonschema::Retrieve for ReferenceResolver {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        self.lookup(uri_str)
            .cloned()
            .ok_or_else(|| format!("unresolved reference: {uri_str}").into())
    }
}

// ---------------------------------------------------------------------------
// SchemaStore
// ---------------------------------------------------------------------------

/// All schemas of one run, keyed and iterated by identifier.
#[derive(Debug, Default)]
pub struct SchemaStore {
    root: PathBuf,
    schemas: BTreeMap<SchemaId, Schema>,
}

impl SchemaStore {
    /// Load every schema under `settings.main_directory`.
    ///
    /// Returns the store and the non-fatal load errors, in path order.
    ///
    /// # Errors
    ///
    /// [`StoreError::RootNotFound`] / [`StoreError::RootUnreadable`] when the
    /// root itself is unusable; [`StoreError::DuplicateSchemaIdentifier`] when
    /// two files normalize to the same identifier.
    pub fn load(settings: &Settings) -> Result<(Self, Vec<LoadError>), StoreError> {
        let root = settings.main_directory.clone();
        if !root.is_dir() {
            return Err(StoreError::RootNotFound {
                path: root.display().to_string(),
            });
        }
        std::fs::read_dir(&root).map_err(|source| StoreError::RootUnreadable {
            path: root.display().to_string(),
            source,
        })?;

        let mut errors = Vec::new();
        let skip = [settings.definitions_dir(), settings.tests_dir()];

        let mut files = Vec::new();
        walk_files(&root, &skip, &|p: &Path| settings.is_schema_file(p), &mut files, &mut errors);
        files.sort();

        // Identity first: duplicates fail the build regardless of content.
        let mut by_id: BTreeMap<SchemaId, PathBuf> = BTreeMap::new();
        for path in files {
            let Some(id) = SchemaId::from_relative_path(&root, &path) else {
                errors.push(LoadError::new(
                    &path,
                    LoadErrorKind::Identifier,
                    "path cannot be expressed as a schema identifier",
                ));
                continue;
            };
            if let Some(first) = by_id.get(&id) {
                return Err(StoreError::DuplicateSchemaIdentifier {
                    schema_id: id,
                    first: first.display().to_string(),
                    second: path.display().to_string(),
                });
            }
            by_id.insert(id, path);
        }

        let mut parsed: Vec<(SchemaId, PathBuf, Value)> = Vec::new();
        for (id, path) in by_id {
            match Document::load(&path) {
                Ok(doc) => parsed.push((id, path, doc.content)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparsable schema");
                    errors.push(LoadError::new(&path, LoadErrorKind::Parse, e.to_string()));
                }
            }
        }

        let mut documents: HashMap<String, Value> = HashMap::new();
        for (id, path, value) in &parsed {
            register_document(&mut documents, &root, path, value);
            documents.insert(id.to_string(), value.clone());
        }
        let definitions_dir = settings.definitions_dir();
        if definitions_dir.is_dir() {
            let mut definition_files = Vec::new();
            walk_files(
                &definitions_dir,
                &[],
                &|p: &Path| settings.is_schema_file(p),
                &mut definition_files,
                &mut errors,
            );
            definition_files.sort();
            for path in definition_files {
                match Document::load(&path) {
                    Ok(doc) => register_document(&mut documents, &root, &path, &doc.content),
                    Err(e) => errors.push(LoadError::new(&path, LoadErrorKind::Parse, e.to_string())),
                }
            }
        }
        let resolver = ReferenceResolver::new(documents);

        let mut schemas = BTreeMap::new();
        for (id, path, value) in parsed {
            let base_uri = path
                .strip_prefix(&root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                .filter(|rel| rel.chars().all(is_uri_path_char))
                .map(|rel| format!("{DEFAULT_BASE_URI}{rel}"));
            let schema = Schema::compile_at(
                id.clone(),
                path,
                value,
                base_uri.as_deref(),
                settings.data_file_automap,
                settings.validate_formats,
                &resolver,
            );
            if let Some(reason) = schema.compile_error() {
                tracing::warn!(schema_id = %id, reason, "schema failed to compile");
                errors.push(LoadError::new(schema.source(), LoadErrorKind::Compile, reason));
            } else {
                tracing::debug!(schema_id = %id, "loaded schema");
            }
            schemas.insert(id, schema);
        }

        tracing::info!(
            schema_count = schemas.len(),
            load_errors = errors.len(),
            root = %root.display(),
            "schema store built"
        );
        Ok((Self { root, schemas }, errors))
    }

    /// Load the schemas under `root` with otherwise default settings.
    pub fn load_dir(root: impl Into<PathBuf>) -> Result<(Self, Vec<LoadError>), StoreError> {
        let settings = Settings {
            main_directory: root.into(),
            ..Settings::default()
        };
        Self::load(&settings)
    }

    /// Schema root this store was loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a schema by identifier, runnable or not.
    pub fn get(&self, id: &SchemaId) -> Option<&Schema> {
        self.schemas.get(id)
    }

    /// Runnable schemas in lexicographic identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&SchemaId, &Schema)> + '_ {
        self.schemas.iter().filter(|(_, s)| s.is_runnable())
    }

    /// Every loaded schema, including those that failed to compile.
    pub fn iter_all(&self) -> impl Iterator<Item = (&SchemaId, &Schema)> + '_ {
        self.schemas.iter()
    }

    /// Number of loaded schemas, runnable or not.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the store holds no schemas.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Register `value` under its root-relative path, that path without
/// extension, and its own `$id`.
fn register_document(documents: &mut HashMap<String, Value>, root: &Path, path: &Path, value: &Value) {
    if let Ok(rel) = path.strip_prefix(root) {
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        documents.insert(rel_str, value.clone());
        if let Some(stem) = rel.with_extension("").to_str() {
            documents.insert(stem.replace('\\', "/"), value.clone());
        }
    }
    if let Some(id) = value.get("$id").and_then(Value::as_str) {
        documents.insert(id.to_string(), value.clone());
    }
}

/// Recursively collect files accepted by `accept`, skipping `skip` subtrees
/// and dot-directories. Unreadable directories become load errors.
pub(crate) fn walk_files(
    dir: &Path,
    skip: &[PathBuf],
    accept: &dyn Fn(&Path) -> bool,
    acc: &mut Vec<PathBuf>,
    errors: &mut Vec<LoadError>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory");
            errors.push(LoadError::new(dir, LoadErrorKind::Unreadable, e.to_string()));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden || skip.iter().any(|s| same_location(s, &path)) {
                continue;
            }
            walk_files(&path, skip, accept, acc, errors);
        } else if accept(&path) {
            acc.push(path);
        }
    }
}

/// Lexical path equality ignoring `.` components, so `./schema` and
/// `schema` name the same directory.
fn same_location(a: &Path, b: &Path) -> bool {
    fn significant(p: &Path) -> impl Iterator<Item = Component<'_>> {
        p.components().filter(|c| !matches!(c, Component::CurDir))
    }
    significant(a).eq(significant(b))
}
