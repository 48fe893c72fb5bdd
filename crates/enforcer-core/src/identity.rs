//! # Schema Identifiers
//!
//! A [`SchemaId`] names one schema inside a schema store. It is derived from
//! the schema file's path relative to the schema root, with the extension
//! removed and components joined by `/`, so `schema/schemas/ntp.yml` under
//! root `schema/` becomes `schemas/ntp` on every platform.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stable identifier of a schema within a schema store.
///
/// Ordering is lexicographic on the identifier string; the store and the
/// matcher rely on it for deterministic iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub String);

impl SchemaId {
    /// Wrap an identifier string as given (e.g. from a mapping rule).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier of `path` relative to `root`.
    ///
    /// Returns `None` when `path` is not under `root` or a component is not
    /// valid UTF-8.
    pub fn from_relative_path(root: &Path, path: &Path) -> Option<Self> {
        let rel = path.strip_prefix(root).ok()?;
        let stem_path = rel.with_extension("");
        let mut parts = Vec::new();
        for component in stem_path.components() {
            parts.push(component.as_os_str().to_str()?);
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn relative_path_strips_extension_and_joins_with_slash() {
        let root = PathBuf::from("/repo/schema");
        let path = root.join("schemas").join("dns_servers.yml");
        let id = SchemaId::from_relative_path(&root, &path).unwrap();
        assert_eq!(id.as_str(), "schemas/dns_servers");
    }

    #[test]
    fn path_outside_root_has_no_identifier() {
        let root = PathBuf::from("/repo/schema");
        let path = PathBuf::from("/elsewhere/ntp.json");
        assert!(SchemaId::from_relative_path(&root, &path).is_none());
    }

    #[test]
    fn only_last_extension_is_stripped() {
        let root = PathBuf::from("/r");
        let id = SchemaId::from_relative_path(&root, Path::new("/r/a/module.schema.json")).unwrap();
        assert_eq!(id.as_str(), "a/module.schema");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut ids = vec![
            SchemaId::from("schemas/syslog_servers"),
            SchemaId::from("schemas/dns_servers"),
            SchemaId::from("schemas/ntp"),
        ];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(SchemaId::as_str).collect();
        assert_eq!(names, ["schemas/dns_servers", "schemas/ntp", "schemas/syslog_servers"]);
    }
}
