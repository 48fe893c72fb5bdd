//! # Documents
//!
//! Instance documents, fixtures and schema definitions are all YAML or JSON
//! files. Every one is parsed into the same tagged tree, `serde_json::Value`
//! (object / array / string / number / bool / null), so validation dispatches
//! on the tag rather than on runtime type inspection.
//!
//! Object key order is preserved (`serde_json/preserve_order`), which makes
//! "document order" a well-defined notion for sorting error records.
//!
//! ## Inline tags
//!
//! A YAML instance may name its schemas in a leading comment:
//!
//! ```yaml
//! # jsonschema: schemas/dns_servers,schemas/ntp
//! dns_servers: []
//! ```
//!
//! Tags are parsed by [`inline_schema_tags`] and treated as explicit mapping
//! rules by the matcher.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DocumentError;
use crate::identity::SchemaId;

const INLINE_TAG_PREFIX: &str = "jsonschema:";

/// Serialization format of a document, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.yml` / `.yaml`
    Yaml,
    /// `.json`
    Json,
}

impl DocumentFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// A parsed document together with where it came from.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source file.
    pub path: PathBuf,
    /// Parsed content.
    pub content: Value,
    /// Schema identifiers named by inline `# jsonschema:` tags.
    pub tags: Vec<SchemaId>,
}

impl Document {
    /// Read and parse a YAML or JSON file.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            DocumentError::UnsupportedFormat {
                path: path.display().to_string(),
            }
        })?;
        let content = parse_str(&text, format).map_err(|reason| DocumentError::Parse {
            path: path.display().to_string(),
            reason,
        })?;
        let tags = match format {
            DocumentFormat::Yaml => inline_schema_tags(&text),
            DocumentFormat::Json => Vec::new(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            content,
            tags,
        })
    }

    /// Top-level keys of the document, empty when it is not a mapping.
    pub fn top_level_keys(&self) -> Vec<&str> {
        match &self.content {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Parse document text in the given format.
///
/// An empty YAML document parses to `null`.
pub fn parse_str(text: &str, format: DocumentFormat) -> Result<Value, String> {
    match format {
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}")),
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| format!("invalid YAML: {e}"))?;
            yaml_to_json_value(&yaml)
        }
    }
}

/// Convert a `serde_yaml::Value` to a `serde_json::Value`.
///
/// Scalar map keys are stringified; tags are dropped. Floats that JSON
/// cannot represent (NaN, infinities) are rejected.
pub fn yaml_to_json_value(yaml: &serde_yaml::Value) -> Result<Value, String> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(serde_json::Number::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Number(serde_json::Number::from(u)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot represent float {f} in JSON"))
            } else {
                Err(format!("unsupported YAML number: {n:?}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(yaml_to_json_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(map) => {
            let mut json_map = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported YAML map key: {other:?}")),
                };
                json_map.insert(key, yaml_to_json_value(v)?);
            }
            Ok(Value::Object(json_map))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json_value(&tagged.value),
    }
}

/// Schema identifiers from leading `# jsonschema: a,b` comment lines.
///
/// Only the comment block at the top of the file is inspected; scanning
/// stops at the first line that is neither blank, a comment, nor `---`.
pub fn inline_schema_tags(text: &str) -> Vec<SchemaId> {
    let mut tags = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "---" {
            continue;
        }
        let Some(comment) = line.strip_prefix('#') else {
            break;
        };
        if let Some(list) = comment.trim_start().strip_prefix(INLINE_TAG_PREFIX) {
            tags.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(SchemaId::from),
            );
        }
    }
    tags
}

// ---------------------------------------------------------------------------
// Document paths
// ---------------------------------------------------------------------------

/// One step from a container to a child value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Mapping key.
    Key(String),
    /// Sequence index.
    Index(usize),
}

/// Location of a value inside a document: the keys and indices walked from
/// the root. The empty path is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(pub Vec<PathSegment>);

impl DocumentPath {
    /// The root of the document.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Whether this path designates the document root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments from root to leaf.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Build a path from an RFC 6901 JSON Pointer (`/dns_servers/0`).
    ///
    /// A pointer token is read as an index only when the value it steps into
    /// is an array, so numeric mapping keys stay keys.
    pub fn from_json_pointer(pointer: &str, instance: &Value) -> Self {
        let mut segments = Vec::new();
        let mut current = Some(instance);
        for raw in pointer.split('/').skip(1) {
            let token = raw.replace("~1", "/").replace("~0", "~");
            let segment = match (current, token.parse::<usize>()) {
                (Some(Value::Array(_)), Ok(index)) => PathSegment::Index(index),
                _ => PathSegment::Key(token),
            };
            current = current.and_then(|v| match &segment {
                PathSegment::Index(i) => v.get(*i),
                PathSegment::Key(k) => v.get(k.as_str()),
            });
            segments.push(segment);
        }
        Self(segments)
    }

    /// Position of this path in a depth-first walk of `instance`: for each
    /// segment, the ordinal of the key among its siblings or the array index.
    ///
    /// Sorting paths by this key yields document order, parents before
    /// children. Segments that do not exist in the instance sort last.
    pub fn document_position(&self, instance: &Value) -> Vec<usize> {
        let mut position = Vec::with_capacity(self.0.len());
        let mut current = Some(instance);
        for segment in &self.0 {
            let (ordinal, next) = match (current, segment) {
                (Some(Value::Object(map)), PathSegment::Key(k)) => {
                    match map.keys().position(|key| key == k) {
                        Some(i) => (i, map.get(k)),
                        None => (usize::MAX, None),
                    }
                }
                (Some(Value::Array(items)), PathSegment::Index(i)) => (*i, items.get(*i)),
                _ => (usize::MAX, None),
            };
            position.push(ordinal);
            current = next;
        }
        position
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(root)");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{k}")?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_to_json_conversion() {
        let yaml_str = r#"
dns_servers:
  - name: ns1
    address: "10.0.0.1"
count: 42
enabled: true
1: numeric key
"#;
        let json_value = parse_str(yaml_str, DocumentFormat::Yaml).unwrap();
        assert_eq!(json_value["dns_servers"][0]["name"], "ns1");
        assert_eq!(json_value["count"], 42);
        assert_eq!(json_value["enabled"], true);
        assert_eq!(json_value["1"], "numeric key");
    }

    #[test]
    fn yaml_key_order_is_preserved() {
        let value = parse_str("zeta: 1\nalpha: 2\nmid: 3\n", DocumentFormat::Yaml).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_yaml_is_null() {
        assert_eq!(parse_str("", DocumentFormat::Yaml).unwrap(), Value::Null);
    }

    #[test]
    fn invalid_json_reports_reason() {
        let err = parse_str("{not json", DocumentFormat::Json).unwrap_err();
        assert!(err.starts_with("invalid JSON"), "{err}");
    }

    #[test]
    fn format_detection() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.yml")), Some(DocumentFormat::Yaml));
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.yaml")), Some(DocumentFormat::Yaml));
        assert_eq!(DocumentFormat::from_path(Path::new("b.json")), Some(DocumentFormat::Json));
        assert_eq!(DocumentFormat::from_path(Path::new("b.toml")), None);
    }

    #[test]
    fn inline_tags_from_leading_comments() {
        let text = "---\n# owner: netops\n# jsonschema: schemas/dns_servers, schemas/ntp\ndns_servers: []\n# jsonschema: schemas/ignored\n";
        let tags = inline_schema_tags(text);
        assert_eq!(tags, vec![SchemaId::from("schemas/dns_servers"), SchemaId::from("schemas/ntp")]);
    }

    #[test]
    fn no_inline_tags() {
        assert!(inline_schema_tags("ntp_servers: []\n").is_empty());
    }

    #[test]
    fn pointer_to_path_distinguishes_indices_from_numeric_keys() {
        let instance = json!({"dns_servers": [{"name": "ns1"}], "vlans": {"10": {"name": "mgmt"}}});
        let p = DocumentPath::from_json_pointer("/dns_servers/0", &instance);
        assert_eq!(p.segments(), &[PathSegment::Key("dns_servers".into()), PathSegment::Index(0)]);
        assert_eq!(p.to_string(), "dns_servers[0]");

        let q = DocumentPath::from_json_pointer("/vlans/10/name", &instance);
        assert_eq!(q.to_string(), "vlans.10.name");
    }

    #[test]
    fn pointer_unescapes_tokens() {
        let instance = json!({"a/b": {"c~d": 1}});
        let p = DocumentPath::from_json_pointer("/a~1b/c~0d", &instance);
        assert_eq!(p.segments(), &[PathSegment::Key("a/b".into()), PathSegment::Key("c~d".into())]);
    }

    #[test]
    fn root_path_display() {
        assert_eq!(DocumentPath::root().to_string(), "(root)");
        assert_eq!(DocumentPath::from_json_pointer("", &json!({})), DocumentPath::root());
    }

    #[test]
    fn document_position_follows_declaration_order() {
        let instance = json!({"zeta": [1, 2], "alpha": {"x": 1}});
        let zeta1 = DocumentPath::from_json_pointer("/zeta/1", &instance);
        let alpha_x = DocumentPath::from_json_pointer("/alpha/x", &instance);
        let root = DocumentPath::root();
        assert_eq!(zeta1.document_position(&instance), vec![0, 1]);
        assert_eq!(alpha_x.document_position(&instance), vec![1, 0]);
        assert!(root.document_position(&instance) < zeta1.document_position(&instance));
    }

    #[test]
    fn path_serializes_as_mixed_list() {
        let p = DocumentPath(vec![PathSegment::Key("dns_servers".into()), PathSegment::Index(0)]);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!(["dns_servers", 0]));
        let back: DocumentPath = serde_yaml::from_str("- dns_servers\n- 0\n").unwrap();
        assert_eq!(back, p);
    }

    fn encode_token(key: &str) -> String {
        key.replace('~', "~0").replace('/', "~1")
    }

    proptest::proptest! {
        /// Each top-level key resolves from its pointer and sorts at its
        /// declaration ordinal, whatever characters it contains.
        #[test]
        fn pointer_keys_locate_their_declaration(
            keys in proptest::collection::vec("[a-z0-9~/._ ]{1,8}", 1..8)
        ) {
            let mut map = serde_json::Map::new();
            for key in &keys {
                map.insert(key.clone(), Value::Null);
            }
            let instance = Value::Object(map);
            let declared: Vec<String> = instance.as_object().unwrap().keys().cloned().collect();
            for (ordinal, key) in declared.iter().enumerate() {
                let path = DocumentPath::from_json_pointer(&format!("/{}", encode_token(key)), &instance);
                proptest::prop_assert_eq!(path.segments(), &[PathSegment::Key(key.clone())]);
                proptest::prop_assert_eq!(path.document_position(&instance), vec![ordinal]);
            }
        }
    }
}
