//! # Matcher
//!
//! Decides which schemas validate a given instance document.
//!
//! 1. **Explicit**: configured mapping rules and inline `# jsonschema:`
//!    tags. A rule key matches when it equals the instance path (as
//!    discovered, or relative to its search directory); failing that, the
//!    key that is the longest component-wise suffix of the path wins, so a
//!    bare file name like `dns.yml` matches `hostvars/router1/dns.yml`.
//!    When anything explicit applies, it is the whole answer: convention
//!    matching is skipped for that instance. A rule with an empty list
//!    opts the instance out entirely.
//! 2. **Convention**: otherwise, every runnable schema whose applies-to
//!    set intersects the instance's top-level keys.
//!
//! The returned identifiers are always in the store's lexicographic order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use enforcer_core::{SchemaId, Settings};
use serde::Serialize;

use crate::store::SchemaStore;

/// How the schemas of an instance were resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// A mapping rule or inline tag named the schemas.
    Explicit,
    /// Applies-to keys intersected the instance's top-level keys.
    Convention,
    /// Nothing applied.
    Unmatched,
}

/// Resolved schema set for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResolution {
    /// Identifiers in lexicographic order. Explicit identifiers are kept even
    /// when the store does not know them, so the caller can report them.
    pub schema_ids: Vec<SchemaId>,
    /// Which strategy produced `schema_ids`.
    pub strategy: MatchStrategy,
}

/// Explicit instance-to-schema rules, keyed by file name or path fragment.
#[derive(Debug, Clone, Default)]
pub struct MappingRules {
    rules: BTreeMap<String, Vec<SchemaId>>,
}

impl MappingRules {
    /// Rules from `settings.schema_mapping`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings
                .schema_mapping
                .iter()
                .map(|(k, ids)| {
                    let ids = ids.iter().map(|id| SchemaId::from(id.as_str())).collect::<Vec<_>>();
                    (k.clone(), ids)
                }),
        )
    }

    /// Build rules from (key, schema ids) pairs.
    pub fn new(rules: impl IntoIterator<Item = (String, Vec<SchemaId>)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(k, ids)| (normalize_key(&k), ids))
                .collect(),
        }
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule applying to `instance_path`, if any.
    ///
    /// `search_roots` are the configured search directories; the path
    /// relative to the root containing it also counts as an exact match.
    pub fn lookup(&self, instance_path: &Path, search_roots: &[PathBuf]) -> Option<&[SchemaId]> {
        let mut exact_forms = vec![slash_joined(instance_path)];
        exact_forms.extend(
            search_roots
                .iter()
                .filter_map(|root| instance_path.strip_prefix(root).ok())
                .map(slash_joined),
        );
        for form in &exact_forms {
            if let Some(ids) = self.rules.get(form) {
                return Some(ids.as_slice());
            }
        }

        // Longest suffix wins; ties go to the first key in sorted order.
        let mut best: Option<(usize, &[SchemaId])> = None;
        for (key, ids) in &self.rules {
            let key_path = Path::new(key);
            if !instance_path.ends_with(key_path) {
                continue;
            }
            let depth = key_path.components().count();
            if best.map_or(true, |(d, _)| depth > d) {
                best = Some((depth, ids.as_slice()));
            }
        }
        best.map(|(_, ids)| ids)
    }
}

/// Resolve the schemas that apply to one instance.
///
/// `inline_tags` are the instance's `# jsonschema:` tags; they count as an
/// explicit rule and are unioned with a matching configured rule.
pub fn resolve(
    instance_path: &Path,
    top_level_keys: &[&str],
    inline_tags: &[SchemaId],
    rules: &MappingRules,
    search_roots: &[PathBuf],
    store: &SchemaStore,
) -> MatchResolution {
    let rule = rules.lookup(instance_path, search_roots);
    if rule.is_some() || !inline_tags.is_empty() {
        // A matching rule is authoritative even when it lists nothing.
        let explicit: BTreeSet<SchemaId> = inline_tags
            .iter()
            .chain(rule.unwrap_or_default())
            .cloned()
            .collect();
        let strategy = if explicit.is_empty() {
            MatchStrategy::Unmatched
        } else {
            MatchStrategy::Explicit
        };
        return MatchResolution {
            schema_ids: explicit.into_iter().collect(),
            strategy,
        };
    }

    let schema_ids: Vec<SchemaId> = store
        .iter()
        .filter(|(_, schema)| {
            top_level_keys
                .iter()
                .any(|key| schema.applies_to().contains(*key))
        })
        .map(|(id, _)| id.clone())
        .collect();
    let strategy = if schema_ids.is_empty() {
        MatchStrategy::Unmatched
    } else {
        MatchStrategy::Convention
    };
    MatchResolution {
        schema_ids,
        strategy,
    }
}

fn normalize_key(key: &str) -> String {
    slash_joined(Path::new(key))
}

/// Path with `.` components dropped and `/` separators.
fn slash_joined(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let joined = parts.join("/");
    if path.has_root() {
        joined.replacen("//", "/", 1)
    } else {
        joined
    }
}
