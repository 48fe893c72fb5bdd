//! # Settings
//!
//! The immutable run configuration consumed by the Schema Manager.
//!
//! Settings are read from `schema_enforcer.toml`, or from the
//! `[tool.schema_enforcer]` table of `pyproject.toml`, falling back to
//! defaults when neither exists. Relative directories are resolved against
//! the directory holding the configuration file. The resolved value is
//! constructed once and handed to consumers by reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default configuration file name.
pub const SETTINGS_FILE: &str = "schema_enforcer.toml";

/// Python-project configuration file that may carry a `[tool.schema_enforcer]` table.
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// Resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema root. Schema identifiers are relative to this directory.
    pub main_directory: PathBuf,
    /// Shared `$ref` targets, relative to `main_directory`. Never runnable.
    pub definition_directory: String,
    /// Fixture tree, relative to `main_directory`.
    pub test_directory: String,
    /// Extensions (with leading dot) of schema definition files.
    pub schema_file_extensions: Vec<String>,
    /// File names skipped during schema discovery.
    pub schema_file_exclude_filenames: Vec<String>,
    /// Directories searched recursively for instance documents.
    pub data_file_search_directories: Vec<PathBuf>,
    /// Extensions (with leading dot) of instance documents.
    pub data_file_extensions: Vec<String>,
    /// File names skipped during instance discovery.
    pub data_file_exclude_filenames: Vec<String>,
    /// Use a schema's top-level `properties` as its applies-to set when it
    /// declares no `x-applies-to`.
    pub data_file_automap: bool,
    /// Explicit mapping: instance file name or path fragment to schema ids.
    pub schema_mapping: BTreeMap<String, Vec<String>>,
    /// Enforce JSON Schema `format` assertions (ipv4, ipv6, hostname, ...).
    pub validate_formats: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            main_directory: PathBuf::from("schema"),
            definition_directory: "definitions".to_string(),
            test_directory: "tests".to_string(),
            schema_file_extensions: vec![".json".into(), ".yaml".into(), ".yml".into()],
            schema_file_exclude_filenames: Vec::new(),
            data_file_search_directories: vec![PathBuf::from("./")],
            data_file_extensions: vec![".json".into(), ".yaml".into(), ".yml".into()],
            data_file_exclude_filenames: vec![".yamllint.yml".into(), ".travis.yml".into()],
            data_file_automap: true,
            schema_mapping: BTreeMap::new(),
            validate_formats: true,
        }
    }
}

#[derive(Deserialize)]
struct PyProject {
    tool: Option<PyProjectTool>,
}

#[derive(Deserialize)]
struct PyProjectTool {
    schema_enforcer: Option<Settings>,
}

impl Settings {
    /// Resolve settings for a run.
    ///
    /// An explicit `config` path must exist. Otherwise `schema_enforcer.toml`
    /// and then `pyproject.toml` are looked up in `base_dir`; if neither
    /// provides settings, defaults are resolved against `base_dir`.
    pub fn resolve(config: Option<&Path>, base_dir: &Path) -> Result<Self, SettingsError> {
        if let Some(path) = config {
            return Self::from_file(path);
        }
        let own = base_dir.join(SETTINGS_FILE);
        if own.is_file() {
            return Self::from_file(&own);
        }
        let pyproject = base_dir.join(PYPROJECT_FILE);
        if pyproject.is_file() {
            if let Some(settings) = Self::from_pyproject(&pyproject)? {
                return Ok(settings);
            }
        }
        tracing::debug!(base_dir = %base_dir.display(), "no settings file found, using defaults");
        Ok(Self::default().with_base_dir(base_dir))
    }

    /// Load settings from a `schema_enforcer.toml` style file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = read_settings_file(path)?;
        let settings: Settings = toml::from_str(&text).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings.with_base_dir(parent_dir(path)))
    }

    /// Load the `[tool.schema_enforcer]` table of a `pyproject.toml`, if any.
    pub fn from_pyproject(path: &Path) -> Result<Option<Self>, SettingsError> {
        let text = read_settings_file(path)?;
        let project: PyProject = toml::from_str(&text).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(project
            .tool
            .and_then(|t| t.schema_enforcer)
            .map(|s| s.with_base_dir(parent_dir(path))))
    }

    /// Parse settings from TOML text, resolving relative directories against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(text).map_err(|e| SettingsError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(settings.with_base_dir(base_dir))
    }

    /// Make `main_directory` and the search directories absolute under `base_dir`.
    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        if self.main_directory.is_relative() {
            self.main_directory = base_dir.join(&self.main_directory);
        }
        for dir in &mut self.data_file_search_directories {
            if dir.is_relative() {
                *dir = base_dir.join(&*dir);
            }
        }
        self
    }

    /// Directory of shared definitions.
    pub fn definitions_dir(&self) -> PathBuf {
        self.main_directory.join(&self.definition_directory)
    }

    /// Root of the fixture tree.
    pub fn tests_dir(&self) -> PathBuf {
        self.main_directory.join(&self.test_directory)
    }

    /// Fatal-condition check: the schema root and every search directory
    /// must exist and be directories.
    pub fn check(&self) -> Result<(), SettingsError> {
        if !self.main_directory.is_dir() {
            return Err(SettingsError::MissingDirectory {
                role: "schema",
                path: self.main_directory.display().to_string(),
            });
        }
        for dir in &self.data_file_search_directories {
            if !dir.is_dir() {
                return Err(SettingsError::MissingDirectory {
                    role: "data search",
                    path: dir.display().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether `path` should be considered a schema definition file.
    pub fn is_schema_file(&self, path: &Path) -> bool {
        matches_file(path, &self.schema_file_extensions, &self.schema_file_exclude_filenames)
    }

    /// Whether `path` should be considered an instance document.
    pub fn is_data_file(&self, path: &Path) -> bool {
        matches_file(path, &self.data_file_extensions, &self.data_file_exclude_filenames)
    }
}

fn read_settings_file(path: &Path) -> Result<String, SettingsError> {
    std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn matches_file(path: &Path, extensions: &[String], excluded: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if excluded.iter().any(|e| e == name) {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.') == ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_layout() {
        let s = Settings::default();
        assert_eq!(s.main_directory, PathBuf::from("schema"));
        assert_eq!(s.definition_directory, "definitions");
        assert_eq!(s.test_directory, "tests");
        assert!(s.data_file_automap);
        assert!(s.schema_mapping.is_empty());
    }

    #[test]
    fn toml_overrides_and_resolves_relative_dirs() {
        let base = Path::new("/srv/config");
        let s = Settings::from_toml_str(
            r#"
main_directory = "schema"
data_file_search_directories = ["hostvars", "/abs/data"]
data_file_automap = false

[schema_mapping]
"dns.yml" = ["schemas/dns_servers"]
"#,
            base,
        )
        .unwrap();
        assert_eq!(s.main_directory, base.join("schema"));
        assert_eq!(
            s.data_file_search_directories,
            vec![base.join("hostvars"), PathBuf::from("/abs/data")]
        );
        assert!(!s.data_file_automap);
        assert_eq!(s.schema_mapping["dns.yml"], vec!["schemas/dns_servers".to_string()]);
        assert_eq!(s.tests_dir(), base.join("schema").join("tests"));
    }

    #[test]
    fn unknown_shape_is_a_parse_error() {
        let err = Settings::from_toml_str("data_file_automap = \"yes\"", Path::new("/")).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn resolve_prefers_own_file_then_pyproject() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PYPROJECT_FILE),
            "[tool.schema_enforcer]\nmain_directory = \"from_pyproject\"\n",
        )
        .unwrap();
        let s = Settings::resolve(None, dir.path()).unwrap();
        assert_eq!(s.main_directory, dir.path().join("from_pyproject"));

        std::fs::write(dir.path().join(SETTINGS_FILE), "main_directory = \"own\"\n").unwrap();
        let s = Settings::resolve(None, dir.path()).unwrap();
        assert_eq!(s.main_directory, dir.path().join("own"));
    }

    #[test]
    fn pyproject_without_table_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PYPROJECT_FILE), "[tool.black]\nline-length = 120\n").unwrap();
        let s = Settings::resolve(None, dir.path()).unwrap();
        assert_eq!(s.main_directory, dir.path().join("schema"));
    }

    #[test]
    fn explicit_missing_config_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::resolve(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn check_reports_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::default().with_base_dir(dir.path());
        let err = s.check().unwrap_err();
        assert!(matches!(err, SettingsError::MissingDirectory { role: "schema", .. }));

        std::fs::create_dir(dir.path().join("schema")).unwrap();
        s.check().unwrap();
    }

    #[test]
    fn file_filters() {
        let s = Settings::default();
        assert!(s.is_data_file(Path::new("hostvars/r1/dns.yml")));
        assert!(!s.is_data_file(Path::new("hostvars/.travis.yml")));
        assert!(!s.is_data_file(Path::new("hostvars/README.md")));
        assert!(s.is_schema_file(Path::new("schema/schemas/ntp.json")));
    }
}
