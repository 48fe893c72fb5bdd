//! # Error Types
//!
//! Errors raised while resolving settings or reading documents. Both are
//! `thiserror` enums carrying the offending path and a human-readable reason.
//!
//! Validation failures are not errors in this taxonomy: they are produced as
//! data by `enforcer-schema`.

use thiserror::Error;

/// Failure to resolve the run configuration.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be read.
    #[error("cannot read settings file {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("invalid settings file {path}: {reason}")]
    Parse {
        /// Path of the configuration file.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// A configured directory does not exist or is not a directory.
    #[error("{role} directory not found: {path}")]
    MissingDirectory {
        /// Which setting named the directory (e.g. "schema", "data search").
        role: &'static str,
        /// The resolved directory path.
        path: String,
    },
}

/// Failure to read or parse a YAML/JSON document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not a supported document format.
    #[error("unsupported document format for {path}")]
    UnsupportedFormat {
        /// Path of the document.
        path: String,
    },

    /// The content is not valid YAML or JSON, or cannot be represented as JSON.
    #[error("cannot parse {path}: {reason}")]
    Parse {
        /// Path of the document.
        path: String,
        /// Parser message.
        reason: String,
    },
}
