//! Typed errors for backup runs.
//!
//! Each variant corresponds to one failing stage of the run. Everything
//! except [`Error::List`] and [`Error::Delete`] is fatal and aborts the run;
//! cleanup-phase failures are reported and the run still exits successfully.

use std::path::{Path, PathBuf};

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the stages of a backup run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required external tool is not installed or not runnable.
    #[error("required tool '{name}' not available: {reason}")]
    MissingTool { name: String, reason: String },

    /// The database roster or server version could not be resolved.
    #[error("database enumeration failed: {reason}")]
    Enumeration { reason: String },

    /// pg_dump failed for one database.
    #[error("dump failed for database '{database}': {reason}")]
    Dump { database: String, reason: String },

    /// Encrypting a dump artifact failed.
    #[error("encryption failed for {path:?}: {reason}")]
    Encryption { path: PathBuf, reason: String },

    /// Uploading an artifact to object storage failed.
    #[error("upload failed for object '{key}': {reason}")]
    Upload { key: String, reason: String },

    /// Listing existing backups failed (cleanup phase).
    #[error("listing objects under prefix '{prefix}' failed: {reason}")]
    List { prefix: String, reason: String },

    /// Deleting a single backup object failed (cleanup phase).
    #[error("delete failed for object '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a missing-tool error.
    pub fn missing_tool(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingTool {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an enumeration error.
    pub fn enumeration(reason: impl Into<String>) -> Self {
        Self::Enumeration {
            reason: reason.into(),
        }
    }

    /// Create a dump error for one database.
    pub fn dump(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dump {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Create an encryption error for one artifact.
    pub fn encryption(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Encryption {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create an upload error for one object key.
    pub fn upload(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upload {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a listing error for a prefix.
    pub fn list(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::List {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// Create a delete error for one object key.
    pub fn delete(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delete {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
