use std::{fmt, io, path::StripPrefixError};

use http::status::StatusCode;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use tokio::task::JoinError;

/// A single path that could not be processed, paired with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFailure {
    pub path: String,
    pub cause: String,
}

impl PathFailure {
    pub fn new(path: impl Into<String>, cause: impl fmt::Display) -> Self {
        PathFailure {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.cause)
    }
}

fn join_failures(failures: &[PathFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<String>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum VaultError {
    #[error("Note already exists: {0}")]
    AlreadyExists(String),
    #[error("Batch of {} mutation(s) failed under snapshot {snapshot_id}: {}", failed.len(), join_failures(failed))]
    BatchPartialFailure {
        snapshot_id: String,
        failed: Vec<PathFailure>,
        restored: Vec<String>,
        rollback_failed: Vec<PathFailure>,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Snapshot integrity check failed: {0}")]
    Integrity(String),
    #[error("Invalid batch request: {0}")]
    InvalidBatch(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Restore of snapshot {snapshot_id} incomplete: {}", join_failures(failed))]
    RestoreIncomplete {
        snapshot_id: String,
        restored: Vec<String>,
        failed: Vec<PathFailure>,
    },
    #[error("Path escapes the vault: {0}")]
    SecurityViolation(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Snapshot {snapshot_id} could not be captured: {}", join_failures(failed))]
    SnapshotFailed {
        snapshot_id: String,
        failed: Vec<PathFailure>,
    },
}

impl VaultError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VaultError::AlreadyExists(_) => StatusCode::CONFLICT,
            VaultError::BatchPartialFailure { .. } => StatusCode::CONFLICT,
            VaultError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            VaultError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VaultError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::NotFound(_) => StatusCode::NOT_FOUND,
            VaultError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            VaultError::RestoreIncomplete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::SecurityViolation(_) => StatusCode::FORBIDDEN,
            VaultError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VaultError::SnapshotFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StripPrefixError> for VaultError {
    fn from(src: StripPrefixError) -> VaultError {
        VaultError::SecurityViolation(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(src: toml::de::Error) -> VaultError {
        VaultError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for VaultError {
    fn from(src: toml::ser::Error) -> VaultError {
        VaultError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for VaultError {
    fn from(src: JsonError) -> VaultError {
        VaultError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for VaultError {
    fn from(src: YamlError) -> VaultError {
        VaultError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<io::Error> for VaultError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => VaultError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => VaultError::PermissionDenied(format!("{x}")),
            io::ErrorKind::AlreadyExists => VaultError::AlreadyExists(format!("{x}")),
            _ => VaultError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => VaultError::from(io_error),
            None => VaultError::Io("directory walk hit a filesystem loop".to_string()),
        }
    }
}

impl From<RegexError> for VaultError {
    fn from(x: RegexError) -> Self {
        VaultError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<JoinError> for VaultError {
    fn from(x: JoinError) -> Self {
        VaultError::Custom(format!("Worker task did not complete: {x}"))
    }
}
