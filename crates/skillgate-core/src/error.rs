use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural reasons a submitted folder cannot be turned into a bundle.
///
/// These are always hard failures: the bundle is quarantined and never
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedReason {
    #[error("no SKILL.md document found")]
    MissingDocument,

    #[error("skill document is not valid UTF-8")]
    NotUtf8,

    #[error("skill document could not be read: {message}")]
    Unreadable { message: String },

    #[error("header block is not the first content of the document")]
    HeaderNotFirst,

    #[error("header block is not closed by a delimiter line")]
    UnterminatedHeader,

    #[error("header line {line} is not a `key: value` pair")]
    InvalidHeaderLine { line: usize },

    #[error("required header field `{field}` is empty")]
    EmptyField { field: String },
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("malformed bundle {}: {reason}", path.display())]
    MalformedBundle {
        path: PathBuf,
        reason: MalformedReason,
    },

    /// Unreadable or invalid allowlist, rule table, or taxonomy. Fails the
    /// whole run closed.
    #[error("scanner configuration error: {0}")]
    ScannerConfig(String),

    #[error("destination already exists: {}", destination.display())]
    DestinationConflict { destination: PathBuf },

    /// A move failed after the findings artifact was staged, and restoring
    /// the bundle folder failed too.
    #[error("{cause}; rolling back {} also failed: {source}", path.display())]
    ArtifactRollback {
        path: PathBuf,
        cause: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IntakeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::ScannerConfig(_))
    }
}
