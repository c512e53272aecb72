//! Centralized error types for mailquery.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailquery library.
///
/// Early termination of an iteration is not an error and never appears here;
/// see [`crate::filter::Flow`].
#[derive(Error, Debug)]
pub enum MailQueryError {
    /// The source could not be reached. Fatal to the current operation.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The source reported a fault while listing one candidate.
    #[error("Source error: {0}")]
    Source(String),

    /// The raw body of a single message could not be fetched.
    #[error("Could not fetch message {uid}: {reason}")]
    Fetch { uid: String, reason: String },

    /// A predicate failed while evaluating a message.
    #[error("Filter '{filter}' failed: {reason}")]
    Predicate { filter: String, reason: String },

    /// Folding one message into a reducer failed.
    #[error("Reducer failed on message {uid}: {reason}")]
    Reduction { uid: String, reason: String },

    /// A storage backend could not persist a message.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A date argument could not be parsed.
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// Configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailQueryError>`.
pub type Result<T> = std::result::Result<T, MailQueryError>;

impl MailQueryError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Fetch` variant for the given message.
    pub fn fetch(uid: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            uid: uid.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error must abort the whole operation.
    ///
    /// Everything else is a per-item fault that is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::FileNotFound(_) | Self::Config(_)
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (prefer `MailQueryError::io`).
impl From<std::io::Error> for MailQueryError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
