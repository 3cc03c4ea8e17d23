//! Typed errors for the interview pipeline.
//!
//! Every fallible core operation returns [`Error`]. The variants map onto
//! the failure classes the routing layer needs to tell apart:
//!
//! | Variant | Kind | Raised when |
//! |---------|------|-------------|
//! | [`Error::Validation`] | `validation` | bad `doc_type`, mismatched upsert lengths, wrong vector dims |
//! | [`Error::Template`] | `template` | a prompt placeholder has no bound value |
//! | [`Error::Parse`] | `parse` | the extractor or generator produced unusable content |
//! | [`Error::Provider`] | `provider` | an embedding or generation backend failed |
//! | [`Error::Storage`] / [`Error::Io`] | `storage` | SQLite or filesystem I/O failed |
//!
//! Malformed *fields* inside an otherwise parseable generator response are
//! never errors; they are repaired by the per-use-case normalizers in
//! [`questions`](crate::questions) and [`scoring`](crate::scoring).

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("template error: placeholder `{0}` has no bound value")]
    Template(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable error code, used in HTTP error bodies and
    /// CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Template(_) => "template",
            Error::Parse(_) => "parse",
            Error::Provider(_) => "provider",
            Error::Storage(_) | Error::Io(_) => "storage",
        }
    }

    pub(crate) fn provider(err: impl std::fmt::Display) -> Self {
        Error::Provider(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Provider(format!("request timed out: {}", err))
        } else {
            Error::Provider(err.to_string())
        }
    }
}
