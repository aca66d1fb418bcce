//! Error types shared across the pelican crates.

use thiserror::Error;

/// Result type alias for pelican operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors for the SFTP service and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// A username or record field failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A client-supplied path could not be cleaned.
    #[error("invalid path")]
    InvalidPath,

    /// A cleaned path resolved outside the tenant root.
    #[error("path escapes root")]
    PathEscapes,

    /// User or file missing.
    #[error("not found")]
    NotFound,

    /// Authentication rejected. Always opaque to the client.
    #[error("permission denied")]
    PermissionDenied,

    /// Byte or file-count quota reached.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// Secret store read/write/list failure.
    #[error("store error: {0}")]
    Store(String),

    /// Deadline exceeded waiting on the store or another collaborator.
    #[error("timed out")]
    TimedOut,

    /// Local filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH transport or protocol failure.
    #[error("ssh error: {0}")]
    Ssh(String),

    /// Request for an operation this server does not offer.
    #[error("{0}")]
    Unsupported(String),

    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error should increment the storage IO error counter.
    pub fn is_storage_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Message safe to surface to an SFTP client.
    ///
    /// Auth and jail failures must not leak why they failed.
    pub fn client_message(&self) -> &'static str {
        match self {
            Error::PermissionDenied => "permission denied",
            Error::InvalidPath | Error::PathEscapes => "invalid path",
            Error::NotFound => "no such file",
            Error::QuotaExceeded => "quota exceeded",
            Error::Unsupported(_) => "operation not supported",
            _ => "failure",
        }
    }
}
