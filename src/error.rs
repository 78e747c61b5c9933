// Error types for the indexer

use crate::core::Hash256;
use thiserror::Error;

/// Errors raised by the chain, storage, sync and query layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Index or height out of bounds
    #[error("{what} {index} out of range (have {len})")]
    Range { what: &'static str, index: u64, len: u64 },

    /// Rollback on an empty header chain
    #[error("header chain is empty")]
    Underflow,

    /// Transactions spending each other in a loop
    #[error("cyclic dependency between transactions at {0}")]
    CyclicGraph(Hash256),

    /// Requested item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Configured network disagrees with storage or upstream
    #[error("unsupported network: expected {expected}, found {found}")]
    UnsupportedNetwork { expected: String, found: String },

    /// Storage layout written by a different version
    #[error("storage version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: String },

    /// Failure reported by, or while talking to, the upstream node
    #[error("upstream rpc error: {0}")]
    Upstream(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed hex, header, transaction or block bytes
    #[error("decode error: {0}")]
    Decode(String),
}

/// How a caller should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong, retrying it unchanged will fail again
    BadRequest,
    /// A collaborator is unavailable, the request may succeed later
    Unavailable,
    /// Index integrity or startup check failed, the process should stop
    Fatal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Range { .. } | Error::NotFound(_) | Error::Decode(_) => ErrorKind::BadRequest,
            Error::Upstream(_) | Error::Storage(_) => ErrorKind::Unavailable,
            Error::Underflow
            | Error::CyclicGraph(_)
            | Error::UnsupportedNetwork { .. }
            | Error::VersionMismatch { .. } => ErrorKind::Fatal,
        }
    }

    pub(crate) fn range(what: &'static str, index: impl Into<u64>, len: impl Into<u64>) -> Self {
        Error::Range {
            what,
            index: index.into(),
            len: len.into(),
        }
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Upstream(format!("malformed response: {}", err))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
