use std::path::PathBuf;

use gre_core::{GreError, ObjectId};
use gre_crypto::CryptoError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("corrupted tree: requested {requested}, got {actual}")]
    CorruptedTree { requested: ObjectId, actual: ObjectId },

    #[error("malformed object: {0}")]
    MalformedObject(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("mirror {operation} failed: {message}")]
    Transport { operation: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no keys at {0} and no passphrase to derive them")]
    KeysMissing(PathBuf),

    #[error(transparent)]
    Core(#[from] GreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker pool: {0}")]
    ThreadPool(String),
}

impl SyncError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        SyncError::MalformedObject(msg.into())
    }
}
