//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Object Errors
//! - `NotFound`: The requested object does not exist (yet). The buffered
//!   backend treats this one specially, so it is never folded into
//!   `ObjectStoreError`.
//! - `ObjectStoreError`: Any other failure reported by the object store
//!
//! ### Configuration Errors
//! - `InvalidSchema`: Schema values that cannot produce object keys
//! - `InvalidUrl`: Datastore URL could not be turned into a store
//!
//! ### Manifest Errors
//! - `Manifest`: The manifest could not be read or written
//! - `ConfigMismatch`: Local configuration disagrees with the stored manifest

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Object store error: {0}")]
    ObjectStoreError(object_store::Error),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid datastore URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error(
        "The local config does not match the manifest stored in the datastore. Details: {}",
        diffs.join("; ")
    )]
    ConfigMismatch { diffs: Vec<String> },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::ObjectStoreError(object_store::Error::NotFound { .. })
        )
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Error::NotFound { key: path },
            other => Error::ObjectStoreError(other),
        }
    }
}
