//! Data Store Access
//!
//! [`DataStore`] is the narrow view of object storage the ledger backend
//! needs: fetch an object by key, check for it, and write it (optionally
//! only if absent). [`ObjectStoreDataStore`] implements it on top of any
//! `object_store` backend (S3, GCS, local filesystem, in-memory).
//!
//! ## Not Found
//!
//! A missing object is always reported as [`Error::NotFound`], never as a
//! generic store error. Readers of an unbounded range rely on this to tell
//! "not exported yet" apart from real failures.
//!
//! ## Usage
//!
//! ```ignore
//! use object_store::memory::InMemory;
//!
//! let store = ObjectStoreDataStore::new(Arc::new(InMemory::new()), DataStoreSchema::default());
//! store.put_file("FFFFFFFF--0.lbat", data).await?;
//! let bytes = store.get_file("FFFFFFFF--0.lbat").await?;
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{path::Path, ObjectStore, PutMode, PutOptions};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::DataStoreSchema;

/// Object storage holding exported ledger files
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Download the whole object stored at `key`.
    async fn get_file(&self, key: &str) -> Result<Bytes>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn put_file(&self, key: &str, data: Bytes) -> Result<()>;

    /// Write only if nothing is stored at `key`. Returns whether it was written.
    async fn put_file_if_not_exists(&self, key: &str, data: Bytes) -> Result<bool>;

    /// Up to `limit` keys under `prefix`, in store listing order.
    async fn list_file_paths(&self, prefix: Option<&str>, limit: usize) -> Result<Vec<String>>;

    /// Layout of ledger objects in this store
    fn schema(&self) -> &DataStoreSchema;
}

/// [`DataStore`] backed by an `object_store` implementation
pub struct ObjectStoreDataStore {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    schema: DataStoreSchema,
}

impl ObjectStoreDataStore {
    pub fn new(store: Arc<dyn ObjectStore>, schema: DataStoreSchema) -> Self {
        Self {
            store,
            prefix: None,
            schema,
        }
    }

    /// Place every key under `prefix` (e.g. a bucket sub-directory).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn with_schema(mut self, schema: DataStoreSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn path(&self, key: &str) -> Path {
        match &self.prefix {
            Some(prefix) => Path::from(format!("{}/{}", prefix, key)),
            None => Path::from(key),
        }
    }

    fn strip_prefix<'a>(&self, location: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => location
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(location),
            None => location,
        }
    }

    fn map_error(key: &str, err: object_store::Error) -> Error {
        match err {
            object_store::Error::NotFound { .. } => Error::NotFound {
                key: key.to_string(),
            },
            other => Error::ObjectStoreError(other),
        }
    }
}

impl fmt::Debug for ObjectStoreDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreDataStore")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("schema", &self.schema)
            .finish()
    }
}

#[async_trait]
impl DataStore for ObjectStoreDataStore {
    async fn get_file(&self, key: &str) -> Result<Bytes> {
        let path = self.path(key);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| Self::map_error(key, e))?;
        let data = result.bytes().await.map_err(|e| Self::map_error(key, e))?;

        tracing::trace!(key = %key, bytes = data.len(), "Downloaded object");
        Ok(data)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&self.path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Error::ObjectStoreError(e)),
        }
    }

    async fn put_file(&self, key: &str, data: Bytes) -> Result<()> {
        self.store
            .put(&self.path(key), data)
            .await
            .map_err(|e| Self::map_error(key, e))?;
        Ok(())
    }

    async fn put_file_if_not_exists(&self, key: &str, data: Bytes) -> Result<bool> {
        let opts = PutOptions::from(PutMode::Create);
        match self.store.put_opts(&self.path(key), data, opts).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => {
                tracing::debug!(key = %key, "Object already exists, skipping write");
                Ok(false)
            }
            Err(e) => Err(Self::map_error(key, e)),
        }
    }

    async fn list_file_paths(&self, prefix: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let list_prefix = match (&self.prefix, prefix) {
            (Some(base), Some(p)) => Some(Path::from(format!("{}/{}", base, p))),
            (Some(base), None) => Some(Path::from(base.as_str())),
            (None, Some(p)) => Some(Path::from(p)),
            (None, None) => None,
        };

        let mut paths = Vec::new();
        let mut listing = self.store.list(list_prefix.as_ref());
        while paths.len() < limit {
            match listing.try_next().await.map_err(Error::ObjectStoreError)? {
                Some(meta) => paths.push(self.strip_prefix(meta.location.as_ref()).to_string()),
                None => break,
            }
        }

        Ok(paths)
    }

    fn schema(&self) -> &DataStoreSchema {
        &self.schema
    }
}
