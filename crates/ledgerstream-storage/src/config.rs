//! Datastore Configuration
//!
//! Where the exported ledgers live and how they are laid out.
//!
//! ```toml
//! url = "s3://ledger-exports/pubnet"
//! network_passphrase = "Public Global Stellar Network ; September 2015"
//!
//! [options]
//! aws_region = "us-east-1"
//!
//! [schema]
//! ledgers_per_file = 1
//! files_per_partition = 64000
//! ```
//!
//! The URL scheme selects the store: `s3://`, `gs://`, `file://` or
//! `memory://`. `options` are handed to the store builder unchanged. Any
//! path in the URL becomes the key prefix.
//!
//! Fields left out are not checked against the datastore manifest, see
//! [`crate::manifest`].

use object_store::parse_url_opts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::datastore::ObjectStoreDataStore;
use crate::error::{Error, Result};
use crate::manifest;
use crate::schema::DataStoreSchema;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Store URL, e.g. `s3://bucket/prefix` or `file:///var/ledgers`
    pub url: String,

    /// Builder options for the store (credentials, region, endpoint)
    #[serde(default)]
    pub options: HashMap<String, String>,

    /// Network the exported ledgers belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_passphrase: Option<String>,

    /// Compression name recorded in the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    /// Local schema; the manifest wins when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<DataStoreSchema>,
}

impl DataStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build the store without consulting the manifest.
    ///
    /// Uses the local schema, or the default schema when none is configured.
    pub fn connect(&self) -> Result<ObjectStoreDataStore> {
        let url = Url::parse(&self.url).map_err(|e| Error::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        let (store, path) =
            parse_url_opts(&url, self.options.iter()).map_err(|e| Error::InvalidUrl {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let schema = self.schema.clone().unwrap_or_default();
        let data_store =
            ObjectStoreDataStore::new(Arc::from(store), schema).with_prefix(path.to_string());

        tracing::debug!(
            url = %self.url,
            prefix = ?data_store.prefix(),
            "Connected to datastore"
        );

        Ok(data_store)
    }

    /// Build the store and adopt the schema recorded in its manifest.
    pub async fn open(&self) -> Result<ObjectStoreDataStore> {
        let data_store = self.connect()?;
        let schema = manifest::load_schema(&data_store, self).await?;
        schema.validate()?;

        tracing::info!(
            url = %self.url,
            ledgers_per_file = schema.ledgers_per_file,
            files_per_partition = schema.files_per_partition,
            file_extension = %schema.file_extension,
            "Loaded datastore schema"
        );

        Ok(data_store.with_schema(schema))
    }
}
