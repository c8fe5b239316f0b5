//! Datastore Manifest
//!
//! The exporter records the layout it wrote with in a small JSON object at
//! the root of the datastore:
//!
//! ```json
//! {
//!   "networkPassphrase": "Public Global Stellar Network ; September 2015",
//!   "version": "1.0",
//!   "compression": "lz4",
//!   "ledgersPerBatch": 1,
//!   "batchesPerPartition": 64000
//! }
//! ```
//!
//! Readers load their schema from it instead of trusting local settings, and
//! writers refuse to publish into a datastore whose manifest disagrees with
//! their own configuration.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::DataStoreConfig;
use crate::datastore::DataStore;
use crate::error::{Error, Result};
use crate::schema::{DataStoreSchema, DEFAULT_FILE_EXTENSION};

/// Key of the manifest object
pub const MANIFEST_FILENAME: &str = ".config.json";

/// Manifest format version written by this crate
pub const MANIFEST_VERSION: &str = "1.0";

/// Compression recorded when the configuration names none
pub const DEFAULT_COMPRESSION: &str = "lz4";

/// Keys inspected when guessing the ledger file extension
const EXTENSION_PROBE_LIMIT: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreManifest {
    #[serde(rename = "networkPassphrase")]
    pub network_passphrase: String,

    pub version: String,

    pub compression: String,

    #[serde(rename = "ledgersPerBatch")]
    pub ledgers_per_file: u32,

    #[serde(rename = "batchesPerPartition")]
    pub files_per_partition: u32,
}

impl DatastoreManifest {
    /// Manifest a writer with `config` would publish.
    pub fn from_config(config: &DataStoreConfig) -> Self {
        let schema = config.schema.clone().unwrap_or_default();
        Self {
            network_passphrase: config.network_passphrase.clone().unwrap_or_default(),
            version: MANIFEST_VERSION.to_string(),
            compression: config
                .compression
                .clone()
                .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string()),
            ledgers_per_file: schema.ledgers_per_file,
            files_per_partition: schema.files_per_partition,
        }
    }

    /// Differences between the local configuration and this stored manifest.
    ///
    /// Settings the configuration leaves out are not compared.
    pub fn diff(&self, config: &DataStoreConfig) -> Vec<String> {
        let mut diffs = Vec::new();

        if let Some(passphrase) = &config.network_passphrase {
            if !passphrase.is_empty() && *passphrase != self.network_passphrase {
                diffs.push(format!(
                    "networkPassphrase: local={:?}, datastore={:?}",
                    passphrase, self.network_passphrase
                ));
            }
        }

        if self.version != MANIFEST_VERSION {
            diffs.push(format!(
                "version: local={:?}, datastore={:?}",
                MANIFEST_VERSION, self.version
            ));
        }

        if let Some(compression) = &config.compression {
            if !compression.is_empty() && *compression != self.compression {
                diffs.push(format!(
                    "compression: local={:?}, datastore={:?}",
                    compression, self.compression
                ));
            }
        }

        if let Some(schema) = &config.schema {
            if schema.ledgers_per_file != 0 && schema.ledgers_per_file != self.ledgers_per_file {
                diffs.push(format!(
                    "ledgersPerFile: local={}, datastore={}",
                    schema.ledgers_per_file, self.ledgers_per_file
                ));
            }
            if schema.files_per_partition != 0
                && schema.files_per_partition != self.files_per_partition
            {
                diffs.push(format!(
                    "filesPerPartition: local={}, datastore={}",
                    schema.files_per_partition, self.files_per_partition
                ));
            }
        }

        diffs
    }

    fn check(&self, config: &DataStoreConfig) -> Result<()> {
        let diffs = self.diff(config);
        if diffs.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigMismatch { diffs })
        }
    }
}

/// Read the manifest, `None` when the datastore has none.
pub async fn read_manifest(store: &dyn DataStore) -> Result<Option<DatastoreManifest>> {
    let data = match store.get_file(MANIFEST_FILENAME).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    let manifest = serde_json::from_slice(&data).map_err(|e| {
        Error::Manifest(format!("invalid JSON in {}: {}", MANIFEST_FILENAME, e))
    })?;
    Ok(Some(manifest))
}

/// Make sure the datastore carries a manifest matching `config`.
///
/// Returns the manifest in effect and whether this call created it. A
/// concurrent writer may win the race to create it, in which case `false`
/// is returned alongside the manifest this call tried to write.
pub async fn publish_config(
    store: &dyn DataStore,
    config: &DataStoreConfig,
) -> Result<(DatastoreManifest, bool)> {
    if let Some(existing) = read_manifest(store).await? {
        existing.check(config)?;
        return Ok((existing, false));
    }

    let manifest = DatastoreManifest::from_config(config);
    let data = Bytes::from(serde_json::to_vec(&manifest)?);
    let created = store
        .put_file_if_not_exists(MANIFEST_FILENAME, data)
        .await?;

    if created {
        tracing::info!(
            ledgers_per_file = manifest.ledgers_per_file,
            files_per_partition = manifest.files_per_partition,
            "Published datastore manifest"
        );
    }

    Ok((manifest, created))
}

/// Schema to read the datastore with.
///
/// The manifest is authoritative when present. Without one the local schema
/// is used, which then must be configured explicitly.
pub async fn load_schema(
    store: &dyn DataStore,
    config: &DataStoreConfig,
) -> Result<DataStoreSchema> {
    let file_extension = match ledger_file_extension(store).await? {
        Some(ext) => ext,
        None => config
            .schema
            .as_ref()
            .map(|s| s.file_extension.clone())
            .unwrap_or_else(|| DEFAULT_FILE_EXTENSION.to_string()),
    };

    match read_manifest(store).await? {
        Some(manifest) => {
            manifest.check(config)?;
            Ok(DataStoreSchema {
                ledgers_per_file: manifest.ledgers_per_file,
                files_per_partition: manifest.files_per_partition,
                file_extension,
            })
        }
        None => {
            let schema = config
                .schema
                .as_ref()
                .filter(|s| s.ledgers_per_file != 0 && s.files_per_partition != 0)
                .ok_or_else(|| {
                    Error::Manifest(
                        "datastore manifest is missing and local config is incomplete; \
                         ledgers_per_file and files_per_partition must be set"
                            .to_string(),
                    )
                })?;

            tracing::warn!("Datastore has no manifest, using local schema");
            Ok(DataStoreSchema {
                file_extension,
                ..schema.clone()
            })
        }
    }
}

/// Extension of the first ledger object found in the datastore.
pub async fn ledger_file_extension(store: &dyn DataStore) -> Result<Option<String>> {
    let keys = store.list_file_paths(None, EXTENSION_PROBE_LIMIT).await?;
    Ok(keys.iter().find_map(|key| ledger_extension_of(key)))
}

/// Extension of a ledger object key, `None` if the name is not a ledger file.
///
/// Accepts `XXXXXXXX--start[-end].ext` where the extension may contain dots.
fn ledger_extension_of(key: &str) -> Option<String> {
    let name = key.rsplit('/').next()?;
    let (hex, rest) = name.split_once("--")?;
    if hex.len() != 8
        || !hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    {
        return None;
    }

    let (range, ext) = rest.split_once('.')?;
    let mut bounds = range.splitn(2, '-');
    let valid_bound = |b: &str| !b.is_empty() && b.bytes().all(|c| c.is_ascii_digit());
    if !bounds.next().is_some_and(valid_bound) || !bounds.next().map_or(true, valid_bound) {
        return None;
    }

    if ext.is_empty()
        || !ext
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b'-'))
    {
        return None;
    }

    Some(ext.to_string())
}
