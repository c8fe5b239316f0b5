//! ledgerstream Storage Layer
//!
//! Everything needed to locate and fetch exported ledger files in object
//! storage.
//!
//! ## Main Components
//!
//! ### DataStoreSchema
//! Maps a ledger sequence to the object holding it. Keys embed the inverted
//! start sequence, so the newest ledgers list first.
//!
//! ### DataStore
//! Get/put/exists over an `object_store` backend, with a distinguished
//! not-found error.
//!
//! ### Manifest
//! `.config.json` at the datastore root records the schema the exporter
//! used. Readers load it, writers publish it.
//!
//! ## Usage Example
//!
//! ```ignore
//! use ledgerstream_storage::{DataStore, DataStoreConfig};
//!
//! let store = DataStoreConfig::new("s3://ledger-exports/pubnet").open().await?;
//! let key = store.schema().object_key(1000);
//! let data = store.get_file(&key).await?;
//! ```

pub mod config;
pub mod datastore;
pub mod error;
pub mod manifest;
pub mod schema;

pub use config::DataStoreConfig;
pub use datastore::{DataStore, ObjectStoreDataStore};
pub use error::{Error, Result};
pub use manifest::{load_schema, publish_config, DatastoreManifest, MANIFEST_FILENAME};
pub use schema::DataStoreSchema;
