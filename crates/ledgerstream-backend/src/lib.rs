//! ledgerstream Backend
//!
//! Sequential ledger reads over concurrently prefetched datastore objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────┐
//! │ BufferedStorageBackend │  prepare_range / get_ledger / close
//! └───────────┬────────────┘
//!             │ next_batch()
//!             ▼
//! ┌────────────────────────┐
//! │      LedgerBuffer      │  task queue → workers → reorder heap → ready queue
//! └───────────┬────────────┘
//!             │ get_file(key)
//!             ▼
//! ┌────────────────────────┐
//! │       DataStore        │  S3 / GCS / local / in-memory
//! └────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use ledgerstream_backend::{BufferedStorageBackend, BufferedStorageBackendConfig, LedgerBackend};
//! use ledgerstream_core::Range;
//!
//! let store = DataStoreConfig::new("s3://ledger-exports/pubnet").open().await?;
//! let backend = BufferedStorageBackend::new(BufferedStorageBackendConfig::default(), Arc::new(store))?;
//!
//! backend.prepare_range(Range::unbounded(1000)).await?;
//! let ledger = backend.get_ledger(1000).await?;
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;

pub use backend::{BufferedStorageBackend, LedgerBackend};
pub use buffer::{BufferOccupancy, DownloadedObject, LedgerBuffer};
pub use config::BufferedStorageBackendConfig;
pub use error::{Error, Result};
