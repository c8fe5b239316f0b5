//! ledgerstream Observability
//!
//! Prometheus metrics for ledger retrieval.
//!
//! # Usage
//!
//! ```no_run
//! use ledgerstream_observability::metrics;
//!
//! // Register everything with the global registry
//! metrics::init();
//!
//! // Render the text exposition format
//! let text = metrics::gather_text().unwrap();
//! ```

pub mod metrics;

pub use metrics::{gather_text, init as init_metrics, REGISTRY};
