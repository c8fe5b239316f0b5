//! Backend Error Types
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! Returned when a call breaks the backend's usage rules. They never change
//! backend state, so the caller may retry with a valid request.
//! - `NotPrepared`, `Closed`
//! - `SequenceBeforeRange`, `SequenceBeyondRange`
//! - `SequenceRewind`, `SequenceAhead`, `SequenceBeforeBatch`
//!
//! ### Fatal Errors
//! Terminate the prefetch buffer. Every later call on the same buffer sees
//! the same cause, wrapped in `Buffer`.
//! - `ObjectNotFound`: A bounded range needs an object the store does not have
//! - `RetriesExhausted`: Fetching an object kept failing
//! - `Decode`, `BatchMismatch`: The object did not hold the expected ledgers
//! - `InvariantViolated`: Internal bookkeeping went wrong
//!
//! ### Configuration Errors
//! - `Config`: Rejected before any worker is started

use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("session is not prepared, call prepare_range first")]
    NotPrepared,

    #[error("session is closed")]
    Closed,

    #[error("requested sequence {sequence} precedes prepared range {range}")]
    SequenceBeforeRange { sequence: u32, range: String },

    #[error("requested sequence {sequence} is beyond prepared range {range}")]
    SequenceBeyondRange { sequence: u32, range: String },

    #[error("requested sequence {sequence} precedes last returned ledger {last}")]
    SequenceRewind { sequence: u32, last: u32 },

    #[error("requested sequence {sequence} is ahead of next expected ledger {next}")]
    SequenceAhead { sequence: u32, next: u32 },

    #[error("requested sequence {sequence} precedes current batch starting at {batch_start}")]
    SequenceBeforeBatch { sequence: u32, batch_start: u32 },

    #[error("ledger object containing sequence {sequence} is missing: {key}")]
    ObjectNotFound { sequence: u32, key: String },

    #[error("failed to download {key} after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: ledgerstream_storage::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] ledgerstream_storage::Error),

    #[error("failed to decode ledger object starting at {sequence}: {source}")]
    Decode {
        sequence: u32,
        #[source]
        source: ledgerstream_core::Error,
    },

    #[error("expected batch containing {sequence}, got [{start},{end}]")]
    BatchMismatch { sequence: u32, start: u32, end: u32 },

    #[error("buffer invariant violated: {0}")]
    InvariantViolated(String),

    #[error("ledger buffer failed: {0}")]
    Buffer(Arc<Error>),
}

impl Error {
    /// The underlying error, looking through `Buffer`.
    pub fn cause(&self) -> &Error {
        match self {
            Error::Buffer(inner) => inner.cause(),
            other => other,
        }
    }

    /// Whether this error ended the buffer it came from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.cause(),
            Error::ObjectNotFound { .. }
                | Error::RetriesExhausted { .. }
                | Error::Decode { .. }
                | Error::BatchMismatch { .. }
                | Error::InvariantViolated(_)
        )
    }

    /// Metric label for a fatal cause.
    pub(crate) fn reason(&self) -> &'static str {
        match self.cause() {
            Error::ObjectNotFound { .. } => "not_found",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Decode { .. } => "decode",
            Error::BatchMismatch { .. } => "batch_mismatch",
            Error::InvariantViolated(_) => "invariant",
            Error::Closed => "closed",
            _ => "other",
        }
    }
}
