//! Error Types for ledgerstream-core
//!
//! ### Range Errors
//! - `InvalidRange`: a bounded range whose lower bound is above its upper bound
//!
//! ### Batch Errors
//! - `LedgerNotInBatch`: a sequence was requested from a batch that does not hold it
//! - `InvalidBatch`: structurally inconsistent batch (count does not match bounds)
//!
//! ### Codec Errors
//! - `InvalidMagic`, `UnsupportedVersion`, `InvalidCompression`, `CrcMismatch`
//! - `Truncated`: the input ended before a field could be read
//! - `Decompression`: LZ4 rejected the body
//! - `BodyTooLarge`: the declared uncompressed size exceeds the limit

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid range: from {from} is greater than to {to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("Ledger {sequence} not in batch [{start},{end}]")]
    LedgerNotInBatch { sequence: u32, start: u32, end: u32 },

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u16),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("Truncated batch: {0}")]
    Truncated(&'static str),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Batch body of {size} bytes exceeds limit of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
