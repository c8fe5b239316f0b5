//! Core types for ledgerstream
//!
//! Ledgers are numbered, immutable records stored in batch files. This crate
//! holds the pieces every other crate shares:
//!
//! - [`Range`]: which sequence numbers a consumer wants
//! - [`Ledger`] / [`LedgerBatch`]: a single record and the file-sized group it travels in
//! - [`codec`]: the on-disk batch format and the [`BatchDecoder`] trait

pub mod codec;
pub mod error;
pub mod ledger;
pub mod range;
pub mod varint;

pub use codec::{BatchCodec, BatchDecoder, BatchEncoder, Compression};
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerBatch};
pub use range::Range;
