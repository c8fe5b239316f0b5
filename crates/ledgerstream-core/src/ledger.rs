//! Ledgers and Ledger Batches
//!
//! A [`Ledger`] is one numbered record. Ledgers are never stored alone: the
//! exporter groups a contiguous run of them into a [`LedgerBatch`], and each
//! batch becomes one object in the datastore.
//!
//! ```text
//! object FFFFFFFB--4-7  →  LedgerBatch { start: 4, end: 7, ledgers: [l4, l5, l6, l7] }
//! ```
//!
//! The payload of a ledger is opaque here. Meaning is assigned by whoever
//! consumes the stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Sequence number of this ledger
    pub sequence: u32,

    /// Raw ledger payload
    pub payload: Bytes,
}

impl Ledger {
    pub fn new(sequence: u32, payload: Bytes) -> Self {
        Self { sequence, payload }
    }
}

/// A contiguous run of ledgers decoded from one datastore object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBatch {
    start_sequence: u32,
    end_sequence: u32,
    ledgers: Vec<Bytes>,
}

impl LedgerBatch {
    /// Build a batch, checking that `ledgers` covers exactly `[start, end]`.
    pub fn new(start_sequence: u32, end_sequence: u32, ledgers: Vec<Bytes>) -> Result<Self> {
        if start_sequence > end_sequence {
            return Err(Error::InvalidBatch(format!(
                "start sequence {} is greater than end sequence {}",
                start_sequence, end_sequence
            )));
        }

        let expected = (end_sequence - start_sequence) as u64 + 1;
        if ledgers.len() as u64 != expected {
            return Err(Error::InvalidBatch(format!(
                "batch [{},{}] needs {} ledgers, got {}",
                start_sequence,
                end_sequence,
                expected,
                ledgers.len()
            )));
        }

        Ok(Self {
            start_sequence,
            end_sequence,
            ledgers,
        })
    }

    pub fn start_sequence(&self) -> u32 {
        self.start_sequence
    }

    pub fn end_sequence(&self) -> u32 {
        self.end_sequence
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    pub fn contains(&self, sequence: u32) -> bool {
        sequence >= self.start_sequence && sequence <= self.end_sequence
    }

    /// Extract one ledger. Cheap: payloads are reference-counted.
    pub fn ledger(&self, sequence: u32) -> Result<Ledger> {
        if !self.contains(sequence) {
            return Err(Error::LedgerNotInBatch {
                sequence,
                start: self.start_sequence,
                end: self.end_sequence,
            });
        }

        let index = (sequence - self.start_sequence) as usize;
        Ok(Ledger::new(sequence, self.ledgers[index].clone()))
    }

    pub fn payloads(&self) -> &[Bytes] {
        &self.ledgers
    }
}
