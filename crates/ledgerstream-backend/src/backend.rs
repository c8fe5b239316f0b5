//! Buffered Storage Backend
//!
//! [`BufferedStorageBackend`] serves ledgers one at a time, in order, from a
//! datastore of exported ledger objects. Behind the sequential API a
//! [`LedgerBuffer`] keeps up to `buffer_size` objects downloading or
//! downloaded ahead of the reader.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► prepare_range ──► get_ledger(from) ──► get_ledger(from+1) ──► ... ──► close
//!              │                    ▲
//!              └── prepare_range ───┘   (contained range: no-op,
//!                                        otherwise a fresh buffer)
//! ```
//!
//! ## Read Rules
//!
//! - The first read after preparing must ask for `range.from`
//! - Each later read asks for the previous sequence or the one after it
//! - Reads outside the prepared range are rejected
//!
//! A rejected read leaves the backend untouched.
//!
//! ## Usage
//!
//! ```ignore
//! let backend = BufferedStorageBackend::new(config, data_store)?;
//! backend.prepare_range(Range::bounded(100, 200)?).await?;
//! for sequence in 100..=200 {
//!     let ledger = backend.get_ledger(sequence).await?;
//!     process(ledger);
//! }
//! backend.close().await?;
//! ```

use async_trait::async_trait;
use ledgerstream_core::{BatchCodec, BatchDecoder, Ledger, LedgerBatch, Range};
use ledgerstream_observability::metrics;
use ledgerstream_storage::DataStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::buffer::{BufferOccupancy, LedgerBuffer};
use crate::config::BufferedStorageBackendConfig;
use crate::error::{Error, Result};

/// Sequential access to a stream of ledgers
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Highest ledger the backend could return without waiting, if any.
    async fn get_latest_ledger_sequence(&self) -> Result<Option<u32>>;

    /// Return ledger `sequence`, waiting for it to be fetched if needed.
    async fn get_ledger(&self, sequence: u32) -> Result<Ledger>;

    /// Start fetching `range`, or keep going if it is already covered.
    async fn prepare_range(&self, range: Range) -> Result<()>;

    async fn is_prepared(&self, range: Range) -> Result<bool>;

    /// Stop all background work. Later calls fail with `Closed`.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct ReadCursor {
    /// Last sequence returned since the range was prepared
    last_ledger: Option<u32>,
    /// Batch holding `last_ledger`
    batch: Option<LedgerBatch>,
}

impl ReadCursor {
    fn next_expected(&self, range: &Range) -> u64 {
        self.last_ledger
            .map_or(range.from() as u64, |last| last as u64 + 1)
    }

    /// Validate `sequence` against the prepared range and this cursor.
    fn check(&self, sequence: u32, range: &Range) -> Result<()> {
        if !range.includes(sequence) {
            let range_str = range.to_string();
            return Err(if sequence < range.from() {
                Error::SequenceBeforeRange {
                    sequence,
                    range: range_str,
                }
            } else {
                Error::SequenceBeyondRange {
                    sequence,
                    range: range_str,
                }
            });
        }
        if let Some(last) = self.last_ledger {
            if sequence < last {
                return Err(Error::SequenceRewind { sequence, last });
            }
        }

        let next = self.next_expected(range);
        if sequence as u64 > next {
            return Err(Error::SequenceAhead {
                sequence,
                next: next.min(u32::MAX as u64) as u32,
            });
        }
        Ok(())
    }
}

/// [`LedgerBackend`] reading exported ledger objects from a [`DataStore`]
pub struct BufferedStorageBackend {
    config: BufferedStorageBackendConfig,
    data_store: Arc<dyn DataStore>,
    decoder: Arc<dyn BatchDecoder>,
    buffer: RwLock<Option<Arc<LedgerBuffer>>>,
    closed: AtomicBool,
    cursor: tokio::sync::Mutex<ReadCursor>,
}

impl BufferedStorageBackend {
    /// Check the configuration and the store's schema. No work starts until
    /// [`LedgerBackend::prepare_range`].
    pub fn new(
        config: BufferedStorageBackendConfig,
        data_store: Arc<dyn DataStore>,
    ) -> Result<Self> {
        config.validate()?;
        data_store
            .schema()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            config,
            data_store,
            decoder: Arc::new(BatchCodec),
            buffer: RwLock::new(None),
            closed: AtomicBool::new(false),
            cursor: tokio::sync::Mutex::new(ReadCursor::default()),
        })
    }

    /// Use `decoder` instead of the default batch format.
    pub fn with_decoder(mut self, decoder: Arc<dyn BatchDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &BufferedStorageBackendConfig {
        &self.config
    }

    /// Occupancy of the active buffer, `None` when not prepared.
    pub fn buffer_occupancy(&self) -> Option<BufferOccupancy> {
        self.current_buffer().map(|buffer| buffer.occupancy())
    }

    /// Range of the active buffer, `None` when not prepared.
    pub fn prepared_range(&self) -> Option<Range> {
        self.current_buffer().map(|buffer| buffer.range())
    }

    fn current_buffer(&self) -> Option<Arc<LedgerBuffer>> {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerBackend for BufferedStorageBackend {
    async fn get_latest_ledger_sequence(&self) -> Result<Option<u32>> {
        self.check_open()?;
        let buffer = self.current_buffer().ok_or(Error::NotPrepared)?;
        if let Some(err) = buffer.failure() {
            return Err(err);
        }
        Ok(buffer.latest_sequence())
    }

    async fn get_ledger(&self, sequence: u32) -> Result<Ledger> {
        self.check_open()?;
        let mut cursor = self.cursor.lock().await;
        self.check_open()?;

        let buffer = self.current_buffer().ok_or(Error::NotPrepared)?;
        if let Some(err) = buffer.failure() {
            return Err(err);
        }
        let range = buffer.range();
        cursor.check(sequence, &range)?;

        let cached = match &cursor.batch {
            Some(batch) if batch.contains(sequence) => true,
            Some(batch) if sequence < batch.start_sequence() => {
                return Err(Error::SequenceBeforeBatch {
                    sequence,
                    batch_start: batch.start_sequence(),
                });
            }
            _ => false,
        };

        if !cached {
            let batch = buffer.next_batch().await?;
            if !batch.contains(sequence) {
                return Err(buffer.fail(Error::BatchMismatch {
                    sequence,
                    start: batch.start_sequence(),
                    end: batch.end_sequence(),
                }));
            }
            cursor.batch = Some(batch);
        }

        let ledger = match &cursor.batch {
            Some(batch) => batch
                .ledger(sequence)
                .map_err(|source| Error::Decode { sequence, source })?,
            None => {
                return Err(Error::InvariantViolated(format!(
                    "no batch cached after fetching {}",
                    sequence
                )))
            }
        };

        cursor.last_ledger = Some(sequence);
        metrics::LEDGERS_DELIVERED_TOTAL.inc();

        Ok(ledger)
    }

    async fn prepare_range(&self, range: Range) -> Result<()> {
        self.check_open()?;
        let mut cursor = self.cursor.lock().await;
        self.check_open()?;

        if let Some(buffer) = self.current_buffer() {
            if let Some(err) = buffer.failure() {
                return Err(err);
            }
            if buffer.range().contains(&range) {
                tracing::debug!(
                    requested = %range,
                    prepared = %buffer.range(),
                    "Range already prepared"
                );
                return Ok(());
            }
        }

        let buffer = Arc::new(LedgerBuffer::start(
            range,
            &self.config,
            self.data_store.clone(),
            self.decoder.clone(),
        )?);

        let previous = {
            let mut slot = self.buffer.write().unwrap_or_else(|e| e.into_inner());
            if self.closed.load(Ordering::SeqCst) {
                None
            } else {
                Some(slot.replace(buffer.clone()))
            }
        };

        let Some(previous) = previous else {
            // Lost the race with close(); the new buffer never becomes visible.
            buffer.close().await;
            return Err(Error::Closed);
        };

        *cursor = ReadCursor::default();
        tracing::info!(range = %range, "Prepared ledger range");

        if let Some(previous) = previous {
            tracing::info!(
                previous = %previous.range(),
                range = %range,
                "Replacing ledger buffer"
            );
            previous.close().await;
            buffer.publish_ready_depth();
        }

        Ok(())
    }

    async fn is_prepared(&self, range: Range) -> Result<bool> {
        self.check_open()?;
        Ok(self
            .current_buffer()
            .is_some_and(|buffer| !buffer.is_terminated() && buffer.range().contains(&range)))
    }

    async fn close(&self) -> Result<()> {
        let buffer = {
            let mut slot = self.buffer.write().unwrap_or_else(|e| e.into_inner());
            self.closed.store(true, Ordering::SeqCst);
            slot.take()
        };

        if let Some(buffer) = buffer {
            buffer.close().await;
            tracing::info!(range = %buffer.range(), "Closed buffered storage backend");
        }

        Ok(())
    }
}
