//! Prefetch and Reorder Buffer
//!
//! `LedgerBuffer` downloads the objects of a [`Range`] concurrently and hands
//! them to a single consumer strictly in sequence order.
//!
//! ## Pipeline
//!
//! ```text
//!            task queue              reorder heap           ready queue
//! push ──► [96, 97, 98, 99] ──► workers ──► {103, 101} ──► [100] ──► next_batch()
//!   ▲                          (fetch)      min-heap by              │
//!   │                                      start sequence            │
//!   └──────────── one new task for every object consumed ◄──────────┘
//! ```
//!
//! 1. **Task queue**: start sequences waiting for a worker. Each is received
//!    by exactly one worker.
//! 2. **Workers**: `num_workers` tokio tasks fetching objects from the
//!    [`DataStore`]. Completion order is arbitrary.
//! 3. **Reorder heap**: finished downloads wait here until every earlier
//!    object has been released.
//! 4. **Ready queue**: objects in ascending order, consumed by `next_batch`.
//!
//! ## Memory Bound
//!
//! At every observable point
//!
//! ```text
//! queued_tasks + in_flight + reordering + ready <= buffer_size
//! ```
//!
//! A task is only enqueued when the consumer takes an object out of the
//! ready queue, so both queues are created with exactly `buffer_size` slots
//! and a full queue can only mean the bookkeeping is wrong.
//!
//! ## Failure
//!
//! A fatal error (missing object in a bounded range, exhausted retries,
//! undecodable object) cancels every worker and is reported to every later
//! caller. The first cause recorded wins, including `Closed` from
//! [`LedgerBuffer::close`].

use bytes::Bytes;
use ledgerstream_core::{BatchDecoder, LedgerBatch, Range};
use ledgerstream_observability::metrics;
use ledgerstream_storage::{DataStore, DataStoreSchema};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BufferedStorageBackendConfig;
use crate::error::{Error, Result};

/// Raw bytes of one datastore object, ordered by start sequence only
#[derive(Debug, Clone)]
pub struct DownloadedObject {
    pub start_sequence: u32,
    pub payload: Bytes,
}

impl PartialEq for DownloadedObject {
    fn eq(&self, other: &Self) -> bool {
        self.start_sequence == other.start_sequence
    }
}

impl Eq for DownloadedObject {}

impl PartialOrd for DownloadedObject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DownloadedObject {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_sequence.cmp(&other.start_sequence)
    }
}

/// Snapshot of where the buffer's objects currently are
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferOccupancy {
    /// Tasks waiting for a worker
    pub queued_tasks: usize,
    /// Tasks a worker has taken but not yet stored
    pub in_flight: usize,
    /// Downloaded objects waiting for an earlier one
    pub reordering: usize,
    /// Objects ready for the consumer
    pub ready: usize,
}

impl BufferOccupancy {
    pub fn total(&self) -> usize {
        self.queued_tasks + self.in_flight + self.reordering + self.ready
    }
}

struct ReorderState {
    heap: BinaryHeap<Reverse<DownloadedObject>>,
    /// Start sequence of the next object allowed into the ready queue
    current: u64,
    /// Start sequence of the next task to enqueue
    next_task: u64,
}

/// State shared between the consumer and the workers
struct Shared {
    range: Range,
    schema: DataStoreSchema,
    stride: u64,
    /// Start sequence of the last object in a bounded range
    last_task: Option<u64>,
    first_task: u64,
    retry_limit: u32,
    retry_wait: std::time::Duration,
    data_store: Arc<dyn DataStore>,

    task_tx: mpsc::Sender<u32>,
    task_rx: tokio::sync::Mutex<mpsc::Receiver<u32>>,
    ready_tx: mpsc::Sender<DownloadedObject>,

    state: Mutex<ReorderState>,
    in_flight: AtomicU32,

    token: CancellationToken,
    cause: OnceLock<Arc<Error>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ReorderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `cause` (unless one is already recorded) and stop the workers.
    fn terminate(&self, cause: Error) {
        let cause = Arc::new(cause);
        if self.cause.set(cause.clone()).is_ok() {
            match cause.as_ref() {
                Error::Closed => {
                    tracing::debug!(range = %self.range, "Ledger buffer closed");
                }
                err => {
                    metrics::BUFFER_FAILURES_TOTAL
                        .with_label_values(&[err.reason()])
                        .inc();
                    tracing::error!(range = %self.range, error = %err, "Ledger buffer failed");
                }
            }
        }
        self.token.cancel();
    }

    /// Error reported to callers once the buffer has stopped.
    fn termination_error(&self) -> Error {
        match self.cause.get() {
            Some(cause) if matches!(cause.as_ref(), Error::Closed) => Error::Closed,
            Some(cause) => Error::Buffer(cause.clone()),
            None => Error::Closed,
        }
    }

    fn fail(&self, cause: Error) -> Error {
        self.terminate(cause);
        self.termination_error()
    }

    /// Enqueue the next task, if the range has one left.
    fn push_task_queue(&self) {
        let mut state = self.lock_state();

        if state.next_task > u32::MAX as u64 {
            return;
        }
        if let Some(last) = self.last_task {
            if state.next_task > last {
                return;
            }
        }

        match self.task_tx.try_send(state.next_task as u32) {
            Ok(()) => state.next_task += self.stride,
            Err(TrySendError::Full(sequence)) => {
                drop(state);
                self.terminate(Error::InvariantViolated(format!(
                    "task queue full while enqueueing {}",
                    sequence
                )));
            }
            // Receiver lives as long as `Shared`, so this only races shutdown.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Park a finished download and release every object now in order.
    fn store_object(&self, object: DownloadedObject) {
        let mut state = self.lock_state();
        state.heap.push(Reverse(object));
        self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);

        loop {
            let in_order = matches!(
                state.heap.peek(),
                Some(Reverse(next)) if next.start_sequence as u64 == state.current
            );
            if !in_order {
                break;
            }
            let Some(Reverse(next)) = state.heap.pop() else {
                break;
            };
            let sequence = next.start_sequence;

            if let Err(e) = self.ready_tx.try_send(next) {
                drop(state);
                let reason = match e {
                    TrySendError::Full(_) => "ready queue full",
                    TrySendError::Closed(_) => "ready queue closed",
                };
                self.terminate(Error::InvariantViolated(format!(
                    "{} while releasing {}",
                    reason, sequence
                )));
                return;
            }
            state.current += self.stride;
        }

        self.set_ready_gauge(&state);
    }

    fn ready_len(&self) -> usize {
        self.ready_tx.max_capacity() - self.ready_tx.capacity()
    }

    /// Gauge writes happen under the reorder lock so the last write wins.
    fn set_ready_gauge(&self, _state: &ReorderState) {
        metrics::BUFFER_READY_OBJECTS.set(self.ready_len() as i64);
    }

    fn publish_ready_depth(&self) {
        let state = self.lock_state();
        self.set_ready_gauge(&state);
    }

    /// Fetch the object starting at `sequence`, retrying per policy.
    ///
    /// Returns `None` once the buffer is cancelled, including when this call
    /// is the one that failed it.
    async fn download(&self, sequence: u32) -> Option<Bytes> {
        let key = self.schema.object_key(sequence);
        let mut failures: u32 = 0;

        loop {
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                result = self.data_store.get_file(&key) => result,
            };

            match result {
                Ok(data) => {
                    metrics::FETCH_LATENCY.observe(started.elapsed().as_secs_f64());
                    metrics::OBJECTS_FETCHED_TOTAL.inc();
                    metrics::OBJECT_BYTES_TOTAL.inc_by(data.len() as u64);
                    tracing::debug!(
                        sequence = sequence,
                        key = %key,
                        bytes = data.len(),
                        "Downloaded ledger object"
                    );
                    return Some(data);
                }
                Err(e) if e.is_not_found() => {
                    if self.range.is_bounded() {
                        self.terminate(Error::ObjectNotFound { sequence, key });
                        return None;
                    }
                    metrics::FETCH_RETRIES_TOTAL
                        .with_label_values(&["not_found"])
                        .inc();
                    tracing::debug!(
                        sequence = sequence,
                        key = %key,
                        "Ledger object not exported yet, waiting"
                    );
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.retry_limit {
                        self.terminate(Error::RetriesExhausted {
                            key,
                            attempts: failures,
                            source: e,
                        });
                        return None;
                    }
                    metrics::FETCH_RETRIES_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    tracing::warn!(
                        sequence = sequence,
                        key = %key,
                        attempt = failures,
                        error = %e,
                        "Failed to download ledger object, retrying"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                _ = tokio::time::sleep(self.retry_wait) => {}
            }
        }
    }
}

async fn run_worker(shared: Arc<Shared>, worker_id: u32) {
    loop {
        let sequence = {
            let mut tasks = tokio::select! {
                biased;
                _ = shared.token.cancelled() => break,
                tasks = shared.task_rx.lock() => tasks,
            };
            tokio::select! {
                biased;
                _ = shared.token.cancelled() => break,
                task = tasks.recv() => match task {
                    Some(sequence) => sequence,
                    None => break,
                },
            }
        };
        shared.in_flight.fetch_add(1, AtomicOrdering::SeqCst);

        let Some(payload) = shared.download(sequence).await else {
            break;
        };
        shared.store_object(DownloadedObject {
            start_sequence: sequence,
            payload,
        });
    }

    tracing::trace!(worker_id = worker_id, "Ledger buffer worker stopped");
}

/// Concurrently prefetched, in-order stream of ledger batches for one range
pub struct LedgerBuffer {
    shared: Arc<Shared>,
    buffer_size: u32,
    decoder: Arc<dyn BatchDecoder>,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<DownloadedObject>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LedgerBuffer {
    /// Validate the configuration, fill the task queue and spawn the workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        range: Range,
        config: &BufferedStorageBackendConfig,
        data_store: Arc<dyn DataStore>,
        decoder: Arc<dyn BatchDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        let schema = data_store.schema().clone();
        schema
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let stride = schema.ledgers_per_file as u64;
        let first_task = schema.start_boundary(range.from()) as u64;
        let last_task = range.to().map(|to| schema.start_boundary(to) as u64);

        let buffer_size = match last_task {
            Some(last) => {
                let objects = (last - first_task) / stride + 1;
                objects.min(config.buffer_size as u64) as u32
            }
            None => config.buffer_size,
        };
        let num_workers = config.num_workers.min(buffer_size);

        let (task_tx, task_rx) = mpsc::channel(buffer_size as usize);
        let (ready_tx, ready_rx) = mpsc::channel(buffer_size as usize);

        let shared = Arc::new(Shared {
            range,
            schema,
            stride,
            last_task,
            first_task,
            retry_limit: config.retry_limit,
            retry_wait: config.retry_wait(),
            data_store,
            task_tx,
            task_rx: tokio::sync::Mutex::new(task_rx),
            ready_tx,
            state: Mutex::new(ReorderState {
                heap: BinaryHeap::with_capacity(buffer_size as usize),
                current: first_task,
                next_task: first_task,
            }),
            in_flight: AtomicU32::new(0),
            token: CancellationToken::new(),
            cause: OnceLock::new(),
        });

        for _ in 0..buffer_size {
            shared.push_task_queue();
        }

        let workers = (0..num_workers)
            .map(|id| tokio::spawn(run_worker(shared.clone(), id)))
            .collect();

        tracing::info!(
            range = %range,
            buffer_size = buffer_size,
            num_workers = num_workers,
            ledgers_per_file = stride,
            "Started ledger buffer"
        );

        Ok(Self {
            shared,
            buffer_size,
            decoder,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            workers: Mutex::new(workers),
        })
    }

    pub fn range(&self) -> Range {
        self.shared.range
    }

    /// Object capacity after clamping to the range
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Wait for the next object in sequence order and decode it.
    ///
    /// Every object taken frees one slot, which is refilled with the next
    /// task before decoding starts.
    pub async fn next_batch(&self) -> Result<LedgerBatch> {
        let object = {
            let mut ready = self.ready_rx.lock().await;
            tokio::select! {
                biased;
                _ = self.shared.token.cancelled() => return Err(self.shared.termination_error()),
                object = ready.recv() => match object {
                    Some(object) => object,
                    None => return Err(self.shared.termination_error()),
                },
            }
        };
        self.shared.publish_ready_depth();

        self.shared.push_task_queue();

        let sequence = object.start_sequence;
        let batch = self
            .decoder
            .decode(object.payload)
            .map_err(|source| self.shared.fail(Error::Decode { sequence, source }))?;

        if !batch.contains(sequence) {
            return Err(self.shared.fail(Error::BatchMismatch {
                sequence,
                start: batch.start_sequence(),
                end: batch.end_sequence(),
            }));
        }

        tracing::trace!(
            start = batch.start_sequence(),
            end = batch.end_sequence(),
            "Decoded ledger batch"
        );
        Ok(batch)
    }

    /// Highest ledger released to the ready queue, `None` before the first.
    pub fn latest_sequence(&self) -> Option<u32> {
        let current = self.shared.lock_state().current;
        if current == self.shared.first_task {
            return None;
        }

        let latest = (current - 1).min(u32::MAX as u64) as u32;
        Some(match self.shared.range.to() {
            Some(to) => latest.min(to),
            None => latest,
        })
    }

    /// Where the buffer's objects are right now.
    ///
    /// Taken under the reorder lock, reading `in_flight` before the task
    /// queue so a task moving between them is never counted twice.
    pub fn occupancy(&self) -> BufferOccupancy {
        let shared = &self.shared;
        let state = shared.lock_state();
        let in_flight = shared.in_flight.load(AtomicOrdering::SeqCst) as usize;
        let queued_tasks = shared.task_tx.max_capacity() - shared.task_tx.capacity();
        let ready = shared.ready_len();

        BufferOccupancy {
            queued_tasks,
            in_flight,
            reordering: state.heap.len(),
            ready,
        }
    }

    /// Whether the buffer has stopped, by failure or by `close`.
    pub fn is_terminated(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// The error every caller gets once the buffer has stopped.
    pub fn failure(&self) -> Option<Error> {
        self.is_terminated().then(|| self.shared.termination_error())
    }

    /// Set the ready-queue gauge from this buffer.
    pub(crate) fn publish_ready_depth(&self) {
        self.shared.publish_ready_depth();
    }

    /// Record `cause` and stop all workers without waiting for them.
    pub(crate) fn fail(&self, cause: Error) -> Error {
        self.shared.fail(cause)
    }

    /// Stop the workers and wait for them to exit. Safe to call repeatedly.
    pub async fn close(&self) {
        self.shared.terminate(Error::Closed);

        let workers = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    tracing::error!(
                        range = %self.shared.range,
                        error = %e,
                        "Ledger buffer worker panicked"
                    );
                }
            }
        }
        metrics::BUFFER_READY_OBJECTS.set(0);
    }
}

impl Drop for LedgerBuffer {
    fn drop(&mut self) {
        let _ = self.shared.cause.set(Arc::new(Error::Closed));
        self.shared.token.cancel();
    }
}
