//! Shared fixtures for backend integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ledgerstream_backend::BufferedStorageBackendConfig;
use ledgerstream_core::{BatchEncoder, Compression, LedgerBatch};
use ledgerstream_storage::{DataStore, DataStoreSchema, Error as StorageError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// In-memory data store whose downloads can be held back per key.
///
/// A gated key blocks `get_file` until [`MockDataStore::release`] is called,
/// which lets tests choose the exact order in which downloads complete.
pub struct MockDataStore {
    schema: DataStoreSchema,
    objects: Mutex<HashMap<String, Bytes>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failures: Mutex<HashMap<String, u32>>,
    fetches: Mutex<HashMap<String, u32>>,
}

impl MockDataStore {
    pub fn new(ledgers_per_file: u32) -> Arc<Self> {
        Arc::new(Self {
            schema: DataStoreSchema::new(ledgers_per_file, 64000),
            objects: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
        })
    }

    pub fn key(&self, sequence: u32) -> String {
        self.schema.object_key(sequence)
    }

    /// Store the object covering `[start, end]` with payloads `ledger-{seq}`.
    pub fn insert_batch(&self, start: u32, end: u32) {
        let data = encode_batch(start, end);
        self.insert_raw(start, data);
    }

    /// Store every object covering `[from, to]`.
    pub fn insert_range(&self, from: u32, to: u32) {
        let lpf = self.schema.ledgers_per_file;
        let mut start = self.schema.start_boundary(from);
        while start <= to {
            self.insert_batch(start, start + lpf - 1);
            start += lpf;
        }
    }

    pub fn insert_raw(&self, start: u32, data: Bytes) {
        self.objects.lock().unwrap().insert(self.key(start), data);
    }

    /// Hold downloads of the object starting at `start` until released.
    pub fn gate(&self, start: u32) {
        self.gates
            .lock()
            .unwrap()
            .insert(self.key(start), Arc::new(Semaphore::new(0)));
    }

    /// Let one held download of the object starting at `start` finish.
    pub fn release(&self, start: u32) {
        if let Some(gate) = self.gates.lock().unwrap().get(&self.key(start)) {
            gate.add_permits(1);
        }
    }

    /// Make the next `count` downloads of `start` fail with a store error.
    pub fn fail_next(&self, start: u32, count: u32) {
        self.failures.lock().unwrap().insert(self.key(start), count);
    }

    pub fn fetch_count(&self, start: u32) -> u32 {
        self.fetches
            .lock()
            .unwrap()
            .get(&self.key(start))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DataStore for MockDataStore {
    async fn get_file(&self, key: &str) -> ledgerstream_storage::Result<Bytes> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;

        let gate = self.gates.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StorageError::ObjectStoreError(
                        object_store::Error::Generic {
                            store: "mock",
                            source: "injected failure".into(),
                        },
                    ));
                }
            }
        }

        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn exists(&self, key: &str) -> ledgerstream_storage::Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put_file(&self, key: &str, data: Bytes) -> ledgerstream_storage::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn put_file_if_not_exists(
        &self,
        key: &str,
        data: Bytes,
    ) -> ledgerstream_storage::Result<bool> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), data);
        Ok(true)
    }

    async fn list_file_paths(
        &self,
        prefix: Option<&str>,
        limit: usize,
    ) -> ledgerstream_storage::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .cloned()
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    fn schema(&self) -> &DataStoreSchema {
        &self.schema
    }
}

pub fn payload(sequence: u32) -> Bytes {
    Bytes::from(format!("ledger-{}", sequence))
}

/// Encoded object holding ledgers `[start, end]`.
pub fn encode_batch(start: u32, end: u32) -> Bytes {
    let batch = LedgerBatch::new(start, end, (start..=end).map(payload).collect()).unwrap();
    BatchEncoder::new(Compression::Lz4).encode(&batch).unwrap()
}

pub fn config(buffer_size: u32, num_workers: u32) -> BufferedStorageBackendConfig {
    BufferedStorageBackendConfig {
        buffer_size,
        num_workers,
        retry_limit: 3,
        retry_wait_ms: 5,
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", description);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Await `future`, failing the test if it takes longer than five seconds.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}
