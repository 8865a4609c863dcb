use async_trait::async_trait;
use quiz_core::model::QuizHistoryRecord;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage tier unavailable")]
    Unavailable,
}

/// Durable, asynchronous record store addressed by bucket and key.
///
/// Records are opaque JSON documents; callers own their shape.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Fetch a record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read. A missing record is
    /// `Ok(None)`, not an error.
    async fn get_record(&self, bucket: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn put_record(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError>;
}

/// Synchronous string key-value tier used when the primary store is unavailable.
pub trait FallbackCache: Send + Sync {
    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a raw value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Receives one record per completed or abandoned quiz.
#[async_trait]
pub trait QuizHistoryRepository: Send + Sync {
    /// Append a history record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a record with the same id exists, or
    /// other storage errors.
    async fn append_history(&self, record: &QuizHistoryRecord) -> Result<(), StorageError>;

    /// List records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if records cannot be read.
    async fn list_history(&self, limit: u32) -> Result<Vec<QuizHistoryRecord>, StorageError>;
}

//
// ─── IN-MEMORY BACKENDS ────────────────────────────────────────────────────────
//

/// In-memory primary store for tests and prototyping.
///
/// `set_unavailable(true)` makes every call fail with `StorageError::Unavailable`.
#[derive(Clone, Default)]
pub struct InMemoryPrimaryStore {
    records: Arc<Mutex<HashMap<(String, String), Value>>>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
}

impl InMemoryPrimaryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `put_record` calls so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl PrimaryStore for InMemoryPrimaryStore {
    async fn get_record(&self, bucket: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.check_available()?;
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(bucket.to_owned(), key.to_owned())).cloned())
    }

    async fn put_record(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError> {
        self.check_available()?;
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((bucket.to_owned(), key.to_owned()), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory fallback cache for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryFallbackCache {
    items: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryFallbackCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

impl FallbackCache for InMemoryFallbackCache {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// In-memory history collaborator.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    records: Arc<Mutex<Vec<QuizHistoryRecord>>>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizHistoryRepository for InMemoryHistory {
    async fn append_history(&self, record: &QuizHistoryRecord) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|existing| existing.id == record.id) {
            return Err(StorageError::Conflict);
        }
        guard.push(record.clone());
        Ok(())
    }

    async fn list_history(&self, limit: u32) -> Result<Vec<QuizHistoryRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

/// Bundles the storage tiers behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub primary: Arc<dyn PrimaryStore>,
    pub fallback: Arc<dyn FallbackCache>,
    pub history: Arc<dyn QuizHistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let primary: Arc<dyn PrimaryStore> = Arc::new(InMemoryPrimaryStore::new());
        let fallback: Arc<dyn FallbackCache> = Arc::new(InMemoryFallbackCache::new());
        let history: Arc<dyn QuizHistoryRepository> = Arc::new(InMemoryHistory::new());
        Self {
            primary,
            fallback,
            history,
        }
    }
}
