#![forbid(unsafe_code)]

pub mod file_cache;
pub mod repository;
pub mod sqlite;

pub use file_cache::FileFallbackCache;
pub use repository::{
    FallbackCache, InMemoryFallbackCache, InMemoryHistory, InMemoryPrimaryStore, PrimaryStore,
    QuizHistoryRepository, Storage, StorageError,
};
