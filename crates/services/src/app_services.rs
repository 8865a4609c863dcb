use std::path::Path;
use std::sync::Arc;

use storage::file_cache::FileFallbackCache;
use storage::repository::{FallbackCache, QuizHistoryRepository, Storage};

use crate::Clock;
use crate::catalog::QuestionCatalog;
use crate::error::AppServicesError;
use crate::metrics::{MetricsStore, MetricsStoreConfig};
use crate::quiz::QuizRunner;

/// Assembles the metrics store, history and catalog for the app.
#[derive(Clone)]
pub struct QuizServices {
    clock: Clock,
    catalog: Arc<dyn QuestionCatalog>,
    metrics: Arc<MetricsStore>,
    history: Arc<dyn QuizHistoryRepository>,
}

impl QuizServices {
    /// Build services backed by `SQLite` with a JSON file as the fallback cache.
    ///
    /// Reconciles metrics against the catalog once before returning.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        cache_path: impl AsRef<Path>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let fallback: Arc<dyn FallbackCache> =
            Arc::new(FileFallbackCache::new(cache_path.as_ref()));
        let storage = Storage::sqlite(db_url, fallback, clock).await?;
        let services = Self::from_storage(storage, catalog, clock, MetricsStoreConfig::default());
        services.metrics.initialize().await;
        Ok(services)
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(catalog: Arc<dyn QuestionCatalog>, clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), catalog, clock, MetricsStoreConfig::default())
    }

    #[must_use]
    pub fn from_storage(
        storage: Storage,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Clock,
        config: MetricsStoreConfig,
    ) -> Self {
        let metrics = Arc::new(
            MetricsStore::new(
                clock,
                Arc::clone(&storage.primary),
                Arc::clone(&storage.fallback),
                Arc::clone(&catalog),
            )
            .with_config(config),
        );
        Self {
            clock,
            catalog,
            metrics,
            history: storage.history,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<dyn QuestionCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsStore> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn history(&self) -> Arc<dyn QuizHistoryRepository> {
        Arc::clone(&self.history)
    }

    /// A fresh quiz runner sharing this instance's stores.
    #[must_use]
    pub fn new_runner(&self) -> QuizRunner {
        QuizRunner::new(
            self.clock,
            Arc::clone(&self.catalog),
            Arc::clone(&self.metrics),
            Arc::clone(&self.history),
        )
    }

    /// Like [`QuizServices::new_runner`] with a deterministic question draw.
    #[must_use]
    pub fn seeded_runner(&self, seed: u64) -> QuizRunner {
        QuizRunner::with_seed(
            self.clock,
            Arc::clone(&self.catalog),
            Arc::clone(&self.metrics),
            Arc::clone(&self.history),
            seed,
        )
    }
}
