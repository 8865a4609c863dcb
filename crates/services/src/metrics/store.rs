use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{
    Attempt, MetricsEntry, MetricsFilter, MetricsMap, MetricsSummary, PerformanceStatus, Question,
    QuestionId,
};
use storage::repository::{FallbackCache, PrimaryStore, StorageError};
use tracing::{debug, error, info, warn};

use super::notify::{MetricsNotifier, MetricsSubscription};
use super::reconcile::{ReconcileReport, reconcile};
use crate::catalog::QuestionCatalog;

/// Where the metrics record lives in each tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsStoreConfig {
    /// Primary store bucket holding the metrics record.
    pub bucket: String,
    /// Record key inside `bucket`.
    pub record_key: String,
    /// Fallback cache key holding the JSON copy.
    pub fallback_key: String,
}

impl Default for MetricsStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "questionMetrics".into(),
            record_key: "metrics".into(),
            fallback_key: "questionMetricsStore".into(),
        }
    }
}

/// Reconciling facade over the primary store and the fallback cache.
///
/// None of the public operations fail: storage errors degrade to the other tier
/// and are logged. Every operation that persists a change fires exactly one
/// notification on success.
///
/// A map that cannot be read is never treated as missing. When the primary
/// store errors and the fallback cache has no usable copy, reconciliation and
/// updates are skipped so the persisted map is not overwritten.
pub struct MetricsStore {
    clock: Clock,
    config: MetricsStoreConfig,
    primary: Arc<dyn PrimaryStore>,
    fallback: Arc<dyn FallbackCache>,
    catalog: Arc<dyn QuestionCatalog>,
    notifier: MetricsNotifier,
}

impl MetricsStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        primary: Arc<dyn PrimaryStore>,
        fallback: Arc<dyn FallbackCache>,
        catalog: Arc<dyn QuestionCatalog>,
    ) -> Self {
        Self {
            clock,
            config: MetricsStoreConfig::default(),
            primary,
            fallback,
            catalog,
            notifier: MetricsNotifier::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MetricsStoreConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MetricsStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn notifier(&self) -> &MetricsNotifier {
        &self.notifier
    }

    #[must_use]
    pub fn subscribe(&self) -> MetricsSubscription {
        self.notifier.subscribe()
    }

    /// Reconcile the persisted map against the catalog.
    ///
    /// Missing questions are added (rebuilt from catalog history when there is
    /// any), flags follow the catalog, and entries for deleted questions are
    /// dropped. Persists and notifies only if something changed. If the catalog
    /// or the persisted map cannot be loaded nothing is touched.
    pub async fn initialize(&self) -> ReconcileReport {
        let banks = match self.catalog.banks().await {
            Ok(banks) => banks,
            Err(err) => {
                warn!(error = %err, "catalog unavailable, skipping metrics reconciliation");
                return ReconcileReport::default();
            }
        };

        let mut map = match self.load_persisted().await {
            Ok(map) => map.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "metrics unreadable, skipping reconciliation");
                return ReconcileReport::default();
            }
        };
        let report = reconcile(&mut map, &banks);

        if report.is_changed() {
            info!(
                inserted = report.inserted,
                reconstructed = report.reconstructed,
                reflagged = report.reflagged,
                removed = report.removed,
                "metrics reconciled with catalog"
            );
            self.write(&map).await;
        } else {
            debug!(entries = map.len(), "metrics already in sync with catalog");
        }
        report
    }

    /// The full metrics map.
    ///
    /// Prefers the primary store, then the fallback cache. If neither holds a
    /// copy the map is initialized and read once more. An unreadable map reads
    /// as empty without initializing.
    pub async fn read(&self) -> MetricsMap {
        self.current().await.unwrap_or_else(|err| {
            warn!(error = %err, "metrics unreadable");
            MetricsMap::new()
        })
    }

    /// Persist `map` to both tiers.
    ///
    /// Notifies if at least one tier accepted the write. Returns whether the
    /// map was persisted anywhere.
    pub async fn write(&self, map: &MetricsMap) -> bool {
        let primary_ok = match serde_json::to_value(map) {
            Ok(value) => match self
                .primary
                .put_record(&self.config.bucket, &self.config.record_key, &value)
                .await
            {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "primary store write failed");
                    false
                }
            },
            Err(err) => {
                warn!(error = %err, "metrics map could not be encoded");
                false
            }
        };

        let fallback_ok = match self.write_fallback(map) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "fallback cache write failed");
                false
            }
        };

        if primary_ok || fallback_ok {
            self.notifier.notify();
            true
        } else {
            error!("metrics not persisted: both storage tiers failed");
            false
        }
    }

    /// Apply a quiz attempt to its question's entry.
    ///
    /// Status and last-attempt time are overwritten; the flag only changes if
    /// the attempt carries one.
    pub async fn record_attempt(&self, attempt: &Attempt) {
        let Some(mut map) = self.load_for_update("record_attempt").await else {
            return;
        };
        let entry = map.entry_or_unused(attempt.question_id);
        entry.status = attempt.status();
        entry.last_attempt_date = Some(self.clock.now());
        if let Some(flag) = attempt.is_flagged {
            entry.is_flagged = flag;
        }
        debug!(question = %attempt.question_id, status = %entry.status, "recording attempt");
        self.write(&map).await;
    }

    /// Set or clear a question's flag without touching its status.
    pub async fn set_flag(&self, question_id: QuestionId, is_flagged: bool) {
        let Some(mut map) = self.load_for_update("set_flag").await else {
            return;
        };
        map.entry_or_unused(question_id).is_flagged = is_flagged;
        self.write(&map).await;
    }

    /// Mark every question unused. Flags and last-attempt times are kept.
    pub async fn reset_all(&self) {
        let Some(mut map) = self.load_for_update("reset_all").await else {
            return;
        };
        for entry in map.entries_mut() {
            entry.status = PerformanceStatus::Unused;
        }
        info!(entries = map.len(), "resetting question metrics");
        self.write(&map).await;
    }

    /// Counts per status over a freshly reconciled map.
    pub async fn summarize(&self) -> MetricsSummary {
        self.initialize().await;
        self.read().await.summary()
    }

    /// Questions matching any of `filters`, judged by the fallback cache copy.
    ///
    /// Reads synchronously so it can run inside render paths. With no filters
    /// every question is returned; questions without an entry count as unused
    /// and unflagged.
    #[must_use]
    pub fn filter_questions(&self, questions: &[Question], filters: &[MetricsFilter]) -> Vec<Question> {
        if filters.is_empty() {
            return questions.to_vec();
        }

        let map = match self.read_fallback() {
            Ok(map) => map.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "fallback cache unreadable while filtering");
                MetricsMap::new()
            }
        };
        let untouched = MetricsEntry::unused(false);

        questions
            .iter()
            .filter(|question| {
                let entry = map.get(question.id).unwrap_or(&untouched);
                filters.iter().any(|filter| filter.matches(entry))
            })
            .cloned()
            .collect()
    }

    /// Persisted map, initializing first when neither tier holds one.
    async fn current(&self) -> Result<MetricsMap, StorageError> {
        if let Some(map) = self.load_persisted().await? {
            return Ok(map);
        }

        self.initialize().await;
        Ok(self.load_persisted().await?.unwrap_or_default())
    }

    async fn load_for_update(&self, operation: &'static str) -> Option<MetricsMap> {
        match self.current().await {
            Ok(map) => Some(map),
            Err(err) => {
                warn!(error = %err, operation, "metrics unreadable, update skipped");
                None
            }
        }
    }

    /// Primary copy, else fallback copy.
    ///
    /// `Ok(None)` means no tier holds a map. A fallback copy found while the
    /// primary store is merely empty is migrated into it. An error means the
    /// primary store failed and the fallback cache had nothing usable.
    async fn load_persisted(&self) -> Result<Option<MetricsMap>, StorageError> {
        let primary_err = match self.read_primary().await {
            Ok(Some(map)) => return Ok(Some(map)),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "primary store read failed, using fallback cache");
                Some(err)
            }
        };

        let map = match self.read_fallback() {
            Ok(Some(map)) => map,
            Ok(None) => return primary_err.map_or(Ok(None), Err),
            Err(err) => {
                warn!(error = %err, "fallback cache read failed");
                return primary_err.map_or(Ok(None), Err);
            }
        };

        // the primary copy may still exist; only fill it when it is known empty
        if primary_err.is_some() {
            return Ok(Some(map));
        }

        match serde_json::to_value(&map) {
            Ok(value) => {
                if let Err(err) = self
                    .primary
                    .put_record(&self.config.bucket, &self.config.record_key, &value)
                    .await
                {
                    warn!(error = %err, "could not migrate fallback metrics into primary store");
                } else {
                    info!(entries = map.len(), "migrated metrics from fallback cache");
                }
            }
            Err(err) => warn!(error = %err, "metrics map could not be encoded"),
        }
        Ok(Some(map))
    }

    async fn read_primary(&self) -> Result<Option<MetricsMap>, StorageError> {
        let Some(value) = self
            .primary
            .get_record(&self.config.bucket, &self.config.record_key)
            .await?
        else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    fn read_fallback(&self) -> Result<Option<MetricsMap>, StorageError> {
        let Some(raw) = self.fallback.get_item(&self.config.fallback_key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    fn write_fallback(&self, map: &MetricsMap) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(map).map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.fallback.set_item(&self.config.fallback_key, &raw)
    }
}
