//! Question catalog boundary.
//!
//! Banks may carry their questions inline or behind a loader that resolves on
//! first use. Everything downstream only sees [`QuestionCatalog::banks`], which
//! always yields fully resolved banks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use quiz_core::model::{Qbank, QbankId, Question};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::CatalogError;

/// Read-only source of truth for question banks.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Every bank with its questions resolved.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if any bank cannot be resolved.
    async fn banks(&self) -> Result<Vec<Qbank>, CatalogError>;

    /// A single bank by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the catalog cannot be resolved.
    async fn bank(&self, id: &QbankId) -> Result<Option<Qbank>, CatalogError> {
        Ok(self.banks().await?.into_iter().find(|bank| &bank.id == id))
    }
}

/// Deferred producer of a bank's questions.
#[async_trait]
pub trait QuestionLoader: Send + Sync {
    /// Load the questions.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the questions cannot be produced.
    async fn load(&self) -> Result<Vec<Question>, CatalogError>;
}

fn validate_all(questions: &[Question]) -> Result<(), CatalogError> {
    for question in questions {
        question
            .validate()
            .map_err(|source| CatalogError::InvalidQuestion {
                id: question.id,
                source,
            })?;
    }
    Ok(())
}

//
// ─── STATIC CATALOG ────────────────────────────────────────────────────────────
//

/// Catalog over an in-memory bank list that can be swapped at runtime.
#[derive(Default)]
pub struct StaticCatalog {
    banks: RwLock<Vec<Qbank>>,
    unavailable: AtomicBool,
}

impl StaticCatalog {
    #[must_use]
    pub fn new(banks: Vec<Qbank>) -> Self {
        Self {
            banks: RwLock::new(banks),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Replace the bank list, e.g. after questions were added or deleted.
    pub fn replace(&self, banks: Vec<Qbank>) {
        if let Ok(mut guard) = self.banks.write() {
            *guard = banks;
        }
    }

    /// Simulate a catalog that cannot be loaded.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuestionCatalog for StaticCatalog {
    async fn banks(&self) -> Result<Vec<Qbank>, CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog marked unavailable".into()));
        }
        self.banks
            .read()
            .map(|guard| guard.clone())
            .map_err(|err| CatalogError::Unavailable(err.to_string()))
    }
}

//
// ─── LAZY CATALOG ──────────────────────────────────────────────────────────────
//

/// Where a bank's questions come from.
pub enum QuestionSource {
    Ready(Vec<Question>),
    Deferred(Arc<dyn QuestionLoader>),
}

struct LazyBank {
    id: QbankId,
    name: String,
    description: Option<String>,
    source: QuestionSource,
    resolved: OnceCell<Vec<Question>>,
}

impl LazyBank {
    async fn questions(&self) -> Result<&[Question], CatalogError> {
        match &self.source {
            QuestionSource::Ready(questions) => Ok(questions),
            QuestionSource::Deferred(loader) => {
                let questions = self
                    .resolved
                    .get_or_try_init(|| async {
                        let questions = loader.load().await?;
                        validate_all(&questions)?;
                        tracing::debug!(bank = %self.id, count = questions.len(), "resolved deferred bank");
                        Ok::<_, CatalogError>(questions)
                    })
                    .await?;
                Ok(questions)
            }
        }
    }
}

/// Catalog whose banks resolve their questions at most once, on demand.
#[derive(Default)]
pub struct LazyCatalog {
    banks: Vec<LazyBank>,
}

impl LazyCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bank(
        mut self,
        id: QbankId,
        name: impl Into<String>,
        description: Option<String>,
        source: QuestionSource,
    ) -> Self {
        self.banks.push(LazyBank {
            id,
            name: name.into(),
            description,
            source,
            resolved: OnceCell::new(),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Build a catalog from a JSON manifest.
    ///
    /// The manifest is an array of banks. Each bank lists its `questions`
    /// inline, or names a `questionsFile` (relative to the manifest) that is
    /// only read when the bank is first needed.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the manifest cannot be read or parsed, or an
    /// inline question is invalid.
    pub async fn from_manifest(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = read_file(path).await?;
        let entries: Vec<ManifestBank> = serde_json::from_str(&raw)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut catalog = Self::new();
        for entry in entries {
            let source = match entry.questions_file {
                Some(file) => QuestionSource::Deferred(Arc::new(JsonFileLoader::new(base.join(file)))),
                None => {
                    validate_all(&entry.questions)?;
                    QuestionSource::Ready(entry.questions)
                }
            };
            catalog = catalog.with_bank(entry.id, entry.name, entry.description, source);
        }
        Ok(catalog)
    }
}

#[async_trait]
impl QuestionCatalog for LazyCatalog {
    async fn banks(&self) -> Result<Vec<Qbank>, CatalogError> {
        let mut banks = Vec::with_capacity(self.banks.len());
        for bank in &self.banks {
            let questions = bank.questions().await?.to_vec();
            banks.push(Qbank {
                id: bank.id.clone(),
                name: bank.name.clone(),
                description: bank.description.clone(),
                questions,
            });
        }
        Ok(banks)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestBank {
    id: QbankId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    questions: Vec<Question>,
    #[serde(default)]
    questions_file: Option<PathBuf>,
}

//
// ─── JSON FILE LOADER ──────────────────────────────────────────────────────────
//

/// Loads a bank's questions from a JSON array on disk.
pub struct JsonFileLoader {
    path: PathBuf,
}

impl JsonFileLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuestionLoader for JsonFileLoader {
    async fn load(&self) -> Result<Vec<Question>, CatalogError> {
        let raw = read_file(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

async fn read_file(path: &Path) -> Result<String, CatalogError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::QuestionId;
    use std::sync::atomic::AtomicUsize;

    fn question(id: u64, bank: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            QbankId::new(bank),
            format!("Q{id}"),
            vec!["a".into(), "b".into()],
            0,
        )
        .unwrap()
    }

    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuestionLoader for CountingLoader {
        async fn load(&self) -> Result<Vec<Question>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![question(10, "deferred"), question(11, "deferred")])
        }
    }

    #[tokio::test]
    async fn deferred_banks_resolve_once() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let catalog = LazyCatalog::new()
            .with_bank(
                QbankId::new("ready"),
                "Ready",
                None,
                QuestionSource::Ready(vec![question(1, "ready")]),
            )
            .with_bank(
                QbankId::new("deferred"),
                "Deferred",
                None,
                QuestionSource::Deferred(loader.clone()),
            );

        let first = catalog.banks().await.unwrap();
        let second = catalog.banks().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[1].questions.len(), 2);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bank_lookup_by_id() {
        let catalog = StaticCatalog::new(vec![Qbank::new(
            QbankId::new("cardio"),
            "Cardio",
            vec![question(1, "cardio")],
        )]);
        assert!(catalog.bank(&QbankId::new("cardio")).await.unwrap().is_some());
        assert!(catalog.bank(&QbankId::new("neuro")).await.unwrap().is_none());

        catalog.set_unavailable(true);
        assert!(catalog.banks().await.is_err());
    }

    #[tokio::test]
    async fn manifest_mixes_inline_and_file_banks() {
        let dir = tempfile::tempdir().unwrap();
        let questions = serde_json::to_string(&vec![question(7, "file")]).unwrap();
        std::fs::write(dir.path().join("file.json"), questions).unwrap();
        let manifest = serde_json::json!([
            {"id": "inline", "name": "Inline", "questions": [question(1, "inline")]},
            {"id": "file", "name": "From file", "questionsFile": "file.json"}
        ]);
        let manifest_path = dir.path().join("catalog.json");
        std::fs::write(&manifest_path, manifest.to_string()).unwrap();

        let catalog = LazyCatalog::from_manifest(&manifest_path).await.unwrap();
        assert_eq!(catalog.len(), 2);
        let banks = catalog.banks().await.unwrap();
        assert_eq!(banks[0].questions[0].id, QuestionId::new(1));
        assert_eq!(banks[1].questions[0].id, QuestionId::new(7));
    }

    #[tokio::test]
    async fn missing_question_file_fails_resolution() {
        let catalog = LazyCatalog::new().with_bank(
            QbankId::new("gone"),
            "Gone",
            None,
            QuestionSource::Deferred(Arc::new(JsonFileLoader::new("/nonexistent/questions.json"))),
        );
        let err = catalog.banks().await.unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
