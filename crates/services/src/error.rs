//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QbankId, QuestionError, QuestionId};
use storage::sqlite::SqliteInitError;

/// Errors raised while resolving the question catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("question catalog unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question {id} is invalid: {source}")]
    InvalidQuestion {
        id: QuestionId,
        #[source]
        source: QuestionError,
    },
}

/// Errors emitted when a quiz session cannot be started.
///
/// Transitions on a running session never fail; invalid ones are no-ops.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for quiz")]
    Empty,
    #[error("unknown question bank: {0}")]
    UnknownBank(QbankId),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
