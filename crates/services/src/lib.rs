#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog;
pub mod error;
pub mod metrics;
pub mod quiz;

pub use quiz_core::Clock;

pub use app_services::QuizServices;
pub use catalog::{JsonFileLoader, LazyCatalog, QuestionCatalog, QuestionLoader, QuestionSource, StaticCatalog};
pub use error::{AppServicesError, CatalogError, SessionError};
pub use metrics::{MetricsNotifier, MetricsStore, MetricsStoreConfig, MetricsSubscription, ReconcileReport};
pub use quiz::{
    Countdown, DEFAULT_TIME_LIMIT, Direction, QuizOptions, QuizProgress, QuizRunner, QuizSession,
    SessionEffect, SessionPhase,
};
