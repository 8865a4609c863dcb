mod attempt;
mod history;
mod ids;
mod metrics;
mod question;

pub use ids::{ParseIdError, QbankId, QuestionId};

pub use attempt::Attempt;
pub use history::QuizHistoryRecord;
pub use metrics::{
    MetricsEntry, MetricsFilter, MetricsMap, MetricsSummary, PerformanceStatus,
    UnknownFilterError,
};
pub use question::{Qbank, Question, QuestionError};
