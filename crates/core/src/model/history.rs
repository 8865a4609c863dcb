use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ids::QbankId;

/// One finished or abandoned quiz, handed to the history collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizHistoryRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    pub score: u32,
    pub total_questions: u32,
    pub qbank_id: QbankId,
}

impl QuizHistoryRecord {
    /// Build a record with a freshly generated id.
    #[must_use]
    pub fn new(qbank_id: QbankId, score: u32, total_questions: u32, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            score,
            total_questions,
            qbank_id,
        }
    }

    /// Score as a fraction of the drawn questions, `0.0` for an empty quiz.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        f64::from(self.score) / f64::from(self.total_questions)
    }
}
