use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;
use crate::model::metrics::PerformanceStatus;

/// Outcome of answering (or timing out on) one question during a quiz.
///
/// `selected_answer` is `None` when the question was left unanswered.
/// `is_flagged` is `None` when the attempt says nothing about the flag; metrics
/// updates then keep whatever flag the question already had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub question_id: QuestionId,
    #[serde(default)]
    pub selected_answer: Option<usize>,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_flagged: Option<bool>,
    pub date: DateTime<Utc>,
}

impl Attempt {
    #[must_use]
    pub fn answered(
        question_id: QuestionId,
        selected_answer: usize,
        is_correct: bool,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id,
            selected_answer: Some(selected_answer),
            is_correct,
            is_flagged: None,
            date,
        }
    }

    #[must_use]
    pub fn omitted(question_id: QuestionId, date: DateTime<Utc>) -> Self {
        Self {
            question_id,
            selected_answer: None,
            is_correct: false,
            is_flagged: None,
            date,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, is_flagged: bool) -> Self {
        self.is_flagged = Some(is_flagged);
        self
    }

    /// Status this attempt leaves the question in.
    ///
    /// A missing selection always wins over `is_correct`.
    #[must_use]
    pub fn status(&self) -> PerformanceStatus {
        match self.selected_answer {
            None => PerformanceStatus::Omitted,
            Some(_) if self.is_correct => PerformanceStatus::Correct,
            Some(_) => PerformanceStatus::Incorrect,
        }
    }
}
