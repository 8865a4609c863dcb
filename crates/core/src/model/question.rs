use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::attempt::Attempt;
use crate::model::ids::{QbankId, QuestionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question has no answer options")]
    NoOptions,

    #[error("correct answer index {index} is out of range for {len} options")]
    CorrectAnswerOutOfRange { index: usize, len: usize },
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A multiple-choice question as supplied by the question catalog.
///
/// `attempts` is the catalog's own history for the question, oldest first. It
/// is only consulted when the metrics record for the question is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub qbank_id: QbankId,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub is_flagged: bool,
}

impl Question {
    /// Build a question without prior history.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NoOptions` if `options` is empty, or
    /// `QuestionError::CorrectAnswerOutOfRange` if `correct_answer` does not
    /// index into `options`.
    pub fn new(
        id: QuestionId,
        qbank_id: QbankId,
        question: impl Into<String>,
        options: Vec<String>,
        correct_answer: usize,
    ) -> Result<Self, QuestionError> {
        let question = Self {
            id,
            qbank_id,
            question: question.into(),
            options,
            correct_answer,
            explanation: None,
            tags: Vec::new(),
            attempts: Vec::new(),
            is_flagged: false,
        };
        question.validate()?;
        Ok(question)
    }

    /// Check option/answer consistency, e.g. after deserializing.
    ///
    /// # Errors
    ///
    /// See [`Question::new`].
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.options.is_empty() {
            return Err(QuestionError::NoOptions);
        }
        if self.correct_answer >= self.options.len() {
            return Err(QuestionError::CorrectAnswerOutOfRange {
                index: self.correct_answer,
                len: self.options.len(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: Vec<Attempt>) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn flagged(mut self, is_flagged: bool) -> Self {
        self.is_flagged = is_flagged;
        self
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_answer
    }

    /// Most recent catalog attempt, if any.
    #[must_use]
    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }
}

//
// ─── QBANK ────────────────────────────────────────────────────────────────────
//

/// A named collection of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qbank {
    pub id: QbankId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

impl Qbank {
    #[must_use]
    pub fn new(id: QbankId, name: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            questions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn options() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn rejects_out_of_range_answer() {
        let err = Question::new(QuestionId::new(1), QbankId::new("b"), "Q", options(), 3)
            .unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectAnswerOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn rejects_empty_options() {
        let err = Question::new(QuestionId::new(1), QbankId::new("b"), "Q", Vec::new(), 0)
            .unwrap_err();
        assert_eq!(err, QuestionError::NoOptions);
    }

    #[test]
    fn last_attempt_is_most_recent() {
        let id = QuestionId::new(4);
        let q = Question::new(id, QbankId::new("b"), "Q", options(), 1)
            .unwrap()
            .with_attempts(vec![
                Attempt::answered(id, 1, true, fixed_now()),
                Attempt::omitted(id, fixed_now()),
            ]);
        assert_eq!(q.last_attempt().unwrap().selected_answer, None);
        assert!(q.is_correct(1));
        assert!(!q.is_correct(0));
    }

    #[test]
    fn deserializes_minimal_catalog_entry() {
        let json = r#"{
            "id": 10,
            "qbankId": "cardio",
            "question": "Which?",
            "options": ["x", "y"],
            "correctAnswer": 1
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert!(q.attempts.is_empty());
        assert!(!q.is_flagged);
        q.validate().unwrap();
    }
}
