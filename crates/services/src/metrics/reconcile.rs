use std::collections::BTreeMap;

use quiz_core::model::{MetricsEntry, MetricsMap, Qbank, Question, QuestionId};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New entries without any history.
    pub inserted: usize,
    /// New entries rebuilt from the catalog's attempt history.
    pub reconstructed: usize,
    /// Existing entries whose flag was overwritten from the catalog.
    pub reflagged: usize,
    /// Entries dropped because their question left the catalog.
    pub removed: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.inserted + self.reconstructed + self.reflagged + self.removed > 0
    }
}

/// Bring `map` in line with the catalog.
///
/// Afterwards the key set of `map` equals the set of question ids across
/// `banks`. When an id appears in several banks the last occurrence wins.
pub fn reconcile(map: &mut MetricsMap, banks: &[Qbank]) -> ReconcileReport {
    let questions: BTreeMap<QuestionId, &Question> = banks
        .iter()
        .flat_map(|bank| bank.questions.iter())
        .map(|question| (question.id, question))
        .collect();

    let mut report = ReconcileReport::default();

    for (id, question) in &questions {
        match map.get_mut(*id) {
            Some(entry) => {
                if entry.is_flagged != question.is_flagged {
                    entry.is_flagged = question.is_flagged;
                    report.reflagged += 1;
                }
            }
            None => {
                let entry = match question.last_attempt() {
                    Some(attempt) => {
                        report.reconstructed += 1;
                        MetricsEntry::attempted(attempt.status(), attempt.date, question.is_flagged)
                    }
                    None => {
                        report.inserted += 1;
                        MetricsEntry::unused(question.is_flagged)
                    }
                };
                map.insert(*id, entry);
            }
        }
    }

    map.retain(|id, _| {
        let keep = questions.contains_key(&id);
        if !keep {
            report.removed += 1;
        }
        keep
    });

    report
}
