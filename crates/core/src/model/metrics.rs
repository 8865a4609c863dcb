use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

/// Where a question stands for the learner.
///
/// "Used" is not a status of its own; see [`PerformanceStatus::is_used`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceStatus {
    #[default]
    Unused,
    Correct,
    Incorrect,
    Omitted,
}

impl PerformanceStatus {
    #[must_use]
    pub fn is_used(self) -> bool {
        !matches!(self, PerformanceStatus::Unused)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceStatus::Unused => "unused",
            PerformanceStatus::Correct => "correct",
            PerformanceStatus::Incorrect => "incorrect",
            PerformanceStatus::Omitted => "omitted",
        }
    }
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ENTRY ────────────────────────────────────────────────────────────────────
//

/// Recorded performance for one question.
///
/// `last_attempt_date` is set the first time the status leaves `Unused` and is
/// never cleared afterwards, not even by a reset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEntry {
    pub status: PerformanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_flagged: bool,
}

impl MetricsEntry {
    #[must_use]
    pub fn unused(is_flagged: bool) -> Self {
        Self {
            status: PerformanceStatus::Unused,
            last_attempt_date: None,
            is_flagged,
        }
    }

    #[must_use]
    pub fn attempted(
        status: PerformanceStatus,
        attempted_at: DateTime<Utc>,
        is_flagged: bool,
    ) -> Self {
        Self {
            status,
            last_attempt_date: Some(attempted_at),
            is_flagged,
        }
    }
}

//
// ─── MAP ──────────────────────────────────────────────────────────────────────
//

/// Question identity to performance record.
///
/// Serializes as a JSON object keyed by the decimal question id, which is the
/// layout both storage tiers persist.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsMap(BTreeMap<QuestionId, MetricsEntry>);

impl MetricsMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: QuestionId) -> Option<&MetricsEntry> {
        self.0.get(&id)
    }

    pub fn get_mut(&mut self, id: QuestionId) -> Option<&mut MetricsEntry> {
        self.0.get_mut(&id)
    }

    pub fn insert(&mut self, id: QuestionId, entry: MetricsEntry) -> Option<MetricsEntry> {
        self.0.insert(id, entry)
    }

    /// Returns the entry for `id`, inserting an unused, unflagged one if missing.
    pub fn entry_or_unused(&mut self, id: QuestionId) -> &mut MetricsEntry {
        self.0.entry(id).or_insert_with(|| MetricsEntry::unused(false))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(QuestionId, &MetricsEntry) -> bool) {
        self.0.retain(|id, entry| keep(*id, entry));
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, &MetricsEntry)> {
        self.0.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn ids(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.0.keys().copied()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut MetricsEntry> {
        self.0.values_mut()
    }

    /// Counts per status plus derived `used` and `flagged` totals.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        self.0
            .values()
            .fold(MetricsSummary::default(), |mut acc, entry| {
                match entry.status {
                    PerformanceStatus::Unused => acc.unused += 1,
                    PerformanceStatus::Correct => acc.correct += 1,
                    PerformanceStatus::Incorrect => acc.incorrect += 1,
                    PerformanceStatus::Omitted => acc.omitted += 1,
                }
                if entry.status.is_used() {
                    acc.used += 1;
                }
                if entry.is_flagged {
                    acc.flagged += 1;
                }
                acc
            })
    }
}

impl FromIterator<(QuestionId, MetricsEntry)> for MetricsMap {
    fn from_iter<T: IntoIterator<Item = (QuestionId, MetricsEntry)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

//
// ─── SUMMARY ──────────────────────────────────────────────────────────────────
//

/// Aggregate counts over a metrics map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSummary {
    pub unused: usize,
    pub used: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub omitted: usize,
    pub flagged: usize,
}

impl MetricsSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.unused + self.used
    }
}

//
// ─── FILTER ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown metrics filter: {0}")]
pub struct UnknownFilterError(pub String);

/// Selection criteria used when picking questions by past performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricsFilter {
    Unused,
    Used,
    Correct,
    Incorrect,
    Omitted,
    Flagged,
}

impl MetricsFilter {
    /// Whether `entry` satisfies this filter.
    #[must_use]
    pub fn matches(self, entry: &MetricsEntry) -> bool {
        match self {
            MetricsFilter::Unused => entry.status == PerformanceStatus::Unused,
            MetricsFilter::Used => entry.status.is_used(),
            MetricsFilter::Correct => entry.status == PerformanceStatus::Correct,
            MetricsFilter::Incorrect => entry.status == PerformanceStatus::Incorrect,
            MetricsFilter::Omitted => entry.status == PerformanceStatus::Omitted,
            MetricsFilter::Flagged => entry.is_flagged,
        }
    }
}

impl FromStr for MetricsFilter {
    type Err = UnknownFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unused" => Ok(Self::Unused),
            "used" => Ok(Self::Used),
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            "omitted" => Ok(Self::Omitted),
            "flagged" => Ok(Self::Flagged),
            other => Err(UnknownFilterError(other.to_string())),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
