use async_trait::async_trait;
use quiz_core::model::{QbankId, QuizHistoryRecord};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{QuizHistoryRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn map_history_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizHistoryRecord, StorageError> {
    let qbank_id: String = row.try_get("qbank_id").map_err(ser)?;
    Ok(QuizHistoryRecord {
        id: row.try_get("id").map_err(ser)?,
        date: row.try_get("date").map_err(ser)?,
        score: u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?,
        total_questions: u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        qbank_id: QbankId::new(qbank_id),
    })
}

#[async_trait]
impl QuizHistoryRepository for SqliteRepository {
    async fn append_history(&self, record: &QuizHistoryRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO quiz_history (id, date, score, total_questions, qbank_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(&record.id)
        .bind(record.date)
        .bind(i64::from(record.score))
        .bind(i64::from(record.total_questions))
        .bind(record.qbank_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn list_history(&self, limit: u32) -> Result<Vec<QuizHistoryRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, date, score, total_questions, qbank_id
                FROM quiz_history
                ORDER BY date DESC, rowid DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_history_row).collect()
    }
}
