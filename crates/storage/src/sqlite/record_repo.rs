use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{PrimaryStore, StorageError};

#[async_trait]
impl PrimaryStore for SqliteRepository {
    async fn get_record(&self, bucket: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT data
                FROM kv_records
                WHERE bucket = ?1 AND key = ?2
            ",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row
            .try_get("data")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn put_record(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError> {
        let body = serde_json::to_string(data)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
                INSERT INTO kv_records (bucket, key, data, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(bucket, key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(bucket)
        .bind(key)
        .bind(body)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
