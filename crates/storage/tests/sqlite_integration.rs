use chrono::{DateTime, Duration, Utc};
use quiz_core::Clock;
use quiz_core::model::{QbankId, QuizHistoryRecord};
use quiz_core::time::fixed_now;
use serde_json::json;
use sqlx::Row;
use storage::repository::{PrimaryStore, QuizHistoryRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_records_upsert_per_bucket_and_key() {
    let repo = connect("memdb_records").await;

    assert!(repo.get_record("questionMetrics", "metrics").await.unwrap().is_none());

    repo.put_record(
        "questionMetrics",
        "metrics",
        &json!({"1": {"status": "unused", "isFlagged": false}}),
    )
    .await
    .unwrap();
    repo.put_record(
        "questionMetrics",
        "metrics",
        &json!({"1": {"status": "correct", "isFlagged": true}}),
    )
    .await
    .unwrap();
    repo.put_record("otherBucket", "metrics", &json!({"x": 1}))
        .await
        .unwrap();

    let stored = repo
        .get_record("questionMetrics", "metrics")
        .await
        .unwrap()
        .expect("record present");
    assert_eq!(stored["1"]["status"], "correct");
    assert_eq!(stored["1"]["isFlagged"], true);

    let other = repo.get_record("otherBucket", "metrics").await.unwrap().unwrap();
    assert_eq!(other["x"], 1);
}

async fn updated_at(repo: &SqliteRepository) -> DateTime<Utc> {
    let row = sqlx::query("SELECT updated_at FROM kv_records WHERE bucket = ?1 AND key = ?2")
        .bind("questionMetrics")
        .bind("metrics")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    row.try_get("updated_at").unwrap()
}

#[tokio::test]
async fn sqlite_stamps_rows_from_the_injected_clock() {
    let url = "sqlite:file:memdb_clock?mode=memory&cache=shared";
    let later = fixed_now() + Duration::hours(2);
    let repo = SqliteRepository::connect(url)
        .await
        .expect("connect")
        .with_clock(Clock::fixed(fixed_now()));
    repo.migrate().await.expect("migrate");

    repo.put_record("questionMetrics", "metrics", &json!({}))
        .await
        .unwrap();
    assert_eq!(updated_at(&repo).await, fixed_now());

    let repo = repo.with_clock(Clock::fixed(later));
    repo.put_record("questionMetrics", "metrics", &json!({"1": {}}))
        .await
        .unwrap();
    assert_eq!(updated_at(&repo).await, later);

    let row = sqlx::query("SELECT applied_at FROM schema_migrations WHERE version = 1")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<DateTime<Utc>, _>("applied_at").unwrap(), fixed_now());
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    repo.put_record("b", "k", &json!([])).await.unwrap();
    assert!(repo.get_record("b", "k").await.unwrap().is_some());
}

#[tokio::test]
async fn sqlite_history_lists_newest_first() {
    let repo = connect("memdb_history").await;

    let older = QuizHistoryRecord::new(QbankId::new("cardio"), 2, 5, fixed_now());
    let newer = QuizHistoryRecord::new(
        QbankId::new("neuro"),
        4,
        5,
        fixed_now() + Duration::minutes(10),
    );
    repo.append_history(&older).await.unwrap();
    repo.append_history(&newer).await.unwrap();

    let listed = repo.list_history(10).await.unwrap();
    assert_eq!(listed, vec![newer.clone(), older.clone()]);

    let limited = repo.list_history(1).await.unwrap();
    assert_eq!(limited, vec![newer]);

    let err = repo.append_history(&older).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}
