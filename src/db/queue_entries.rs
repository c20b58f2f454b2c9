use sqlx::SqlitePool;

use crate::models::QueueEntryRow;

pub async fn insert(
    pool: &SqlitePool,
    queue: &str,
    payload: &str,
    created_at: i64,
    next_attempt: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO queue_entries (queue, payload, created_at, attempts, next_attempt)
         VALUES (?1, ?2, ?3, 0, ?4) RETURNING id",
    )
    .bind(queue)
    .bind(payload)
    .bind(created_at)
    .bind(next_attempt)
    .fetch_one(pool)
    .await
}

/// All pending entries of a queue in creation order.
pub async fn list(pool: &SqlitePool, queue: &str) -> Result<Vec<QueueEntryRow>, sqlx::Error> {
    sqlx::query_as::<_, QueueEntryRow>(
        "SELECT id, queue, payload, created_at, attempts, next_attempt
         FROM queue_entries WHERE queue = ?1
         ORDER BY id ASC",
    )
    .bind(queue)
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(
    pool: &SqlitePool,
    queue: &str,
    id: i64,
) -> Result<Option<QueueEntryRow>, sqlx::Error> {
    sqlx::query_as::<_, QueueEntryRow>(
        "SELECT id, queue, payload, created_at, attempts, next_attempt
         FROM queue_entries WHERE queue = ?1 AND id = ?2",
    )
    .bind(queue)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Merge attempt bookkeeping into an entry. Touches nothing if the entry is gone.
pub async fn update(
    pool: &SqlitePool,
    queue: &str,
    id: i64,
    attempts: Option<i64>,
    next_attempt: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE queue_entries
         SET attempts = COALESCE(?3, attempts),
             next_attempt = COALESCE(?4, next_attempt)
         WHERE queue = ?1 AND id = ?2",
    )
    .bind(queue)
    .bind(id)
    .bind(attempts)
    .bind(next_attempt)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a row was deleted.
pub async fn delete(pool: &SqlitePool, queue: &str, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM queue_entries WHERE queue = ?1 AND id = ?2")
        .bind(queue)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &SqlitePool, queue: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue_entries WHERE queue = ?1")
        .bind(queue)
        .fetch_one(pool)
        .await
}

/// The number of entries that have failed at least once.
pub async fn count_failing(pool: &SqlitePool, queue: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM queue_entries WHERE queue = ?1 AND attempts > 0",
    )
    .bind(queue)
    .fetch_one(pool)
    .await
}
