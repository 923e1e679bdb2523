//! Fixed-window rate limit counters shared across instances

use sqlx::PgPool;

/// Count one hit for `key` in the window starting at `window_start`.
///
/// A stale window is reset in the same statement. Returns the hit count
/// inside the current window (including this one).
pub async fn hit(pool: &PgPool, key: &str, window_start: i64) -> Result<i32, sqlx::Error> {
    let (count,): (i32,) = sqlx::query_as(
        "INSERT INTO rate_limits (key, window_start, count) VALUES ($1, $2, 1)
         ON CONFLICT (key) DO UPDATE SET
            count = CASE WHEN rate_limits.window_start = EXCLUDED.window_start
                         THEN rate_limits.count + 1 ELSE 1 END,
            window_start = EXCLUDED.window_start
         RETURNING count",
    )
    .bind(key)
    .bind(window_start)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn purge_before(pool: &PgPool, window_start: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < $1")
        .bind(window_start)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
