//! Checkout attempts

use shared::models::{CheckoutAttempt, CheckoutState};
use sqlx::PgPool;

const ATTEMPT_COLUMNS: &str =
    "token, client_key, payment_intent_id, total, created_at, expires_at, state";

#[derive(sqlx::FromRow)]
struct AttemptRow {
    token: String,
    client_key: Option<String>,
    payment_intent_id: Option<String>,
    total: Option<i64>,
    created_at: i64,
    expires_at: i64,
    state: String,
}

impl TryFrom<AttemptRow> for CheckoutAttempt {
    type Error = sqlx::Error;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let state = CheckoutState::from_db(&row.state)
            .ok_or_else(|| super::bad_column("checkout_attempts.state", &row.state))?;
        Ok(CheckoutAttempt {
            token: row.token,
            client_key: row.client_key,
            payment_intent_id: row.payment_intent_id,
            total: row.total,
            created_at: row.created_at,
            expires_at: row.expires_at,
            state,
        })
    }
}

pub async fn create(pool: &PgPool, attempt: &CheckoutAttempt) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO checkout_attempts (token, client_key, payment_intent_id, total, created_at, expires_at, state)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&attempt.token)
    .bind(&attempt.client_key)
    .bind(&attempt.payment_intent_id)
    .bind(attempt.total)
    .bind(attempt.created_at)
    .bind(attempt.expires_at)
    .bind(attempt.state.as_db())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<CheckoutAttempt>, sqlx::Error> {
    let row: Option<AttemptRow> = sqlx::query_as(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM checkout_attempts WHERE token = $1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    row.map(CheckoutAttempt::try_from).transpose()
}

pub async fn find_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<CheckoutAttempt>, sqlx::Error> {
    let row: Option<AttemptRow> = sqlx::query_as(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM checkout_attempts WHERE payment_intent_id = $1"
    ))
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;
    row.map(CheckoutAttempt::try_from).transpose()
}

/// Most recent active attempt for a client
pub async fn find_active_for_client(
    pool: &PgPool,
    client_key: &str,
) -> Result<Option<CheckoutAttempt>, sqlx::Error> {
    let row: Option<AttemptRow> = sqlx::query_as(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM checkout_attempts
         WHERE client_key = $1 AND state = 'active'
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(client_key)
    .fetch_optional(pool)
    .await?;
    row.map(CheckoutAttempt::try_from).transpose()
}

pub async fn attach_payment_intent(
    pool: &PgPool,
    token: &str,
    payment_intent_id: &str,
    total: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE checkout_attempts SET payment_intent_id = $1, total = $2 WHERE token = $3")
        .bind(payment_intent_id)
        .bind(total)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn extend(pool: &PgPool, token: &str, expires_at: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE checkout_attempts SET expires_at = $1 WHERE token = $2 AND state = 'active'")
        .bind(expires_at)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn transition(
    pool: &PgPool,
    token: &str,
    from: &[CheckoutState],
    to: CheckoutState,
) -> Result<bool, sqlx::Error> {
    let from: Vec<String> = from.iter().map(|s| s.as_db().to_string()).collect();
    let result = sqlx::query(
        "UPDATE checkout_attempts SET state = $1 WHERE token = $2 AND state = ANY($3)",
    )
    .bind(to.as_db())
    .bind(token)
    .bind(&from)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn expire_due(pool: &PgPool, now: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE checkout_attempts SET state = 'expired' WHERE state = 'active' AND expires_at <= $1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
