//! Reservations + stock ledger
//!
//! Every function that can change availability locks the affected
//! `variants` rows (`FOR UPDATE`) before reading held quantities, so
//! check-and-reserve is serialized per variant.

use shared::models::{Reservation, ReservationState};
use sqlx::{PgConnection, PgPool};

use crate::store::{CommitOutcome, LateSettlement, NewReservation, ReserveOutcome};

const RESERVATION_COLUMNS: &str =
    "id, variant_id, quantity, checkout_token, created_at, expires_at, state";

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    variant_id: i64,
    quantity: i64,
    checkout_token: String,
    created_at: i64,
    expires_at: i64,
    state: String,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = sqlx::Error;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let state = ReservationState::from_db(&row.state)
            .ok_or_else(|| super::bad_column("reservations.state", &row.state))?;
        Ok(Reservation {
            id: row.id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            checkout_token: row.checkout_token,
            created_at: row.created_at,
            expires_at: row.expires_at,
            state,
        })
    }
}

fn into_reservations(rows: Vec<ReservationRow>) -> Result<Vec<Reservation>, sqlx::Error> {
    rows.into_iter().map(Reservation::try_from).collect()
}

/// Sum of active, unexpired holds on a variant, optionally excluding one checkout
async fn held_quantity(
    conn: &mut PgConnection,
    variant_id: i64,
    now: i64,
    exclude_token: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let (held,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM reservations
         WHERE variant_id = $1 AND state = 'active' AND expires_at > $2
           AND ($3::TEXT IS NULL OR checkout_token <> $3)",
    )
    .bind(variant_id)
    .bind(now)
    .bind(exclude_token)
    .fetch_one(&mut *conn)
    .await?;
    Ok(held)
}

async fn lock_stock(conn: &mut PgConnection, variant_id: i64) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT stock FROM variants WHERE id = $1 FOR UPDATE")
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.0))
}

async fn decrement_stock(
    conn: &mut PgConnection,
    variant_id: i64,
    quantity: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE variants SET stock = stock - $1 WHERE id = $2")
        .bind(quantity)
        .bind(variant_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn available(pool: &PgPool, variant_id: i64, now: i64) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT v.stock - COALESCE((
            SELECT SUM(r.quantity) FROM reservations r
            WHERE r.variant_id = v.id AND r.state = 'active' AND r.expires_at > $2
         ), 0)::BIGINT
         FROM variants v WHERE v.id = $1",
    )
    .bind(variant_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

pub async fn try_reserve(
    pool: &PgPool,
    new: &NewReservation,
    now: i64,
) -> Result<ReserveOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let Some(stock) = lock_stock(&mut tx, new.variant_id).await? else {
        tx.rollback().await?;
        return Ok(ReserveOutcome::UnknownVariant);
    };

    // the variant row lock serializes inserts for this (variant, token) pair
    let held: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM reservations WHERE variant_id = $1 AND checkout_token = $2",
    )
    .bind(new.variant_id)
    .bind(&new.checkout_token)
    .fetch_optional(&mut *tx)
    .await?;
    if held.is_some() {
        tx.rollback().await?;
        return Ok(ReserveOutcome::AlreadyHeld);
    }

    let available = stock - held_quantity(&mut tx, new.variant_id, now, None).await?;
    if available < new.quantity {
        tx.rollback().await?;
        return Ok(ReserveOutcome::Insufficient {
            available: available.max(0),
        });
    }

    sqlx::query(
        "INSERT INTO reservations (id, variant_id, quantity, checkout_token, created_at, expires_at, state)
         VALUES ($1, $2, $3, $4, $5, $6, 'active')",
    )
    .bind(new.id)
    .bind(new.variant_id)
    .bind(new.quantity)
    .bind(&new.checkout_token)
    .bind(new.created_at)
    .bind(new.expires_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ReserveOutcome::Reserved(new.clone().into_reservation()))
}

pub async fn transition_ids(
    pool: &PgPool,
    ids: &[i64],
    to: ReservationState,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "UPDATE reservations SET state = $1
         WHERE id = ANY($2) AND state = 'active'
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(to.as_db())
    .bind(ids)
    .fetch_all(pool)
    .await?;
    into_reservations(rows)
}

pub async fn transition_token(
    pool: &PgPool,
    checkout_token: &str,
    to: ReservationState,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "UPDATE reservations SET state = $1
         WHERE checkout_token = $2 AND state = 'active'
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(to.as_db())
    .bind(checkout_token)
    .fetch_all(pool)
    .await?;
    into_reservations(rows)
}

pub async fn extend_token(
    pool: &PgPool,
    checkout_token: &str,
    now: i64,
    expires_at: i64,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "UPDATE reservations SET expires_at = $1
         WHERE checkout_token = $2 AND state = 'active' AND expires_at > $3
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(expires_at)
    .bind(checkout_token)
    .bind(now)
    .fetch_all(pool)
    .await?;
    into_reservations(rows)
}

/// Commit every active reservation of a checkout.
///
/// Holds still inside their window are committed unconditionally (their units
/// were already excluded from everyone else's availability). A hold that is
/// past expiry but not yet swept is committed only if the stock still covers
/// it after every other live hold; otherwise it is marked expired and
/// reported as lapsed.
pub async fn commit_token(
    pool: &PgPool,
    checkout_token: &str,
    now: i64,
) -> Result<CommitOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let variant_ids: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT variant_id FROM reservations
         WHERE checkout_token = $1 AND state = 'active' ORDER BY variant_id",
    )
    .bind(checkout_token)
    .fetch_all(&mut *tx)
    .await?;

    let mut outcome = CommitOutcome::default();
    if variant_ids.is_empty() {
        tx.commit().await?;
        return Ok(outcome);
    }

    // Lock order: variants by id, then the checkout's reservations
    for (variant_id,) in &variant_ids {
        lock_stock(&mut tx, *variant_id).await?;
    }

    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations
         WHERE checkout_token = $1 AND state = 'active'
         ORDER BY variant_id FOR UPDATE"
    ))
    .bind(checkout_token)
    .fetch_all(&mut *tx)
    .await?;

    for mut reservation in into_reservations(rows)? {
        let covered = if reservation.expires_at > now {
            true
        } else {
            let (stock,): (i64,) = sqlx::query_as("SELECT stock FROM variants WHERE id = $1")
                .bind(reservation.variant_id)
                .fetch_one(&mut *tx)
                .await?;
            let others =
                held_quantity(&mut tx, reservation.variant_id, now, Some(checkout_token)).await?;
            stock - others >= reservation.quantity
        };

        let next = if covered {
            ReservationState::Committed
        } else {
            ReservationState::Expired
        };
        sqlx::query("UPDATE reservations SET state = $1 WHERE id = $2 AND state = 'active'")
            .bind(next.as_db())
            .bind(reservation.id)
            .execute(&mut *tx)
            .await?;
        reservation.state = next;

        if covered {
            decrement_stock(&mut tx, reservation.variant_id, reservation.quantity).await?;
            outcome.committed.push(reservation);
        } else {
            outcome.lapsed.push(reservation);
        }
    }

    tx.commit().await?;
    Ok(outcome)
}

pub async fn settle_late(
    pool: &PgPool,
    reservation: &Reservation,
    now: i64,
) -> Result<LateSettlement, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let Some(stock) = lock_stock(&mut tx, reservation.variant_id).await? else {
        tx.rollback().await?;
        return Ok(LateSettlement::Shortfall);
    };

    let claimed = sqlx::query(
        "INSERT INTO late_settlements (reservation_id, consumed, created_at)
         VALUES ($1, FALSE, $2) ON CONFLICT DO NOTHING",
    )
    .bind(reservation.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(LateSettlement::AlreadySettled);
    }

    let available = stock - held_quantity(&mut tx, reservation.variant_id, now, None).await?;
    let settlement = if available >= reservation.quantity {
        decrement_stock(&mut tx, reservation.variant_id, reservation.quantity).await?;
        sqlx::query("UPDATE late_settlements SET consumed = TRUE WHERE reservation_id = $1")
            .bind(reservation.id)
            .execute(&mut *tx)
            .await?;
        LateSettlement::Consumed
    } else {
        LateSettlement::Shortfall
    };

    tx.commit().await?;
    Ok(settlement)
}

pub async fn expire_due(pool: &PgPool, now: i64, limit: i64) -> Result<Vec<Reservation>, sqlx::Error> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "UPDATE reservations SET state = 'expired'
         WHERE id IN (
             SELECT id FROM reservations
             WHERE state = 'active' AND expires_at <= $1
             ORDER BY expires_at
             LIMIT $2
             FOR UPDATE SKIP LOCKED
         ) AND state = 'active'
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    into_reservations(rows)
}

pub async fn find_by_token(
    pool: &PgPool,
    checkout_token: &str,
) -> Result<Vec<Reservation>, sqlx::Error> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE checkout_token = $1 ORDER BY id"
    ))
    .bind(checkout_token)
    .fetch_all(pool)
    .await?;
    into_reservations(rows)
}
