//! GET /cron/cleanup — on-demand expiry sweep (bearer token guarded)

use axum::Json;
use axum::extract::State;
use shared::util::now_millis;

use crate::error::ServiceResult;
use crate::state::AppState;
use crate::sweeper::SweepReport;

pub async fn cleanup(State(state): State<AppState>) -> ServiceResult<Json<SweepReport>> {
    let report = state.sweeper.run_once(now_millis()).await?;
    tracing::info!(
        reservations = report.reservations_expired,
        idempotency_keys = report.idempotency_keys_cleaned,
        "Cron cleanup ran"
    );
    Ok(Json(report))
}
