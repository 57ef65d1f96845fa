use crate::domain::transaction::{err, RecurringPeriod};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

/// Ops/cron entry point: charge everything due in the period. Idempotent;
/// a subscription charged by one invocation is not due for the next.
pub async fn run_due_charges(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> impl IntoResponse {
    let Some(period) = RecurringPeriod::parse(&period) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(err("invalid_period", "expected daily, weekly or monthly")),
        )
            .into_response();
    };

    match state.subscription_service.run_due_charges(period).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

async fn transition(result: anyhow::Result<bool>) -> axum::response::Response {
    match result {
        Ok(applied) => (StatusCode::OK, Json(serde_json::json!({ "applied": applied }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition(state.subscription_service.pause(id).await).await
}

pub async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition(state.subscription_service.resume(id).await).await
}

pub async fn cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition(state.subscription_service.cancel(id).await).await
}

pub async fn get_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions_repo.find_by_id(id).await {
        Ok(Some(sub)) => (StatusCode::OK, Json(sub)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(err("not_found", "no such subscription")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}
