use crate::service::webhook_service::IntakeResponse;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

fn respond(result: anyhow::Result<IntakeResponse>) -> axum::response::Response {
    match result {
        Ok(IntakeResponse::Stored) => (StatusCode::OK, "ok").into_response(),
        Ok(IntakeResponse::Unauthorized) => (StatusCode::UNAUTHORIZED, "invalid signature").into_response(),
        Ok(IntakeResponse::UnknownProvider) => (StatusCode::NOT_FOUND, "unknown provider").into_response(),
        // Not yet durably stored: a 5xx keeps the gateway retrying.
        Err(e) => {
            tracing::error!("webhook intake error: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage error").into_response()
        }
    }
}

pub async fn gateway_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    respond(state.webhook_service.receive(&provider, &headers, &body).await)
}

/// Payout notifications for sub-merchant settlement: a distinct event
/// stream, same durability pattern.
pub async fn payout_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    respond(
        state
            .partner_service
            .receive_payout_webhook(&provider, &headers, &body)
            .await,
    )
}
