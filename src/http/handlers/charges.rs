use crate::domain::transaction::{err, CreateChargeRequest};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

pub async fn create_charge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChargeRequest>,
) -> impl IntoResponse {
    match state.charge_service.create(req, headers).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

#[derive(serde::Serialize)]
struct TransactionView {
    id: Uuid,
    status: &'static str,
    amount_minor: i64,
    currency: String,
    method_slug: String,
    payment_url: Option<String>,
    qr_payload: Option<String>,
    paid_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Donor-facing poll used by the "processing" page while a pending charge
/// resolves through the webhook path.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.transactions_repo.find_by_id(transaction_id).await {
        Ok(Some(tx)) => (
            StatusCode::OK,
            Json(TransactionView {
                id: tx.id,
                status: tx.status.as_str(),
                amount_minor: tx.amount_minor,
                currency: tx.currency,
                method_slug: tx.method_slug,
                payment_url: tx.payment_url,
                qr_payload: tx.qr_payload,
                paid_at: tx.paid_at,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(err("not_found", "no such transaction")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
