use crate::domain::transaction::err;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct CreateDraftBody {
    pub organization_id: Uuid,
}

pub async fn create_draft(
    State(state): State<AppState>,
    Json(body): Json<CreateDraftBody>,
) -> impl IntoResponse {
    match state.partner_service.create_draft(body.organization_id).await {
        Ok(merchant) => (StatusCode::CREATED, Json(merchant)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize, Default)]
pub struct SubmitBody {
    pub external_partner_id: Option<String>,
    pub contract_id: Option<String>,
    pub payout_account_id: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    let result = state
        .partner_service
        .submit(
            id,
            body.external_partner_id.as_deref(),
            body.contract_id.as_deref(),
            body.payout_account_id.as_deref(),
        )
        .await;
    transition_response(result)
}

#[derive(serde::Deserialize, Default)]
pub struct ApproveBody {
    pub payout_account_status: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveBody>,
) -> impl IntoResponse {
    transition_response(
        state
            .partner_service
            .approve(id, body.payout_account_status.as_deref())
            .await,
    )
}

pub async fn reject(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition_response(state.partner_service.reject(id).await)
}

pub async fn block(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition_response(state.partner_service.block(id).await)
}

pub async fn reactivate(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    transition_response(state.partner_service.reactivate(id).await)
}

pub async fn list_payouts(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.partner_service.partner_payouts_repo.list_for_merchant(id).await {
        Ok(payouts) => (StatusCode::OK, Json(payouts)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

fn transition_response(result: anyhow::Result<bool>) -> axum::response::Response {
    match result {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({ "applied": true }))).into_response(),
        // Transition not legal from the current status; nothing changed.
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(err("invalid_transition", "merchant status does not allow this transition")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}
