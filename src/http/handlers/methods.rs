use crate::domain::method::PaymentMethodConfig;
use crate::domain::transaction::err;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

pub async fn list_methods(State(state): State<AppState>) -> impl IntoResponse {
    match state.payment_methods_repo.list_all().await {
        Ok(methods) => (StatusCode::OK, Json(methods)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
pub struct CreateMethodBody {
    pub slug: String,
    pub gateway: String,
    pub title: String,
    #[serde(default)]
    pub fee_percent_bp: i32,
    #[serde(default)]
    pub fee_fixed_minor: i64,
    #[serde(default)]
    pub min_amount_minor: i64,
    #[serde(default)]
    pub max_amount_minor: i64,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub settings: serde_json::Value,
}

pub async fn create_method(
    State(state): State<AppState>,
    Json(body): Json<CreateMethodBody>,
) -> impl IntoResponse {
    let cfg = PaymentMethodConfig {
        id: Uuid::new_v4(),
        slug: body.slug,
        gateway: body.gateway,
        title: body.title,
        fee_percent_bp: body.fee_percent_bp,
        fee_fixed_minor: body.fee_fixed_minor,
        min_amount_minor: body.min_amount_minor,
        max_amount_minor: body.max_amount_minor,
        is_active: true,
        test_mode: body.test_mode,
        settings: body.settings,
        created_at: chrono::Utc::now(),
    };

    match state.payment_methods_repo.insert(&cfg).await {
        Ok(()) => (StatusCode::CREATED, Json(cfg)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
pub struct UpdateMethodBody {
    pub is_active: bool,
    pub min_amount_minor: i64,
    pub max_amount_minor: i64,
    pub fee_percent_bp: i32,
    pub fee_fixed_minor: i64,
}

pub async fn update_method(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<UpdateMethodBody>,
) -> impl IntoResponse {
    match state
        .payment_methods_repo
        .update(
            &slug,
            body.is_active,
            body.min_amount_minor,
            body.max_amount_minor,
            body.fee_percent_bp,
            body.fee_fixed_minor,
        )
        .await
    {
        Ok(0) => (StatusCode::NOT_FOUND, Json(err("not_found", "no such method"))).into_response(),
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "updated": true }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(err("internal_error", &e.to_string())),
        )
            .into_response(),
    }
}
