use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::{GateError, GateResult, ReauthError};
use crate::services::balances::InMemoryBalanceSource;
use crate::services::gate::TransactionGate;
use crate::services::sessions::SendSessionManager;
use crate::storage::SqliteSendRecorder;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SendSessionManager>,
    pub recorder: Arc<SqliteSendRecorder>,
    pub balances: Arc<InMemoryBalanceSource>,
}

fn error_status(e: &GateError) -> StatusCode {
    match e {
        GateError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GateError::Resolution(_) => StatusCode::BAD_REQUEST,
        GateError::Reauth(ReauthError::WrongPassword) => StatusCode::UNAUTHORIZED,
        GateError::Reauth(ReauthError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        GateError::Execution(_) => StatusCode::BAD_GATEWAY,
        GateError::Superseded(_) | GateError::InvalidTransition { .. } => StatusCode::CONFLICT,
    }
}

/// Current draft on success; on failure the error plus the draft, so the
/// client always sees where the gate ended up.
fn respond<T>(result: GateResult<T>, gate: &TransactionGate) -> Response {
    match result {
        Ok(_) => (StatusCode::OK, Json(gate.snapshot())).into_response(),
        Err(e) => {
            tracing::debug!("Send {} request failed: {}", gate.id(), e);
            (error_status(&e), Json(serde_json::json!({
                "error": e.to_string(),
                "draft": gate.snapshot(),
            }))).into_response()
        }
    }
}

fn not_found(id: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({
        "error": format!("Send draft not found: {}", id)
    }))).into_response()
}

pub async fn create_send(
    State(state): State<ApiState>,
) -> impl IntoResponse {
    match state.sessions.open() {
        Ok((_, gate)) => (StatusCode::CREATED, Json(gate.snapshot())).into_response(),
        Err(e) => (StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({
            "error": e.to_string()
        }))).into_response(),
    }
}

pub async fn get_send(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&id) {
        Ok(gate) => (StatusCode::OK, Json(gate.snapshot())).into_response(),
        Err(_) => not_found(&id),
    }
}

pub async fn discard_send(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.close(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found(&id),
    }
}

pub async fn set_recipient(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<RecipientRequest>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.set_recipient(&request.recipient);
    respond(result, &gate)
}

pub async fn set_amount(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<AmountRequest>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.set_amount(request.amount).await;
    respond(result, &gate)
}

pub async fn set_asset(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<AssetRequest>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.set_asset(&request.asset).await;
    respond(result, &gate)
}

pub async fn get_max_amount(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let max_amount = gate.max_amount().await;

    (StatusCode::OK, Json(serde_json::json!({
        "asset": gate.draft().asset_ticker,
        "max_amount": max_amount,
    }))).into_response()
}

pub async fn attempt_send(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.attempt_send().await;
    respond(result, &gate)
}

pub async fn confirm_amount(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.confirm_amount().await;
    respond(result, &gate)
}

pub async fn submit_password(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<PasswordRequest>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.submit_password(&request.password).await;
    respond(result, &gate)
}

pub async fn acknowledge_gas(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.acknowledge_gas_warning().await;
    respond(result, &gate)
}

pub async fn cancel_send(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(gate) = state.sessions.get(&id) else {
        return not_found(&id);
    };
    let result = gate.cancel().await;
    respond(result, &gate)
}

pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.recorder.list_recent(limit) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            tracing::error!("Error reading send history: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
                "error": e.to_string()
            }))).into_response()
        }
    }
}

pub async fn set_balance(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Json(request): Json<BalanceRequest>,
) -> impl IntoResponse {
    match state.balances.set(&ticker, request.amount) {
        Ok(()) => (StatusCode::OK, Json(state.balances.snapshot())).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({
            "error": e.to_string()
        }))).into_response(),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct RecipientRequest {
    pub recipient: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct AmountRequest {
    pub amount: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct AssetRequest {
    pub asset: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct BalanceRequest {
    pub amount: f64,
}

#[derive(Debug, serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}
