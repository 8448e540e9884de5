//! Payout HTTP handlers.
//!
//! - POST /api/v1/payouts - Request a payout (returns once initiated)
//! - GET  /api/v1/payouts/:id - Current ledger state with full history
//! - GET  /api/v1/payouts?creator_id=... - Paginated payout history
//! - POST /api/v1/payouts/batch - Bounded-concurrency batch run

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payout::{ErrorCode, Payout, PayoutRequest, PayoutResult};
use crate::services::batch::{self, BatchOptions};
use crate::services::payout_service;
use crate::state::AppState;

/// Request a payout.
///
/// # Request Body
///
/// ```json
/// {
///   "creator_id": "550e8400-...",
///   "amount": "50.00",
///   "source_currency": "USD",
///   "reason": "balance_withdrawal"
/// }
/// ```
///
/// # Response
///
/// Returns 201 with the `PayoutResult` once the transfer is initiated
/// (`status: "processing"`), not once money arrives. Business failures come
/// back as the same envelope with `success: false`, a code from the error
/// taxonomy, and a retryability flag.
pub async fn create_payout(
    State(state): State<AppState>,
    Json(request): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = payout_service::request_payout(&state.ctx, request).await?;
    Ok((status_for_result(&result), Json(result)))
}

fn status_for_result(result: &PayoutResult) -> StatusCode {
    if result.success {
        return StatusCode::CREATED;
    }
    match result.code {
        Some(ErrorCode::CreatorNotFound) => StatusCode::NOT_FOUND,
        Some(
            ErrorCode::InsufficientBalance
            | ErrorCode::InvalidBankAccount
            | ErrorCode::UnsupportedCountry,
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(_) => StatusCode::SERVICE_UNAVAILABLE,
        None => StatusCode::BAD_REQUEST,
    }
}

/// Get a payout by id, including its full status history.
pub async fn get_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> Result<Json<Payout>, AppError> {
    let payout = payout_service::get_payout_status(&state.ctx, payout_id).await?;
    Ok(Json(payout))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub creator_id: Uuid,

    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// List a creator's payouts, most-recent-first. `limit` caps at 100.
pub async fn list_payouts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Payout>>, AppError> {
    let payouts = payout_service::list_payout_history(
        &state.ctx,
        params.creator_id,
        params.limit,
        params.offset,
    )
    .await?;
    Ok(Json(payouts))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<PayoutRequest>,

    #[serde(default)]
    pub options: BatchOptions,
}

/// Run a batch of payouts with bounded concurrency.
///
/// # Response
///
/// Always 200 with the batch summary; per-item outcomes are in
/// `successful` / `failed`, and every submitted item is accounted for in
/// exactly one of them.
pub async fn batch_payouts(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.items.is_empty() {
        return Err(AppError::InvalidRequest("batch has no items".to_string()));
    }
    let result = batch::batch_payout(state.ctx.clone(), request.items, request.options).await;
    Ok(Json(result))
}
