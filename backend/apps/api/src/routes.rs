//! API Routes
//!
//! A deliberately small surface: the health probe and one mutating
//! endpoint that exercises the throttle layer end to end. The full trade
//! journal lives in the frontend-facing application; this service only
//! needs a downstream write to protect.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use kernel::error::app_error::AppResult;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeRequest {
    pub symbol: String,
    pub direction: String,
    pub amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeResponse {
    pub success: bool,
    pub trade_id: Uuid,
}

/// POST /api/trades
///
/// Wrapped by the rate limit and idempotency middleware in `main`; a
/// replayed request never reaches this handler.
pub async fn create_trade(
    State(state): State<ApiState>,
    Json(req): Json<CreateTradeRequest>,
) -> AppResult<impl IntoResponse> {
    let trade_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO trade_entries (symbol, direction, amount, notes)
        VALUES ($1, $2, $3, $4)
        RETURNING trade_id
        "#,
    )
    .bind(&req.symbol)
    .bind(&req.direction)
    .bind(req.amount)
    .bind(&req.notes)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(trade_id = %trade_id, symbol = %req.symbol, "Trade entry recorded");

    Ok((
        StatusCode::CREATED,
        Json(CreateTradeResponse {
            success: true,
            trade_id,
        }),
    ))
}
