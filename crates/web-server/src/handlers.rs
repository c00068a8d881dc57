use crate::{
    actor::Actor,
    error::AppError,
    extract::{Json, Path, Query},
    AppState,
};
use axum::{extract::State, http::StatusCode};
use engine::{
    CleanupReport, CounterOffer, CreateTrade, TradeFilter, TradeHistory, TradeSummary, TradeView,
};
use core_types::TradeRecord;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    pub retention_days: Option<u32>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}
fn default_dry_run() -> bool { true }

/// # POST /trades
pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(request): Json<CreateTrade>,
) -> Result<(StatusCode, Json<TradeView>), AppError> {
    let view = state.service.create_trade(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// # GET /trades?status=&role=
/// The acting user's trades, newest first.
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(filter): Query<TradeFilter>,
) -> Result<Json<Vec<TradeRecord>>, AppError> {
    let trades = state.service.list_trades(&actor, filter).await?;
    Ok(Json(trades))
}

/// # GET /trades/summary
pub async fn trade_summary(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<TradeSummary>, AppError> {
    let summary = state.service.trade_summary(&actor).await?;
    Ok(Json(summary))
}

/// # GET /trades/:trade_id
pub async fn get_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TradeView>, AppError> {
    let view = state.service.get_trade(trade_id).await?;
    Ok(Json(view))
}

/// # GET /trades/:trade_id/history
/// The whole negotiation chain's log, whichever offer in it is asked for.
pub async fn get_history(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TradeHistory>, AppError> {
    let history = state.service.get_history(trade_id).await?;
    Ok(Json(history))
}

/// # POST /trades/:trade_id/accept
pub async fn accept_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<TradeView>, AppError> {
    Ok(Json(state.service.accept_trade(trade_id, &actor).await?))
}

/// # POST /trades/:trade_id/reject
pub async fn reject_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<TradeView>, AppError> {
    Ok(Json(state.service.reject_trade(trade_id, &actor).await?))
}

/// # POST /trades/:trade_id/cancel
/// The body is optional; `{"reason": "..."}` is stored on the record.
pub async fn cancel_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    body: Option<Json<CancelBody>>,
) -> Result<Json<TradeView>, AppError> {
    let reason = body.and_then(|Json(body)| body.reason);
    Ok(Json(state.service.cancel_trade(trade_id, &actor, reason).await?))
}

/// # POST /trades/:trade_id/counter
pub async fn counter_offer(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(request): Json<CounterOffer>,
) -> Result<(StatusCode, Json<TradeView>), AppError> {
    let view = state.service.counter_offer(trade_id, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// # POST /trades/:trade_id/confirm
pub async fn confirm_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<TradeView>, AppError> {
    Ok(Json(state.service.confirm_trade(trade_id, &actor).await?))
}

/// # POST /trades/:trade_id/unconfirm
pub async fn unconfirm_trade(
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<TradeView>, AppError> {
    Ok(Json(state.service.unconfirm_trade(trade_id, &actor).await?))
}

/// # POST /admin/trades/cleanup?retention_days=&dry_run=
/// Dry run unless `dry_run=false` is passed explicitly.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<CleanupReport>, AppError> {
    let report = state.service.cleanup(params.retention_days, params.dry_run).await?;
    Ok(Json(report))
}
