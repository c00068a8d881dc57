//! # Riftventory Web Server
//!
//! HTTP transport for the trade settlement engine. Every route is a thin
//! wrapper over one `TradeService` operation; the acting user comes from the
//! `X-User-Id` header.

use axum::{
    routing::{get, post},
    Router,
};
use configuration::Config;
use database::DbRepository;
use engine::{EngineOptions, TradeService};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod actor;
pub mod error;
pub mod extract;
pub mod handlers;

pub use actor::{Actor, ACTOR_HEADER};
pub use error::AppError;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TradeService>,
}

/// Builds the application router over an already constructed service.
pub fn router(service: Arc<TradeService>) -> Router {
    let app_state = Arc::new(AppState { service });
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/trades", post(handlers::create_trade).get(handlers::list_trades))
        .route("/trades/summary", get(handlers::trade_summary))
        .route("/trades/:trade_id", get(handlers::get_trade))
        .route("/trades/:trade_id/history", get(handlers::get_history))
        .route("/trades/:trade_id/accept", post(handlers::accept_trade))
        .route("/trades/:trade_id/reject", post(handlers::reject_trade))
        .route("/trades/:trade_id/cancel", post(handlers::cancel_trade))
        .route("/trades/:trade_id/counter", post(handlers::counter_offer))
        .route("/trades/:trade_id/confirm", post(handlers::confirm_trade))
        .route("/trades/:trade_id/unconfirm", post(handlers::unconfirm_trade))
        .route("/admin/trades/cleanup", post(handlers::cleanup))
        .with_state(app_state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
}

/// Connects to the database, applies migrations and serves until the process
/// is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;

    let db_pool = database::connect(&config.database).await?;
    database::run_migrations(&db_pool).await?;
    let db_repo = Arc::new(DbRepository::new(db_pool));
    let service = Arc::new(TradeService::new(db_repo, EngineOptions::from(config)));

    let app = router(service);

    tracing::info!(%addr, "Web server started and listening.");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
