pub mod actor;
pub mod applications;
pub mod fleet;
pub mod shipments;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::reconciliation::ReconciliationRecord;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(shipments::router())
        .merge(applications::router())
        .merge(fleet::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/reconciliation", get(reconciliation))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    shipments: usize,
    trucks: usize,
    acceptance_strategy: &'static str,
    pending_reconciliation: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        shipments: state.store.shipments().len(),
        trucks: state.fleet.trucks().len(),
        acceptance_strategy: state.acceptance.strategy_name(),
        pending_reconciliation: state.reconciliation.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn reconciliation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<ReconciliationRecord>>, AppError> {
    actor.require(Role::Admin, "review reconciliation records")?;
    Ok(Json(state.reconciliation.list()))
}
