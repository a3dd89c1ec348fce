use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::engine::acceptance::AcceptanceOutcome;
use crate::engine::gateway;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::application::Application;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/applications", get(list_my_applications))
        .route(
            "/applications/:id",
            get(get_application).delete(deactivate_application),
        )
        .route("/applications/:id/accept", patch(accept_application))
        .route("/applications/:id/reject", patch(reject_application))
        .route("/applications/:id/cancel", patch(cancel_application))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

async fn list_my_applications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Application>>, AppError> {
    Ok(Json(gateway::list_my_applications(&state, &actor)?))
}

async fn get_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Application>, AppError> {
    Ok(Json(gateway::get_application(&state, &actor, id)?))
}

async fn deactivate_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Application>, AppError> {
    Ok(Json(gateway::deactivate_application(&state, &actor, id)?))
}

/// `200` once the shipment is confirmed, `202` when the bid is accepted but
/// the shipment still needs repair.
async fn accept_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let response = match gateway::accept_application(&state, &actor, id)? {
        AcceptanceOutcome::Confirmed(accepted) => {
            let rejected_application_ids: Vec<Uuid> = accepted
                .rejected
                .iter()
                .map(|application| application.id)
                .collect();
            (
                StatusCode::OK,
                Json(json!({
                    "application": accepted.application,
                    "shipment": accepted.shipment,
                    "rejected_application_ids": rejected_application_ids,
                })),
            )
                .into_response()
        }
        AcceptanceOutcome::Partial {
            application, error, ..
        } => (
            StatusCode::ACCEPTED,
            Json(json!({
                "application": application,
                "warning": "application accepted but the shipment was not fully updated",
                "error": error.to_json(),
            })),
        )
            .into_response(),
    };

    Ok(response)
}

async fn reject_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<Application>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(gateway::reject_application(&state, &actor, id, reason)?))
}

async fn cancel_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Application>, AppError> {
    Ok(Json(gateway::cancel_application(&state, &actor, id)?))
}
