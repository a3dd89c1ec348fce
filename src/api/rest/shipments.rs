use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::gateway::{self, NewShipment, ShipmentEdit};
use crate::engine::lifecycle::SubmitApplication;
use crate::engine::shipment_machine::{ForceAssignment, StatusChange};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::application::Application;
use crate::models::location::{GeoPoint, LocationUpdate};
use crate::models::shipment::{PaymentSnapshot, Shipment, ShipmentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route(
            "/shipments/:id",
            get(get_shipment).patch(update_shipment).delete(deactivate_shipment),
        )
        .route(
            "/shipments/:id/status",
            patch(update_status).post(update_status),
        )
        .route("/shipments/:id/assign", post(assign_shipment))
        .route("/shipments/:id/location", post(report_location))
        .route("/shipments/:id/payment", patch(record_payment))
        .route(
            "/shipments/:id/applications",
            get(list_applications).post(submit_application),
        )
}

#[derive(Deserialize)]
pub struct ListShipmentsQuery {
    pub status: Option<String>,
}

/// Status arrives as text so unknown values surface as validation errors.
#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub note: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub documents: Vec<String>,
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub location: GeoPoint,
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewShipment>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let shipment = gateway::create_shipment(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ListShipmentsQuery>,
) -> Result<Json<Vec<Shipment>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ShipmentStatus>)
        .transpose()?;
    Ok(Json(gateway::list_shipments(&state, &actor, status)))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(gateway::get_shipment(&state, &actor, id)?))
}

async fn update_shipment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShipmentEdit>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(gateway::update_shipment(&state, &actor, id, payload)?))
}

async fn deactivate_shipment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(gateway::deactivate_shipment(&state, &actor, id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Shipment>, AppError> {
    let change = StatusChange {
        status: payload.status.parse()?,
        note: payload.note,
        location: payload.location,
        documents: payload.documents,
    };
    Ok(Json(gateway::update_status(&state, &actor, id, change)?))
}

async fn assign_shipment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ForceAssignment>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(gateway::admin_assign(&state, &actor, id, payload)?))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<LocationUpdate>, AppError> {
    Ok(Json(gateway::report_location(
        &state,
        &actor,
        id,
        payload.location,
    )?))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentSnapshot>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(gateway::record_payment(&state, &actor, id, payload)?))
}

async fn list_applications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Application>>, AppError> {
    Ok(Json(gateway::list_applications_for_shipment(
        &state, &actor, id,
    )?))
}

async fn submit_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitApplication>,
) -> Result<(StatusCode, Json<Application>), AppError> {
    let application = gateway::submit_application(&state, &actor, id, payload)?;
    Ok((StatusCode::CREATED, Json(application)))
}
