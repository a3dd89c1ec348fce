use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::fleet::on_open_shipment;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::fleet::{Truck, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fleet/trucks", post(register_truck).get(list_trucks))
        .route("/fleet/trucks/:id/availability", patch(update_truck_availability))
        .route("/fleet/users", post(register_user))
        .route("/fleet/users/:id/availability", patch(update_user_availability))
}

#[derive(Deserialize)]
pub struct RegisterTruckRequest {
    pub plate_number: String,
    pub capacity_kg: f64,
    /// Required when an admin registers a truck on an owner's behalf.
    pub owner_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub role: Role,
    pub employer_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

async fn register_truck(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<RegisterTruckRequest>,
) -> Result<(StatusCode, Json<Truck>), AppError> {
    let owner_id = match (actor.role, payload.owner_id) {
        (Role::TruckOwner, _) => actor.id,
        (Role::Admin, Some(owner_id)) => owner_id,
        (Role::Admin, None) => return Err(AppError::BadRequest("owner_id is required".to_string())),
        _ => {
            return Err(AppError::Forbidden(
                "only truck owners and admins can register trucks".to_string(),
            ))
        }
    };
    if payload.plate_number.trim().is_empty()
        || !payload.capacity_kg.is_finite()
        || payload.capacity_kg <= 0.0
    {
        return Err(AppError::BadRequest(
            "plate_number and a positive capacity_kg are required".to_string(),
        ));
    }

    let truck = state.fleet.upsert_truck(Truck {
        id: Uuid::new_v4(),
        owner_id,
        plate_number: payload.plate_number.trim().to_string(),
        capacity_kg: payload.capacity_kg,
        is_available: true,
        updated_at: Utc::now(),
    });
    Ok((StatusCode::CREATED, Json(truck)))
}

async fn list_trucks(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Truck>>, AppError> {
    if !matches!(actor.role, Role::Admin | Role::TruckOwner) {
        return Err(AppError::Forbidden("you cannot list trucks".to_string()));
    }
    let trucks = state
        .fleet
        .trucks()
        .into_iter()
        .filter(|truck| actor.is_admin() || truck.owner_id == actor.id)
        .collect();
    Ok(Json(trucks))
}

async fn update_truck_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<Truck>, AppError> {
    let truck = state
        .fleet
        .truck(id)
        .ok_or_else(|| AppError::NotFound(format!("truck {id} not found")))?;
    if !actor.is_admin() {
        if actor.role != Role::TruckOwner || truck.owner_id != actor.id {
            return Err(AppError::Forbidden(format!("truck {id} belongs to another owner")));
        }
        if on_open_shipment(state.store.as_ref(), id) {
            return Err(AppError::Conflict(format!("truck {id} is on an open shipment")));
        }
    }

    Ok(Json(state.fleet.set_truck_available(id, payload.is_available)?))
}

/// Admins register anyone; truck owners may register drivers they employ.
async fn register_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let employs_driver = actor.role == Role::TruckOwner
        && payload.role == Role::Driver
        && payload.employer_id == Some(actor.id);
    if !actor.is_admin() && !employs_driver {
        return Err(AppError::Forbidden(
            "truck owners may only register their own drivers".to_string(),
        ));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    let id = payload.id.unwrap_or_else(Uuid::new_v4);
    if state.fleet.user(id).is_some() {
        return Err(AppError::Conflict(format!("user {id} is already registered")));
    }

    let user = state.fleet.upsert_user(User {
        id,
        name: payload.name.trim().to_string(),
        role: payload.role,
        employer_id: payload.employer_id,
        is_available: true,
        updated_at: Utc::now(),
    });
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<User>, AppError> {
    if !actor.is_admin() {
        if actor.id != id {
            return Err(AppError::Forbidden(format!(
                "you cannot change availability of user {id}"
            )));
        }
        if on_open_shipment(state.store.as_ref(), id) {
            return Err(AppError::Conflict(format!("user {id} is on an open shipment")));
        }
    }

    Ok(Json(state.fleet.set_user_available(id, payload.is_available)?))
}
