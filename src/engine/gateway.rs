//! Entry points for every shipment and application mutation.
//!
//! Each operation checks the caller's role and the record's current status
//! before delegating to the state machines or the acceptance coordinator.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::acceptance::AcceptanceOutcome;
use crate::engine::fleet;
use crate::engine::lifecycle::{self, SubmitApplication};
use crate::engine::shipment_machine::{self, ForceAssignment, StatusChange, load_active};
use crate::error::AppError;
use crate::geo::within_radius_km;
use crate::models::actor::{Actor, Role};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::location::{GeoPoint, LocationSnapshot, LocationUpdate};
use crate::models::shipment::{Cargo, PaymentSnapshot, RoutePoint, Shipment, ShipmentStatus};
use crate::state::AppState;
use crate::storage::DocumentOps;

#[derive(Debug, Clone, Deserialize)]
pub struct NewShipment {
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    pub cargo: Cargo,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentEdit {
    pub origin: Option<RoutePoint>,
    pub destination: Option<RoutePoint>,
    pub cargo: Option<Cargo>,
    pub notes: Option<String>,
}

fn validate_route_point(label: &str, point: &RoutePoint) -> Result<(), AppError> {
    if point.address.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} address is required")));
    }
    if let Some(coordinates) = &point.coordinates {
        if !coordinates.is_valid() {
            return Err(AppError::Validation(format!("{label} coordinates are out of range")));
        }
    }
    if let Some(code) = &point.country_code {
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::Validation(format!(
                "{label} country code must have two letters, got {code:?}"
            )));
        }
    }
    Ok(())
}

fn validate_cargo(cargo: &Cargo) -> Result<(), AppError> {
    if cargo.description.trim().is_empty() {
        return Err(AppError::Validation("cargo description is required".to_string()));
    }
    if !cargo.weight_kg.is_finite() || cargo.weight_kg <= 0.0 {
        return Err(AppError::Validation(
            "cargo weight must be a positive number".to_string(),
        ));
    }
    if let Some(volume) = cargo.volume_m3 {
        if !volume.is_finite() || volume < 0.0 {
            return Err(AppError::Validation(
                "cargo volume cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn create_shipment(state: &AppState, actor: &Actor, draft: NewShipment) -> Result<Shipment, AppError> {
    actor.require(Role::Merchant, "create shipments")?;
    validate_route_point("origin", &draft.origin)?;
    validate_route_point("destination", &draft.destination)?;
    validate_cargo(&draft.cargo)?;

    let shipment = state.store.insert_shipment(Shipment::new(
        actor.id,
        draft.origin,
        draft.destination,
        draft.cargo,
        draft.notes,
    ))?;

    info!(shipment_id = %shipment.id, merchant_id = %actor.id, "shipment requested");
    Ok(shipment)
}

/// Route and cargo edits by the owning merchant while bidding is open.
pub fn update_shipment(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    edit: ShipmentEdit,
) -> Result<Shipment, AppError> {
    let current = load_active(state.store.documents(), shipment_id)?;
    ensure_merchant_or_admin(&current, actor)?;
    if current.status != ShipmentStatus::Requested {
        return Err(AppError::Conflict(format!(
            "shipment can only be edited in REQUESTED status (currently {})",
            current.status
        )));
    }

    if let Some(origin) = &edit.origin {
        validate_route_point("origin", origin)?;
    }
    if let Some(destination) = &edit.destination {
        validate_route_point("destination", destination)?;
    }
    if let Some(cargo) = &edit.cargo {
        validate_cargo(cargo)?;
    }

    state
        .store
        .update_shipment(shipment_id, ShipmentStatus::Requested, &mut |shipment: &mut Shipment| {
            if let Some(origin) = edit.origin.clone() {
                shipment.origin = origin;
            }
            if let Some(destination) = edit.destination.clone() {
                shipment.destination = destination;
            }
            if let Some(cargo) = edit.cargo.clone() {
                shipment.cargo = cargo;
            }
            if edit.notes.is_some() {
                shipment.notes = edit.notes.clone();
            }
            Ok(())
        })
}

pub fn update_status(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    change: StatusChange,
) -> Result<Shipment, AppError> {
    let (previous, updated) =
        shipment_machine::transition(state.store.documents(), shipment_id, change, actor)?;

    state
        .metrics
        .shipment_transitions_total
        .with_label_values(&[updated.status.as_str()])
        .inc();

    if updated.is_terminal() {
        if let (Some(truck_id), Some(driver_id)) = (updated.assigned_truck_id, updated.assigned_driver_id) {
            fleet::release(state.fleet.as_ref(), truck_id, driver_id);
        }
    }

    info!(
        shipment_id = %shipment_id,
        from = %previous.status,
        to = %updated.status,
        actor_role = %actor.role,
        "shipment status changed"
    );
    Ok(updated)
}

pub fn admin_assign(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    assignment: ForceAssignment,
) -> Result<Shipment, AppError> {
    let shipment = shipment_machine::force_assign(
        state.store.documents(),
        state.fleet.as_ref(),
        shipment_id,
        assignment,
        actor,
    )?;

    if let (Some(truck_id), Some(driver_id)) = (shipment.assigned_truck_id, shipment.assigned_driver_id) {
        fleet::reserve(state.fleet.as_ref(), truck_id, driver_id);
    }
    state
        .metrics
        .shipment_transitions_total
        .with_label_values(&[shipment.status.as_str()])
        .inc();

    info!(shipment_id = %shipment_id, admin_id = %actor.id, "shipment assigned by admin");
    Ok(shipment)
}

pub fn submit_application(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    request: SubmitApplication,
) -> Result<Application, AppError> {
    let result = lifecycle::submit(
        state.store.documents(),
        state.fleet.as_ref(),
        shipment_id,
        request,
        actor,
    );
    count_application_event(state, "submitted", &result);
    result
}

pub fn cancel_application(
    state: &AppState,
    actor: &Actor,
    application_id: Uuid,
) -> Result<Application, AppError> {
    let result = lifecycle::cancel(state.store.documents(), application_id, actor);
    count_application_event(state, "cancelled", &result);
    result
}

pub fn reject_application(
    state: &AppState,
    actor: &Actor,
    application_id: Uuid,
    reason: Option<String>,
) -> Result<Application, AppError> {
    let result = lifecycle::reject(state.store.documents(), application_id, reason, actor);
    count_application_event(state, "rejected", &result);
    result
}

pub fn accept_application(
    state: &AppState,
    actor: &Actor,
    application_id: Uuid,
) -> Result<AcceptanceOutcome, AppError> {
    state.acceptance.accept(application_id, actor)
}

fn count_application_event<T>(state: &AppState, outcome: &str, result: &Result<T, AppError>) {
    let label = if result.is_ok() { outcome } else { "refused" };
    state
        .metrics
        .applications_total
        .with_label_values(&[label])
        .inc();
}

/// Stores the driver's position and publishes it on the location feed.
pub fn report_location(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    point: GeoPoint,
) -> Result<LocationUpdate, AppError> {
    if !point.is_valid() {
        return Err(AppError::Validation(format!(
            "invalid coordinates ({}, {})",
            point.lat, point.lng
        )));
    }

    let current = load_active(state.store.documents(), shipment_id)?;
    let is_assigned_driver =
        actor.role == Role::Driver && current.assigned_driver_id == Some(actor.id);
    if !is_assigned_driver && !actor.is_admin() {
        return Err(AppError::Forbidden(format!(
            "only the driver assigned to shipment {shipment_id} can report its location"
        )));
    }
    if current.is_terminal() {
        return Err(AppError::Conflict(format!(
            "shipment {shipment_id} is {} and no longer tracked",
            current.status
        )));
    }

    let recorded_at = Utc::now();
    let updated = state
        .store
        .update_shipment(shipment_id, current.status, &mut |shipment: &mut Shipment| {
            shipment.current_location = Some(LocationSnapshot { point, recorded_at });
            Ok(())
        })?;

    let near_destination = updated
        .destination
        .coordinates
        .map(|destination| within_radius_km(&point, &destination, state.arrival_radius_km))
        .unwrap_or(false);

    let update = LocationUpdate {
        shipment_id,
        driver_id: updated.assigned_driver_id.unwrap_or(actor.id),
        point,
        recorded_at,
        near_destination,
    };
    let _ = state.location_events_tx.send(update.clone());

    Ok(update)
}

pub fn record_payment(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
    payment: PaymentSnapshot,
) -> Result<Shipment, AppError> {
    actor.require(Role::Admin, "record payments")?;
    if let Some(amount) = payment.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AppError::Validation(
                "payment amount cannot be negative".to_string(),
            ));
        }
    }
    if payment.currency.len() != 3 || !payment.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(format!(
            "currency must be a three-letter ISO code, got {:?}",
            payment.currency
        )));
    }

    let current = load_active(state.store.documents(), shipment_id)?;
    state
        .store
        .update_shipment(shipment_id, current.status, &mut |shipment: &mut Shipment| {
            shipment.payment = payment.clone();
            Ok(())
        })
}

/// Soft delete for shipments that reached `COMPLETED` or `CANCELLED`.
pub fn deactivate_shipment(state: &AppState, actor: &Actor, shipment_id: Uuid) -> Result<Shipment, AppError> {
    let current = load_active(state.store.documents(), shipment_id)?;
    ensure_merchant_or_admin(&current, actor)?;
    if !current.is_terminal() {
        return Err(AppError::Conflict(format!(
            "shipment {shipment_id} is {} and cannot be deactivated",
            current.status
        )));
    }

    state
        .store
        .update_shipment(shipment_id, current.status, &mut |shipment: &mut Shipment| {
            shipment.is_active = false;
            Ok(())
        })
}

pub fn deactivate_application(
    state: &AppState,
    actor: &Actor,
    application_id: Uuid,
) -> Result<Application, AppError> {
    let current = state
        .store
        .application(application_id)
        .filter(|application| application.is_active)
        .ok_or_else(|| AppError::NotFound(format!("application {application_id} not found")))?;
    if !actor.is_admin() && !(actor.role == Role::TruckOwner && current.owner_id == actor.id) {
        return Err(AppError::Forbidden(format!(
            "application {application_id} belongs to another truck owner"
        )));
    }
    if current.status == ApplicationStatus::Pending {
        return Err(AppError::Conflict(format!(
            "application {application_id} is still PENDING; cancel it first"
        )));
    }

    state
        .store
        .update_application(application_id, current.status, &mut |application: &mut Application| {
            application.is_active = false;
            Ok(())
        })
}

fn ensure_merchant_or_admin(shipment: &Shipment, actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() || (actor.role == Role::Merchant && shipment.merchant_id == actor.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "shipment {} belongs to another merchant",
            shipment.id
        )))
    }
}

fn can_view(shipment: &Shipment, actor: &Actor) -> bool {
    match actor.role {
        Role::Admin | Role::TruckOwner => true,
        Role::Merchant => shipment.merchant_id == actor.id,
        Role::Driver => shipment.assigned_driver_id == Some(actor.id),
    }
}

pub fn get_shipment(state: &AppState, actor: &Actor, shipment_id: Uuid) -> Result<Shipment, AppError> {
    let shipment = load_active(state.store.documents(), shipment_id)?;
    if can_view(&shipment, actor) {
        Ok(shipment)
    } else {
        Err(AppError::Forbidden(format!(
            "you cannot view shipment {shipment_id}"
        )))
    }
}

pub fn list_shipments(state: &AppState, actor: &Actor, status: Option<ShipmentStatus>) -> Vec<Shipment> {
    state
        .store
        .shipments()
        .into_iter()
        .filter(|shipment| shipment.is_active)
        .filter(|shipment| status.is_none_or(|status| shipment.status == status))
        .filter(|shipment| can_view(shipment, actor))
        .collect()
}

pub fn list_applications_for_shipment(
    state: &AppState,
    actor: &Actor,
    shipment_id: Uuid,
) -> Result<Vec<Application>, AppError> {
    let shipment = load_active(state.store.documents(), shipment_id)?;
    let applications = state
        .store
        .applications_for_shipment(shipment_id)
        .into_iter()
        .filter(|application| application.is_active);

    match actor.role {
        Role::Admin => Ok(applications.collect()),
        Role::Merchant if shipment.merchant_id == actor.id => Ok(applications.collect()),
        Role::TruckOwner => Ok(applications
            .filter(|application| application.owner_id == actor.id)
            .collect()),
        _ => Err(AppError::Forbidden(format!(
            "you cannot list applications for shipment {shipment_id}"
        ))),
    }
}

pub fn list_my_applications(state: &AppState, actor: &Actor) -> Result<Vec<Application>, AppError> {
    actor.require(Role::TruckOwner, "list their applications")?;
    Ok(state
        .store
        .applications_by_owner(actor.id)
        .into_iter()
        .filter(|application| application.is_active)
        .collect())
}

pub fn get_application(state: &AppState, actor: &Actor, application_id: Uuid) -> Result<Application, AppError> {
    let application = state
        .store
        .application(application_id)
        .filter(|application| application.is_active)
        .ok_or_else(|| AppError::NotFound(format!("application {application_id} not found")))?;

    let visible = match actor.role {
        Role::Admin => true,
        Role::TruckOwner => application.owner_id == actor.id,
        Role::Driver => application.driver_id == actor.id,
        Role::Merchant => state
            .store
            .shipment(application.shipment_id)
            .is_some_and(|shipment| shipment.merchant_id == actor.id),
    };

    if visible {
        Ok(application)
    } else {
        Err(AppError::Forbidden(format!(
            "you cannot view application {application_id}"
        )))
    }
}
