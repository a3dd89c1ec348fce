//! Shipment status transitions.
//!
//! Transitions are gated by who is asking and what the shipment's current
//! status is. There is no adjacency table: any status a role may target is
//! reachable from any status that role may act on, and admins may move a
//! shipment anywhere.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::fleet::{Truck, User};
use crate::models::location::GeoPoint;
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::storage::{DocumentOps, FleetDirectory};

use crate::models::shipment::ShipmentStatus::*;

const DRIVER_ACTS_ON: &[ShipmentStatus] = &[
    Confirmed, Assigned, Loading, InTransit, AtBorder, Unloading, Delayed,
];
const DRIVER_TARGETS: &[ShipmentStatus] = &[
    Assigned, Loading, InTransit, AtBorder, Unloading, Delivered, Delayed,
];
const MERCHANT_ACTS_ON: &[ShipmentStatus] = &[Requested, Confirmed, Delivered];
const ASSIGNABLE: &[ShipmentStatus] = &[Requested, Confirmed];

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: ShipmentStatus,
    pub note: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForceAssignment {
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub note: Option<String>,
}

/// Role and current-status check for moving `shipment` to `target`.
pub fn check_permitted(
    shipment: &Shipment,
    actor: &Actor,
    target: ShipmentStatus,
) -> Result<(), AppError> {
    if shipment.status == target {
        return Err(AppError::Conflict(format!(
            "shipment {} is already {}",
            shipment.id, target
        )));
    }

    match actor.role {
        Role::Admin => Ok(()),
        Role::Merchant => {
            if shipment.merchant_id != actor.id {
                return Err(AppError::Forbidden(format!(
                    "shipment {} belongs to another merchant",
                    shipment.id
                )));
            }
            if !MERCHANT_ACTS_ON.contains(&shipment.status) {
                return Err(AppError::Conflict(format!(
                    "merchants cannot change a shipment in {} status",
                    shipment.status
                )));
            }
            match (shipment.status, target) {
                (Requested | Confirmed, Cancelled) | (Delivered, Completed) => Ok(()),
                (current, target) => Err(AppError::Forbidden(format!(
                    "merchants cannot move a shipment from {current} to {target}"
                ))),
            }
        }
        Role::Driver => {
            if shipment.assigned_driver_id != Some(actor.id) {
                return Err(AppError::Forbidden(format!(
                    "you are not the driver assigned to shipment {}",
                    shipment.id
                )));
            }
            if !DRIVER_ACTS_ON.contains(&shipment.status) {
                return Err(AppError::Conflict(format!(
                    "drivers cannot change a shipment in {} status",
                    shipment.status
                )));
            }
            if !DRIVER_TARGETS.contains(&target) {
                return Err(AppError::Forbidden(format!(
                    "drivers cannot move a shipment to {target}"
                )));
            }
            Ok(())
        }
        Role::TruckOwner => Err(AppError::Forbidden(
            "truck owners cannot change shipment status".to_string(),
        )),
    }
}

/// Applies a permitted status change, appending exactly one timeline entry.
///
/// The status read for the permission check is the status the write is
/// conditioned on, so a concurrent change surfaces as `Conflict`.
pub fn transition(
    store: &dyn DocumentOps,
    shipment_id: Uuid,
    change: StatusChange,
    actor: &Actor,
) -> Result<(Shipment, Shipment), AppError> {
    let current = load_active(store, shipment_id)?;
    check_permitted(&current, actor, change.status)?;

    if let Some(point) = change.location {
        if !point.is_valid() {
            return Err(AppError::Validation(format!(
                "invalid coordinates ({}, {})",
                point.lat, point.lng
            )));
        }
    }

    let note = change
        .note
        .clone()
        .filter(|note| !note.trim().is_empty())
        .unwrap_or_else(|| format!("status changed to {} by {}", change.status, actor.role));

    let updated = store.update_shipment(shipment_id, current.status, &mut |shipment: &mut Shipment| {
        shipment.record_transition(
            change.status,
            note.clone(),
            change.location,
            change.documents.clone(),
        );
        Ok(())
    })?;

    Ok((current, updated))
}

/// Administrative assignment outside the bidding flow. Forces `ASSIGNED`.
pub fn force_assign(
    store: &dyn DocumentOps,
    fleet: &dyn FleetDirectory,
    shipment_id: Uuid,
    assignment: ForceAssignment,
    actor: &Actor,
) -> Result<Shipment, AppError> {
    actor.require(Role::Admin, "assign drivers directly")?;

    let current = load_active(store, shipment_id)?;
    if !ASSIGNABLE.contains(&current.status) {
        return Err(AppError::Conflict(format!(
            "cannot assign shipment {} in {} status",
            current.id, current.status
        )));
    }
    if current.selected_application_id.is_some() {
        return Err(AppError::Conflict(format!(
            "shipment {} already has an accepted application",
            current.id
        )));
    }

    let (truck, driver) = assignable_pair(fleet, &assignment)?;

    let note = assignment
        .note
        .clone()
        .unwrap_or_else(|| format!("assigned truck {} and driver {} by admin", truck.id, driver.id));

    store.update_shipment(shipment_id, current.status, &mut |shipment: &mut Shipment| {
        shipment.assigned_truck_id = Some(truck.id);
        shipment.assigned_driver_id = Some(driver.id);
        shipment.record_transition(Assigned, note.clone(), None, Vec::new());
        Ok(())
    })
}

fn assignable_pair(
    fleet: &dyn FleetDirectory,
    assignment: &ForceAssignment,
) -> Result<(Truck, User), AppError> {
    let truck = fleet
        .truck(assignment.truck_id)
        .ok_or_else(|| AppError::NotFound(format!("truck {} not found", assignment.truck_id)))?;
    let driver = fleet
        .user(assignment.driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", assignment.driver_id)))?;

    if driver.role != Role::Driver {
        return Err(AppError::Forbidden(format!(
            "user {} is not a driver",
            driver.id
        )));
    }
    if !truck.is_available {
        return Err(AppError::Conflict(format!("truck {} is not available", truck.id)));
    }
    if !driver.is_available {
        return Err(AppError::Conflict(format!(
            "driver {} is not available",
            driver.id
        )));
    }
    Ok((truck, driver))
}

pub(crate) fn load_active(store: &dyn DocumentOps, shipment_id: Uuid) -> Result<Shipment, AppError> {
    store
        .shipment(shipment_id)
        .filter(|shipment| shipment.is_active)
        .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))
}
