//! Application submission, cancellation and rejection.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::application::{Application, ApplicationStatus, BidDetails};
use crate::models::shipment::ShipmentStatus;
use crate::storage::{DocumentOps, FleetDirectory};

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitApplication {
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub bid: BidDetails,
}

pub fn validate_bid(bid: &BidDetails) -> Result<(), AppError> {
    if !bid.price.is_finite() || bid.price <= 0.0 {
        return Err(AppError::Validation(
            "bid price must be a positive number".to_string(),
        ));
    }
    if bid.currency.len() != 3 || !bid.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(format!(
            "currency must be a three-letter ISO code, got {:?}",
            bid.currency
        )));
    }
    if let Some(deadline) = bid.valid_until {
        if deadline <= Utc::now() {
            return Err(AppError::Validation(
                "bid validity deadline is already in the past".to_string(),
            ));
        }
    }
    Ok(())
}

/// Creates a `PENDING` bid for a `REQUESTED` shipment.
pub fn submit(
    store: &dyn DocumentOps,
    fleet: &dyn FleetDirectory,
    shipment_id: Uuid,
    request: SubmitApplication,
    actor: &Actor,
) -> Result<Application, AppError> {
    actor.require(Role::TruckOwner, "submit applications")?;
    validate_bid(&request.bid)?;

    let shipment = store
        .shipment(shipment_id)
        .filter(|shipment| shipment.is_active)
        .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))?;
    if shipment.status != ShipmentStatus::Requested {
        return Err(AppError::Conflict(format!(
            "shipment not in REQUESTED status (currently {})",
            shipment.status
        )));
    }

    let truck = fleet
        .truck(request.truck_id)
        .ok_or_else(|| AppError::NotFound(format!("truck {} not found", request.truck_id)))?;
    if truck.owner_id != actor.id {
        return Err(AppError::Forbidden(format!(
            "truck {} does not belong to you",
            truck.id
        )));
    }
    if !truck.is_available {
        return Err(AppError::Conflict(format!("truck {} is not available", truck.id)));
    }

    let driver = fleet
        .user(request.driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", request.driver_id)))?;
    if driver.role != Role::Driver {
        return Err(AppError::Forbidden(format!(
            "user {} is not a driver",
            driver.id
        )));
    }
    if driver.employer_id.is_some_and(|employer| employer != actor.id) {
        return Err(AppError::Forbidden(format!(
            "driver {} works for another truck owner",
            driver.id
        )));
    }
    if !driver.is_available {
        return Err(AppError::Conflict(format!(
            "driver {} is not available",
            driver.id
        )));
    }

    if store
        .applications_for_shipment(shipment_id)
        .iter()
        .any(|application| application.owner_id == actor.id)
    {
        return Err(AppError::Conflict(format!(
            "you already applied for shipment {shipment_id}"
        )));
    }

    // The store repeats the status and duplicate checks at write time.
    let application = store.insert_application(Application::new(
        shipment_id,
        actor.id,
        truck.id,
        driver.id,
        request.bid,
    ))?;

    info!(
        shipment_id = %shipment_id,
        application_id = %application.id,
        owner_id = %actor.id,
        price = application.bid.price,
        "application submitted"
    );
    Ok(application)
}

/// Withdraws a pending bid. Only the truck owner who placed it may do this.
pub fn cancel(store: &dyn DocumentOps, application_id: Uuid, actor: &Actor) -> Result<Application, AppError> {
    actor.require(Role::TruckOwner, "cancel applications")?;

    let application = load(store, application_id)?;
    if application.owner_id != actor.id {
        return Err(AppError::Forbidden(format!(
            "application {application_id} belongs to another truck owner"
        )));
    }
    ensure_pending(&application)?;

    let cancelled = store.update_application(
        application_id,
        ApplicationStatus::Pending,
        &mut |current: &mut Application| {
            current.mark(
                ApplicationStatus::Cancelled,
                Some("cancelled by truck owner".to_string()),
                actor.id,
            )
        },
    )?;

    info!(application_id = %application_id, "application cancelled");
    Ok(cancelled)
}

/// Declines a pending bid on behalf of the shipment's merchant.
pub fn reject(
    store: &dyn DocumentOps,
    application_id: Uuid,
    reason: Option<String>,
    actor: &Actor,
) -> Result<Application, AppError> {
    actor.require(Role::Merchant, "reject applications")?;

    let application = load(store, application_id)?;
    let shipment = store.shipment(application.shipment_id).ok_or_else(|| {
        AppError::NotFound(format!("shipment {} not found", application.shipment_id))
    })?;
    if shipment.merchant_id != actor.id {
        return Err(AppError::Forbidden(format!(
            "shipment {} belongs to another merchant",
            shipment.id
        )));
    }
    ensure_pending(&application)?;

    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| "rejected by merchant".to_string());

    let rejected = store.update_application(
        application_id,
        ApplicationStatus::Pending,
        &mut |current: &mut Application| {
            current.mark(ApplicationStatus::Rejected, Some(reason.clone()), actor.id)
        },
    )?;

    info!(application_id = %application_id, reason = %reason, "application rejected");
    Ok(rejected)
}

fn load(store: &dyn DocumentOps, application_id: Uuid) -> Result<Application, AppError> {
    store
        .application(application_id)
        .ok_or_else(|| AppError::NotFound(format!("application {application_id} not found")))
}

fn ensure_pending(application: &Application) -> Result<(), AppError> {
    if application.status == ApplicationStatus::Pending {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "application {} not in PENDING status (currently {})",
            application.id, application.status
        )))
    }
}
