//! Document-store seam.
//!
//! [`DocumentOps`] is the set of single-document reads and conditional writes
//! the lifecycle engine needs. [`Storage`] adds the capability probe and the
//! multi-document unit of work used by the atomic acceptance strategy.
//! [`FleetDirectory`] is the read-mostly view of trucks and users owned by the
//! fleet and identity services.

pub mod memory;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::application::{Application, ApplicationStatus};
use crate::models::fleet::{Truck, User};
use crate::models::shipment::{Shipment, ShipmentStatus};

pub use memory::MemoryStore;

pub type ShipmentMutation<'a> = dyn FnMut(&mut Shipment) -> Result<(), AppError> + 'a;
pub type ApplicationMutation<'a> = dyn FnMut(&mut Application) -> Result<(), AppError> + 'a;
pub type UnitOfWork<'a> = dyn FnMut(&dyn DocumentOps) -> Result<(), AppError> + 'a;

pub trait DocumentOps {
    fn shipment(&self, id: Uuid) -> Option<Shipment>;

    fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, AppError>;

    /// Applies `mutate` to the stored shipment if it is active and its status
    /// still equals `expected`. Returns `Conflict` otherwise.
    fn update_shipment(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        mutate: &mut ShipmentMutation<'_>,
    ) -> Result<Shipment, AppError>;

    fn application(&self, id: Uuid) -> Option<Application>;

    fn applications_for_shipment(&self, shipment_id: Uuid) -> Vec<Application>;

    /// Inserts a new bid. Re-checks at write time that the shipment is still
    /// `REQUESTED` and that the owner has no other bid on it.
    fn insert_application(&self, application: Application) -> Result<Application, AppError>;

    fn update_application(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        mutate: &mut ApplicationMutation<'_>,
    ) -> Result<Application, AppError>;

    /// Bulk conditional update:
    /// `shipment_id == shipment AND status == PENDING AND id != keep` → `REJECTED`.
    fn reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError>;
}

pub trait Storage: DocumentOps + Send + Sync {
    /// Capability probe: whether [`Storage::atomically`] is available.
    fn supports_transactions(&self) -> bool;

    /// Runs `work` as one isolated unit. Either every write made through the
    /// handed-out ops becomes visible, or none does.
    fn atomically(&self, work: &mut UnitOfWork<'_>) -> Result<(), AppError>;

    fn documents(&self) -> &dyn DocumentOps;

    fn shipments(&self) -> Vec<Shipment>;

    fn applications_by_owner(&self, owner_id: Uuid) -> Vec<Application>;
}

pub trait FleetDirectory: Send + Sync {
    fn truck(&self, id: Uuid) -> Option<Truck>;

    fn trucks(&self) -> Vec<Truck>;

    fn upsert_truck(&self, truck: Truck) -> Truck;

    fn set_truck_available(&self, id: Uuid, available: bool) -> Result<Truck, AppError>;

    fn user(&self, id: Uuid) -> Option<User>;

    fn users(&self) -> Vec<User>;

    fn upsert_user(&self, user: User) -> User;

    fn set_user_available(&self, id: Uuid, available: bool) -> Result<User, AppError>;
}

/// Shared write-path checks for conditional shipment updates.
pub(crate) fn guarded_shipment_update(
    current: &Shipment,
    expected: ShipmentStatus,
    mutate: &mut ShipmentMutation<'_>,
) -> Result<Shipment, AppError> {
    if !current.is_active {
        return Err(AppError::Conflict(format!(
            "shipment {} has been deactivated",
            current.id
        )));
    }
    if current.status != expected {
        return Err(AppError::Conflict(format!(
            "shipment {} not in {} status (currently {})",
            current.id, expected, current.status
        )));
    }

    let mut next = current.clone();
    mutate(&mut next)?;

    if next.id != current.id || next.merchant_id != current.merchant_id {
        return Err(AppError::Internal(format!(
            "shipment {} identity fields cannot change",
            current.id
        )));
    }
    if current.selected_application_id.is_some()
        && next.selected_application_id != current.selected_application_id
    {
        return Err(AppError::Conflict(format!(
            "shipment {} already has a selected application",
            current.id
        )));
    }
    if next.timeline_status() != Some(next.status) {
        return Err(AppError::Internal(format!(
            "shipment {} status {} does not match its timeline",
            current.id, next.status
        )));
    }
    if next.timeline.len() < current.timeline.len() {
        return Err(AppError::Internal(format!(
            "shipment {} timeline is append-only",
            current.id
        )));
    }

    next.created_at = current.created_at;
    next.updated_at = chrono::Utc::now();
    Ok(next)
}

pub(crate) fn guarded_application_update(
    current: &Application,
    expected: ApplicationStatus,
    mutate: &mut ApplicationMutation<'_>,
) -> Result<Application, AppError> {
    if !current.is_active {
        return Err(AppError::Conflict(format!(
            "application {} has been deactivated",
            current.id
        )));
    }
    if current.status != expected {
        return Err(AppError::Conflict(format!(
            "application {} not in {} status (currently {})",
            current.id, expected, current.status
        )));
    }

    let mut next = current.clone();
    mutate(&mut next)?;

    if next.id != current.id
        || next.shipment_id != current.shipment_id
        || next.owner_id != current.owner_id
    {
        return Err(AppError::Internal(format!(
            "application {} identity fields cannot change",
            current.id
        )));
    }

    next.created_at = current.created_at;
    next.updated_at = chrono::Utc::now();
    Ok(next)
}
