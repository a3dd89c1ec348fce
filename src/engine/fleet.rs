use tracing::warn;
use uuid::Uuid;

use crate::storage::{FleetDirectory, Storage};

/// Marks the truck and driver as busy once an assignment is final.
///
/// The fleet records belong to another service, so a failure here is logged
/// and never undoes the assignment.
pub fn reserve(fleet: &dyn FleetDirectory, truck_id: Uuid, driver_id: Uuid) {
    set_availability(fleet, truck_id, driver_id, false);
}

pub fn release(fleet: &dyn FleetDirectory, truck_id: Uuid, driver_id: Uuid) {
    set_availability(fleet, truck_id, driver_id, true);
}

fn set_availability(fleet: &dyn FleetDirectory, truck_id: Uuid, driver_id: Uuid, available: bool) {
    if let Err(err) = fleet.set_truck_available(truck_id, available) {
        warn!(truck_id = %truck_id, available, error = %err, "failed to update truck availability");
    }
    if let Err(err) = fleet.set_user_available(driver_id, available) {
        warn!(driver_id = %driver_id, available, error = %err, "failed to update driver availability");
    }
}

/// Whether `id` is the truck or driver of an active shipment that has not
/// reached a terminal status.
pub fn on_open_shipment(store: &dyn Storage, id: Uuid) -> bool {
    store.shipments().iter().any(|shipment| {
        shipment.is_active
            && !shipment.is_terminal()
            && (shipment.assigned_truck_id == Some(id) || shipment.assigned_driver_id == Some(id))
    })
}
