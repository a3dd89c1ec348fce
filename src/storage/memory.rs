use std::cell::RefCell;
use std::collections::HashMap;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::application::{Application, ApplicationStatus};
use crate::models::fleet::{Truck, User};
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::storage::{
    ApplicationMutation, DocumentOps, FleetDirectory, ShipmentMutation, Storage, UnitOfWork,
    guarded_application_update, guarded_shipment_update,
};

/// In-process document store.
///
/// Every write takes the gate exclusively, so single-document writes are
/// atomic. When built with transaction support, [`Storage::atomically`] holds
/// the gate for the whole unit of work and publishes its staged writes only on
/// success.
pub struct MemoryStore {
    shipments: DashMap<Uuid, Shipment>,
    applications: DashMap<Uuid, Application>,
    // (shipment_id, owner_id) -> application_id
    bid_index: DashMap<(Uuid, Uuid), Uuid>,
    trucks: DashMap<Uuid, Truck>,
    users: DashMap<Uuid, User>,
    gate: RwLock<()>,
    transactions: bool,
}

impl MemoryStore {
    pub fn new(transactions: bool) -> Self {
        Self {
            shipments: DashMap::new(),
            applications: DashMap::new(),
            bid_index: DashMap::new(),
            trucks: DashMap::new(),
            users: DashMap::new(),
            gate: RwLock::new(()),
            transactions,
        }
    }

    fn raw_shipment(&self, id: Uuid) -> Option<Shipment> {
        self.shipments.get(&id).map(|entry| entry.value().clone())
    }

    fn raw_application(&self, id: Uuid) -> Option<Application> {
        self.applications.get(&id).map(|entry| entry.value().clone())
    }

    fn raw_applications_for(&self, shipment_id: Uuid) -> Vec<Application> {
        let mut applications: Vec<Application> = self
            .applications
            .iter()
            .filter(|entry| entry.value().shipment_id == shipment_id)
            .map(|entry| entry.value().clone())
            .collect();
        applications.sort_by_key(|application| application.created_at);
        applications
    }

    fn raw_reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        let mut rejected = Vec::new();
        for application in self.raw_applications_for(shipment_id) {
            if !is_competing_bid(&application, keep) {
                continue;
            }
            let next = reject(&application, reason, changed_by)?;
            self.applications.insert(next.id, next.clone());
            rejected.push(next);
        }
        Ok(rejected)
    }
}

fn is_competing_bid(application: &Application, keep: Uuid) -> bool {
    application.is_active && application.status == ApplicationStatus::Pending && application.id != keep
}

fn reject(application: &Application, reason: &str, changed_by: Uuid) -> Result<Application, AppError> {
    guarded_application_update(application, ApplicationStatus::Pending, &mut |next: &mut Application| {
        next.mark(ApplicationStatus::Rejected, Some(reason.to_string()), changed_by)
    })
}

fn check_new_application(
    shipment: Option<Shipment>,
    siblings: &[Application],
    owner_already_applied: bool,
    application: &Application,
) -> Result<(), AppError> {
    let shipment = shipment.ok_or_else(|| {
        AppError::NotFound(format!("shipment {} not found", application.shipment_id))
    })?;

    if !shipment.is_active || shipment.status != ShipmentStatus::Requested {
        return Err(AppError::Conflict(format!(
            "shipment {} not in REQUESTED status (currently {})",
            shipment.id, shipment.status
        )));
    }
    if siblings
        .iter()
        .any(|sibling| sibling.status == ApplicationStatus::Accepted)
    {
        return Err(AppError::Conflict(format!(
            "shipment {} has an accepted application awaiting reconciliation",
            shipment.id
        )));
    }
    if owner_already_applied {
        return Err(AppError::Conflict(format!(
            "owner {} already applied for shipment {}",
            application.owner_id, shipment.id
        )));
    }
    if application.status != ApplicationStatus::Pending {
        return Err(AppError::Internal(
            "new applications must start PENDING".to_string(),
        ));
    }
    Ok(())
}

impl DocumentOps for MemoryStore {
    fn shipment(&self, id: Uuid) -> Option<Shipment> {
        let _read = self.gate.read();
        self.raw_shipment(id)
    }

    fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, AppError> {
        let _write = self.gate.write();
        if self.shipments.contains_key(&shipment.id) {
            return Err(AppError::Conflict(format!(
                "shipment {} already exists",
                shipment.id
            )));
        }
        self.shipments.insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    fn update_shipment(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        mutate: &mut ShipmentMutation<'_>,
    ) -> Result<Shipment, AppError> {
        let _write = self.gate.write();
        let current = self
            .raw_shipment(id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;
        let next = guarded_shipment_update(&current, expected, mutate)?;
        self.shipments.insert(id, next.clone());
        Ok(next)
    }

    fn application(&self, id: Uuid) -> Option<Application> {
        let _read = self.gate.read();
        self.raw_application(id)
    }

    fn applications_for_shipment(&self, shipment_id: Uuid) -> Vec<Application> {
        let _read = self.gate.read();
        self.raw_applications_for(shipment_id)
    }

    fn insert_application(&self, application: Application) -> Result<Application, AppError> {
        let _write = self.gate.write();
        let key = (application.shipment_id, application.owner_id);
        check_new_application(
            self.raw_shipment(application.shipment_id),
            &self.raw_applications_for(application.shipment_id),
            self.bid_index.contains_key(&key),
            &application,
        )?;

        self.bid_index.insert(key, application.id);
        self.applications
            .insert(application.id, application.clone());
        Ok(application)
    }

    fn update_application(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        mutate: &mut ApplicationMutation<'_>,
    ) -> Result<Application, AppError> {
        let _write = self.gate.write();
        let current = self
            .raw_application(id)
            .ok_or_else(|| AppError::NotFound(format!("application {id} not found")))?;
        let next = guarded_application_update(&current, expected, mutate)?;
        self.applications.insert(id, next.clone());
        Ok(next)
    }

    fn reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        let _write = self.gate.write();
        self.raw_reject_pending_except(shipment_id, keep, reason, changed_by)
    }
}

impl Storage for MemoryStore {
    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn atomically(&self, work: &mut UnitOfWork<'_>) -> Result<(), AppError> {
        if !self.transactions {
            return Err(AppError::Internal(
                "storage backend does not support multi-document transactions".to_string(),
            ));
        }

        let _write = self.gate.write();
        let staged = StagedWrites::new(self);
        work(&staged)?;
        staged.commit();
        Ok(())
    }

    fn documents(&self) -> &dyn DocumentOps {
        self
    }

    fn shipments(&self) -> Vec<Shipment> {
        let _read = self.gate.read();
        let mut shipments: Vec<Shipment> = self
            .shipments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        shipments.sort_by_key(|shipment| shipment.created_at);
        shipments
    }

    fn applications_by_owner(&self, owner_id: Uuid) -> Vec<Application> {
        let _read = self.gate.read();
        let mut applications: Vec<Application> = self
            .applications
            .iter()
            .filter(|entry| entry.value().owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        applications.sort_by_key(|application| application.created_at);
        applications
    }
}

impl FleetDirectory for MemoryStore {
    fn truck(&self, id: Uuid) -> Option<Truck> {
        self.trucks.get(&id).map(|entry| entry.value().clone())
    }

    fn trucks(&self) -> Vec<Truck> {
        self.trucks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn upsert_truck(&self, truck: Truck) -> Truck {
        self.trucks.insert(truck.id, truck.clone());
        truck
    }

    fn set_truck_available(&self, id: Uuid, available: bool) -> Result<Truck, AppError> {
        let mut truck = self
            .trucks
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("truck {id} not found")))?;
        truck.is_available = available;
        truck.updated_at = Utc::now();
        Ok(truck.clone())
    }

    fn user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    fn users(&self) -> Vec<User> {
        self.users
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn upsert_user(&self, user: User) -> User {
        self.users.insert(user.id, user.clone());
        user
    }

    fn set_user_available(&self, id: Uuid, available: bool) -> Result<User, AppError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        user.is_available = available;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

/// Write overlay for one unit of work. Reads see staged documents first.
struct StagedWrites<'a> {
    store: &'a MemoryStore,
    shipments: RefCell<HashMap<Uuid, Shipment>>,
    applications: RefCell<HashMap<Uuid, Application>>,
    bids: RefCell<HashMap<(Uuid, Uuid), Uuid>>,
}

impl<'a> StagedWrites<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            shipments: RefCell::new(HashMap::new()),
            applications: RefCell::new(HashMap::new()),
            bids: RefCell::new(HashMap::new()),
        }
    }

    fn commit(self) {
        for (id, shipment) in self.shipments.into_inner() {
            self.store.shipments.insert(id, shipment);
        }
        for (id, application) in self.applications.into_inner() {
            self.store.applications.insert(id, application);
        }
        for (key, id) in self.bids.into_inner() {
            self.store.bid_index.insert(key, id);
        }
    }
}

impl DocumentOps for StagedWrites<'_> {
    fn shipment(&self, id: Uuid) -> Option<Shipment> {
        let staged = self.shipments.borrow().get(&id).cloned();
        staged.or_else(|| self.store.raw_shipment(id))
    }

    fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, AppError> {
        if self.shipment(shipment.id).is_some() {
            return Err(AppError::Conflict(format!(
                "shipment {} already exists",
                shipment.id
            )));
        }
        self.shipments
            .borrow_mut()
            .insert(shipment.id, shipment.clone());
        Ok(shipment)
    }

    fn update_shipment(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        mutate: &mut ShipmentMutation<'_>,
    ) -> Result<Shipment, AppError> {
        let current = self
            .shipment(id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;
        let next = guarded_shipment_update(&current, expected, mutate)?;
        self.shipments.borrow_mut().insert(id, next.clone());
        Ok(next)
    }

    fn application(&self, id: Uuid) -> Option<Application> {
        let staged = self.applications.borrow().get(&id).cloned();
        staged.or_else(|| self.store.raw_application(id))
    }

    fn applications_for_shipment(&self, shipment_id: Uuid) -> Vec<Application> {
        let staged = self.applications.borrow();
        let mut merged: Vec<Application> = self
            .store
            .raw_applications_for(shipment_id)
            .into_iter()
            .map(|stored| staged.get(&stored.id).cloned().unwrap_or(stored))
            .collect();

        merged.extend(
            staged
                .values()
                .filter(|application| {
                    application.shipment_id == shipment_id
                        && !self.store.applications.contains_key(&application.id)
                })
                .cloned(),
        );
        merged.sort_by_key(|application| application.created_at);
        merged
    }

    fn insert_application(&self, application: Application) -> Result<Application, AppError> {
        let key = (application.shipment_id, application.owner_id);
        let owner_already_applied =
            self.bids.borrow().contains_key(&key) || self.store.bid_index.contains_key(&key);
        check_new_application(
            self.shipment(application.shipment_id),
            &self.applications_for_shipment(application.shipment_id),
            owner_already_applied,
            &application,
        )?;

        self.bids.borrow_mut().insert(key, application.id);
        self.applications
            .borrow_mut()
            .insert(application.id, application.clone());
        Ok(application)
    }

    fn update_application(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        mutate: &mut ApplicationMutation<'_>,
    ) -> Result<Application, AppError> {
        let current = self
            .application(id)
            .ok_or_else(|| AppError::NotFound(format!("application {id} not found")))?;
        let next = guarded_application_update(&current, expected, mutate)?;
        self.applications.borrow_mut().insert(id, next.clone());
        Ok(next)
    }

    fn reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        let mut rejected = Vec::new();
        for application in self.applications_for_shipment(shipment_id) {
            if !is_competing_bid(&application, keep) {
                continue;
            }
            let next = reject(&application, reason, changed_by)?;
            self.applications.borrow_mut().insert(next.id, next.clone());
            rejected.push(next);
        }
        Ok(rejected)
    }
}
