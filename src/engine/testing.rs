//! Shared fixtures for engine tests.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::engine::reconciliation::ReconciliationLog;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::application::{Application, ApplicationStatus, BidDetails};
use crate::models::fleet::{Truck, User};
use crate::models::shipment::fixtures::shipment_for;
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::storage::{
    ApplicationMutation, DocumentOps, FleetDirectory, MemoryStore, ShipmentMutation, Storage,
    UnitOfWork,
};

pub struct Market {
    pub store: Arc<MemoryStore>,
    pub reconciliation: Arc<ReconciliationLog>,
    pub merchant: Uuid,
}

pub struct Carrier {
    pub owner: Uuid,
    pub truck: Truck,
    pub driver: User,
}

impl Market {
    pub fn new(transactions: bool) -> Self {
        Self {
            store: Arc::new(MemoryStore::new(transactions)),
            reconciliation: Arc::new(ReconciliationLog::new()),
            merchant: Uuid::new_v4(),
        }
    }

    pub fn merchant_actor(&self) -> Actor {
        Actor::new(self.merchant, Role::Merchant)
    }

    pub fn shipment(&self) -> Shipment {
        self.store
            .insert_shipment(shipment_for(self.merchant))
            .unwrap()
    }

    pub fn carrier(&self) -> Carrier {
        let owner = Uuid::new_v4();
        let truck = self.store.upsert_truck(Truck {
            id: Uuid::new_v4(),
            owner_id: owner,
            plate_number: format!("HH-{}", &owner.simple().to_string()[..6]),
            capacity_kg: 24_000.0,
            is_available: true,
            updated_at: Utc::now(),
        });
        let driver = self.store.upsert_user(User {
            id: Uuid::new_v4(),
            name: "test-driver".to_string(),
            role: Role::Driver,
            employer_id: Some(owner),
            is_available: true,
            updated_at: Utc::now(),
        });

        Carrier {
            owner,
            truck,
            driver,
        }
    }

    /// Inserts a pending bid from a fresh carrier, skipping lifecycle checks.
    pub fn bid(&self, shipment_id: Uuid, price: f64) -> Application {
        let carrier = self.carrier();
        self.store
            .insert_application(Application::new(
                shipment_id,
                carrier.owner,
                carrier.truck.id,
                carrier.driver.id,
                BidDetails {
                    price,
                    currency: "EUR".to_string(),
                    notes: None,
                    valid_until: None,
                },
            ))
            .unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    RejectCompetitors,
    ConfirmShipment,
    /// The merchant cancels the shipment just before the confirming write.
    CancelBeforeConfirm,
}

/// Store wrapper that fails one kind of write, inside or outside a unit of work.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail: FailPoint,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, fail: FailPoint) -> Self {
        Self { inner, fail }
    }

    fn ops(&self) -> FlakyOps<'_> {
        FlakyOps {
            inner: self.inner.as_ref(),
            fail: self.fail,
        }
    }
}

struct FlakyOps<'a> {
    inner: &'a dyn DocumentOps,
    fail: FailPoint,
}

fn injected(fail: FailPoint) -> AppError {
    AppError::Internal(format!("injected failure at {fail:?}"))
}

impl DocumentOps for FlakyOps<'_> {
    fn shipment(&self, id: Uuid) -> Option<Shipment> {
        self.inner.shipment(id)
    }

    fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, AppError> {
        self.inner.insert_shipment(shipment)
    }

    fn update_shipment(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        mutate: &mut ShipmentMutation<'_>,
    ) -> Result<Shipment, AppError> {
        match self.fail {
            FailPoint::ConfirmShipment => return Err(injected(self.fail)),
            FailPoint::CancelBeforeConfirm => {
                self.inner
                    .update_shipment(id, ShipmentStatus::Requested, &mut |shipment: &mut Shipment| {
                        shipment.record_transition(
                            ShipmentStatus::Cancelled,
                            "cancelled by merchant",
                            None,
                            Vec::new(),
                        );
                        Ok(())
                    })?;
            }
            FailPoint::RejectCompetitors => {}
        }
        self.inner.update_shipment(id, expected, mutate)
    }

    fn application(&self, id: Uuid) -> Option<Application> {
        self.inner.application(id)
    }

    fn applications_for_shipment(&self, shipment_id: Uuid) -> Vec<Application> {
        self.inner.applications_for_shipment(shipment_id)
    }

    fn insert_application(&self, application: Application) -> Result<Application, AppError> {
        self.inner.insert_application(application)
    }

    fn update_application(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        mutate: &mut ApplicationMutation<'_>,
    ) -> Result<Application, AppError> {
        self.inner.update_application(id, expected, mutate)
    }

    fn reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        if self.fail == FailPoint::RejectCompetitors {
            return Err(injected(self.fail));
        }
        self.inner
            .reject_pending_except(shipment_id, keep, reason, changed_by)
    }
}

impl DocumentOps for FlakyStore {
    fn shipment(&self, id: Uuid) -> Option<Shipment> {
        self.ops().shipment(id)
    }

    fn insert_shipment(&self, shipment: Shipment) -> Result<Shipment, AppError> {
        self.ops().insert_shipment(shipment)
    }

    fn update_shipment(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        mutate: &mut ShipmentMutation<'_>,
    ) -> Result<Shipment, AppError> {
        self.ops().update_shipment(id, expected, mutate)
    }

    fn application(&self, id: Uuid) -> Option<Application> {
        self.ops().application(id)
    }

    fn applications_for_shipment(&self, shipment_id: Uuid) -> Vec<Application> {
        self.ops().applications_for_shipment(shipment_id)
    }

    fn insert_application(&self, application: Application) -> Result<Application, AppError> {
        self.ops().insert_application(application)
    }

    fn update_application(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        mutate: &mut ApplicationMutation<'_>,
    ) -> Result<Application, AppError> {
        self.ops().update_application(id, expected, mutate)
    }

    fn reject_pending_except(
        &self,
        shipment_id: Uuid,
        keep: Uuid,
        reason: &str,
        changed_by: Uuid,
    ) -> Result<Vec<Application>, AppError> {
        self.ops()
            .reject_pending_except(shipment_id, keep, reason, changed_by)
    }
}

impl Storage for FlakyStore {
    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    fn atomically(&self, work: &mut UnitOfWork<'_>) -> Result<(), AppError> {
        let fail = self.fail;
        self.inner
            .atomically(&mut |ops| work(&FlakyOps { inner: ops, fail }))
    }

    fn documents(&self) -> &dyn DocumentOps {
        self
    }

    fn shipments(&self) -> Vec<Shipment> {
        self.inner.shipments()
    }

    fn applications_by_owner(&self, owner_id: Uuid) -> Vec<Application> {
        self.inner.applications_by_owner(owner_id)
    }
}
