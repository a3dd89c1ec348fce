//! Bid acceptance.
//!
//! Accepting a bid touches the chosen application, every competing pending
//! application and the shipment. [`AcceptanceCoordinator`] checks the
//! preconditions once and hands the three writes to an
//! [`AcceptanceStrategy`] picked from the store's capabilities at startup:
//!
//! * [`AtomicStrategy`] runs them inside one storage unit of work.
//! * [`BestEffortStrategy`] runs them as independent writes and reports a
//!   partial failure as a reconciliation record instead of hiding it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::fleet;
use crate::engine::reconciliation::ReconciliationLog;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::observability::metrics::Metrics;
use crate::storage::{DocumentOps, FleetDirectory, Storage};

pub const COMPETITOR_REJECTION_REASON: &str = "another application was accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStep {
    AcceptApplication,
    RejectCompetitors,
    ConfirmShipment,
    RevertAcceptance,
}

impl AcceptanceStep {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptApplication => "accept_application",
            Self::RejectCompetitors => "reject_competitors",
            Self::ConfirmShipment => "confirm_shipment",
            Self::RevertAcceptance => "revert_acceptance",
        }
    }
}

impl fmt::Display for AcceptanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the writes need, resolved before any mutation.
#[derive(Debug, Clone)]
pub struct AcceptancePlan {
    pub application_id: Uuid,
    pub shipment_id: Uuid,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub accepted_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    pub application: Application,
    pub shipment: Shipment,
    pub rejected: Vec<Application>,
}

#[derive(Debug)]
pub enum AcceptanceOutcome {
    Confirmed(Accepted),
    /// The bid is accepted but the remaining writes did not all land.
    Partial {
        application: Application,
        step: AcceptanceStep,
        error: AppError,
    },
}

pub trait AcceptanceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        store: &dyn Storage,
        plan: &AcceptancePlan,
    ) -> Result<AcceptanceOutcome, AppError>;
}

fn accept_chosen(ops: &dyn DocumentOps, plan: &AcceptancePlan) -> Result<Application, AppError> {
    ops.update_application(
        plan.application_id,
        ApplicationStatus::Pending,
        &mut |application: &mut Application| {
            application.mark(
                ApplicationStatus::Accepted,
                Some("application accepted".to_string()),
                plan.accepted_by,
            )
        },
    )
}

fn reject_competitors(
    ops: &dyn DocumentOps,
    plan: &AcceptancePlan,
) -> Result<Vec<Application>, AppError> {
    ops.reject_pending_except(
        plan.shipment_id,
        plan.application_id,
        COMPETITOR_REJECTION_REASON,
        plan.accepted_by,
    )
}

fn confirm_shipment(ops: &dyn DocumentOps, plan: &AcceptancePlan) -> Result<Shipment, AppError> {
    ops.update_shipment(
        plan.shipment_id,
        ShipmentStatus::Requested,
        &mut |shipment: &mut Shipment| {
            if shipment.selected_application_id.is_some() {
                return Err(AppError::Conflict(format!(
                    "shipment {} already has a selected application",
                    shipment.id
                )));
            }
            shipment.selected_application_id = Some(plan.application_id);
            shipment.assigned_truck_id = Some(plan.truck_id);
            shipment.assigned_driver_id = Some(plan.driver_id);
            shipment.record_transition(
                ShipmentStatus::Confirmed,
                format!(
                    "shipment confirmed: application {} accepted",
                    plan.application_id
                ),
                None,
                Vec::new(),
            );
            Ok(())
        },
    )
}

/// All three writes in one storage transaction.
pub struct AtomicStrategy;

impl AcceptanceStrategy for AtomicStrategy {
    fn name(&self) -> &'static str {
        "atomic"
    }

    fn execute(
        &self,
        store: &dyn Storage,
        plan: &AcceptancePlan,
    ) -> Result<AcceptanceOutcome, AppError> {
        let mut accepted = None;

        store.atomically(&mut |ops| {
            let application = accept_chosen(ops, plan)?;
            let rejected = reject_competitors(ops, plan)?;
            let shipment = confirm_shipment(ops, plan)?;
            accepted = Some(Accepted {
                application,
                shipment,
                rejected,
            });
            Ok(())
        })?;

        accepted
            .map(AcceptanceOutcome::Confirmed)
            .ok_or_else(|| AppError::Internal("unit of work committed without a result".to_string()))
    }
}

/// The same writes, one after another, for stores without transactions.
pub struct BestEffortStrategy;

impl AcceptanceStrategy for BestEffortStrategy {
    fn name(&self) -> &'static str {
        "best_effort"
    }

    fn execute(
        &self,
        store: &dyn Storage,
        plan: &AcceptancePlan,
    ) -> Result<AcceptanceOutcome, AppError> {
        let ops = store.documents();

        // Nothing has been written if this fails.
        let application = accept_chosen(ops, plan)?;

        if let Some(status) = ops
            .shipment(plan.shipment_id)
            .map(|shipment| shipment.status)
            .filter(|status| *status != ShipmentStatus::Requested)
        {
            let reason = format!("shipment not in REQUESTED status (currently {status})");
            return revert_lost_acceptance(ops, plan, application, &[], reason);
        }

        let rejected = match reject_competitors(ops, plan) {
            Ok(rejected) => rejected,
            Err(cause) => {
                return Ok(AcceptanceOutcome::Partial {
                    application,
                    step: AcceptanceStep::RejectCompetitors,
                    error: cause,
                });
            }
        };

        match confirm_shipment(ops, plan) {
            Ok(shipment) => Ok(AcceptanceOutcome::Confirmed(Accepted {
                application,
                shipment,
                rejected,
            })),
            Err(AppError::Conflict(reason)) => {
                revert_lost_acceptance(ops, plan, application, &rejected, reason)
            }
            Err(cause) => Ok(AcceptanceOutcome::Partial {
                application,
                step: AcceptanceStep::ConfirmShipment,
                error: cause,
            }),
        }
    }
}

/// The shipment left `REQUESTED` after the preconditions were read,
/// so the acceptance from step 1 is wrong and gets turned into a rejection.
///
/// Competitors rejected in step 2 stay rejected. When no other application
/// won the shipment those rejections are wrong too, and the caller gets
/// `ReconciliationRequired` naming them.
fn revert_lost_acceptance(
    ops: &dyn DocumentOps,
    plan: &AcceptancePlan,
    application: Application,
    rejected: &[Application],
    reason: String,
) -> Result<AcceptanceOutcome, AppError> {
    warn!(
        shipment_id = %plan.shipment_id,
        application_id = %plan.application_id,
        reason = %reason,
        "shipment changed during acceptance; reverting accepted application"
    );

    let note = format!("acceptance reverted: {reason}");
    if let Err(revert_error) = ops.update_application(
        plan.application_id,
        ApplicationStatus::Accepted,
        &mut |current: &mut Application| current.revert_acceptance(note.clone(), plan.accepted_by),
    ) {
        return Ok(AcceptanceOutcome::Partial {
            application,
            step: AcceptanceStep::RevertAcceptance,
            error: revert_error,
        });
    }

    let someone_won = ops
        .shipment(plan.shipment_id)
        .is_some_and(|shipment| shipment.selected_application_id.is_some());
    if rejected.is_empty() || someone_won {
        return Err(AppError::Conflict(reason));
    }

    let ids: Vec<String> = rejected.iter().map(|application| application.id.to_string()).collect();
    Err(AppError::ReconciliationRequired {
        shipment_id: plan.shipment_id,
        application_id: plan.application_id,
        step: AcceptanceStep::RejectCompetitors,
        reason: format!(
            "applications [{}] were rejected but the shipment was never confirmed: {reason}",
            ids.join(", ")
        ),
    })
}

pub struct AcceptanceCoordinator {
    store: Arc<dyn Storage>,
    fleet: Arc<dyn FleetDirectory>,
    strategy: Box<dyn AcceptanceStrategy>,
    reconciliation: Arc<ReconciliationLog>,
    metrics: Metrics,
}

impl AcceptanceCoordinator {
    /// Picks the strategy by probing the store once.
    pub fn for_store(
        store: Arc<dyn Storage>,
        fleet: Arc<dyn FleetDirectory>,
        reconciliation: Arc<ReconciliationLog>,
        metrics: Metrics,
    ) -> Self {
        let strategy: Box<dyn AcceptanceStrategy> = if store.supports_transactions() {
            Box::new(AtomicStrategy)
        } else {
            Box::new(BestEffortStrategy)
        };
        info!(strategy = strategy.name(), "acceptance strategy selected");

        Self::with_strategy(store, fleet, strategy, reconciliation, metrics)
    }

    pub fn with_strategy(
        store: Arc<dyn Storage>,
        fleet: Arc<dyn FleetDirectory>,
        strategy: Box<dyn AcceptanceStrategy>,
        reconciliation: Arc<ReconciliationLog>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            fleet,
            strategy,
            reconciliation,
            metrics,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn accept(&self, application_id: Uuid, actor: &Actor) -> Result<AcceptanceOutcome, AppError> {
        actor.require(Role::Merchant, "accept applications")?;

        let plan = self.plan(application_id, actor)?;
        let strategy = self.strategy.name();

        let start = Instant::now();
        let result = self.strategy.execute(self.store.as_ref(), &plan);
        self.metrics
            .acceptance_latency_seconds
            .with_label_values(&[strategy])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(AcceptanceOutcome::Confirmed(accepted)) => {
                self.record_outcome("confirmed");
                fleet::reserve(self.fleet.as_ref(), plan.truck_id, plan.driver_id);
                info!(
                    shipment_id = %plan.shipment_id,
                    application_id = %plan.application_id,
                    rejected = accepted.rejected.len(),
                    strategy,
                    "application accepted"
                );
                Ok(AcceptanceOutcome::Confirmed(accepted))
            }
            Ok(AcceptanceOutcome::Partial {
                application,
                step,
                error: cause,
            }) => {
                self.record_outcome("reconciliation_required");
                self.metrics.reconciliation_required_total.inc();
                let reason = cause.to_string();
                error!(
                    shipment_id = %plan.shipment_id,
                    application_id = %plan.application_id,
                    step = %step,
                    error = %reason,
                    "acceptance left inconsistent state; reconciliation required"
                );
                self.reconciliation
                    .record(plan.shipment_id, plan.application_id, step, reason.clone());

                Ok(AcceptanceOutcome::Partial {
                    application,
                    step,
                    error: AppError::ReconciliationRequired {
                        shipment_id: plan.shipment_id,
                        application_id: plan.application_id,
                        step,
                        reason,
                    },
                })
            }
            Err(AppError::ReconciliationRequired {
                shipment_id,
                application_id,
                step,
                reason,
            }) => {
                self.record_outcome("reconciliation_required");
                self.metrics.reconciliation_required_total.inc();
                error!(
                    shipment_id = %shipment_id,
                    application_id = %application_id,
                    step = %step,
                    error = %reason,
                    "acceptance rejected competitors without confirming; reconciliation required"
                );
                self.reconciliation
                    .record(shipment_id, application_id, step, reason.clone());

                Err(AppError::ReconciliationRequired {
                    shipment_id,
                    application_id,
                    step,
                    reason,
                })
            }
            Err(err) => {
                self.record_outcome("failed");
                warn!(
                    shipment_id = %plan.shipment_id,
                    application_id = %plan.application_id,
                    error = %err,
                    strategy,
                    "acceptance failed"
                );
                Err(err)
            }
        }
    }

    fn plan(&self, application_id: Uuid, actor: &Actor) -> Result<AcceptancePlan, AppError> {
        let application = self
            .store
            .application(application_id)
            .ok_or_else(|| AppError::NotFound(format!("application {application_id} not found")))?;
        let shipment = self.store.shipment(application.shipment_id).ok_or_else(|| {
            AppError::NotFound(format!("shipment {} not found", application.shipment_id))
        })?;

        if shipment.merchant_id != actor.id {
            return Err(AppError::Forbidden(format!(
                "shipment {} belongs to another merchant",
                shipment.id
            )));
        }
        if shipment.status != ShipmentStatus::Requested {
            return Err(AppError::Conflict(format!(
                "shipment not in REQUESTED status (currently {})",
                shipment.status
            )));
        }
        if self
            .store
            .applications_for_shipment(shipment.id)
            .iter()
            .any(|sibling| sibling.status == ApplicationStatus::Accepted)
        {
            return Err(AppError::Conflict(format!(
                "shipment {} has an accepted application awaiting reconciliation",
                shipment.id
            )));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::Conflict(format!(
                "application {} not in PENDING status (currently {})",
                application.id, application.status
            )));
        }
        if let Some(deadline) = application.bid.valid_until {
            if deadline < Utc::now() {
                return Err(AppError::Conflict(format!(
                    "application {} bid expired at {}",
                    application.id,
                    deadline.to_rfc3339()
                )));
            }
        }

        let truck_free = self
            .fleet
            .truck(application.truck_id)
            .is_some_and(|truck| truck.is_available);
        if !truck_free {
            return Err(AppError::Conflict(format!(
                "truck {} is no longer available",
                application.truck_id
            )));
        }
        let driver_free = self
            .fleet
            .user(application.driver_id)
            .is_some_and(|driver| driver.is_available);
        if !driver_free {
            return Err(AppError::Conflict(format!(
                "driver {} is no longer available",
                application.driver_id
            )));
        }

        Ok(AcceptancePlan {
            application_id: application.id,
            shipment_id: shipment.id,
            truck_id: application.truck_id,
            driver_id: application.driver_id,
            accepted_by: actor.id,
        })
    }

    fn record_outcome(&self, outcome: &str) {
        self.metrics
            .acceptances_total
            .with_label_values(&[self.strategy.name(), outcome])
            .inc();
    }
}
