use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidDetails {
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub notes: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: ApplicationStatus,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    pub changed_by: Uuid,
}

/// A truck owner's bid for one shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub owner_id: Uuid,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub status: ApplicationStatus,
    pub bid: BidDetails,
    pub status_history: Vec<StatusHistoryEntry>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        shipment_id: Uuid,
        owner_id: Uuid,
        truck_id: Uuid,
        driver_id: Uuid,
        bid: BidDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            owner_id,
            truck_id,
            driver_id,
            status: ApplicationStatus::Pending,
            bid,
            status_history: vec![StatusHistoryEntry {
                status: ApplicationStatus::Pending,
                timestamp: now,
                note: Some("application submitted".to_string()),
                changed_by: owner_id,
            }],
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolves a pending application. Every status other than `Pending` is terminal.
    pub fn mark(
        &mut self,
        status: ApplicationStatus,
        note: Option<String>,
        changed_by: Uuid,
    ) -> Result<(), AppError> {
        if self.status != ApplicationStatus::Pending || status == ApplicationStatus::Pending {
            return Err(AppError::Conflict(format!(
                "application {} cannot move from {} to {}",
                self.id, self.status, status
            )));
        }

        self.push_status(status, note, changed_by);
        Ok(())
    }

    /// The only backward edge: an acceptance that lost its shipment is turned
    /// into a rejection.
    pub fn revert_acceptance(&mut self, note: String, changed_by: Uuid) -> Result<(), AppError> {
        if self.status != ApplicationStatus::Accepted {
            return Err(AppError::Conflict(format!(
                "application {} is {}, only ACCEPTED applications can be reverted",
                self.id, self.status
            )));
        }

        self.push_status(ApplicationStatus::Rejected, Some(note), changed_by);
        Ok(())
    }

    fn push_status(&mut self, status: ApplicationStatus, note: Option<String>, changed_by: Uuid) {
        self.status = status;
        self.status_history.push(StatusHistoryEntry {
            status,
            timestamp: Utc::now(),
            note,
            changed_by,
        });
    }
}
