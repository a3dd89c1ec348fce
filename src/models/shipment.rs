use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::{GeoPoint, LocationSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Requested,
    Confirmed,
    Assigned,
    Loading,
    InTransit,
    AtBorder,
    Unloading,
    Delivered,
    Completed,
    Cancelled,
    Delayed,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 11] = [
        Self::Requested,
        Self::Confirmed,
        Self::Assigned,
        Self::Loading,
        Self::InTransit,
        Self::AtBorder,
        Self::Unloading,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
        Self::Delayed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Confirmed => "CONFIRMED",
            Self::Assigned => "ASSIGNED",
            Self::Loading => "LOADING",
            Self::InTransit => "IN_TRANSIT",
            Self::AtBorder => "AT_BORDER",
            Self::Unloading => "UNLOADING",
            Self::Delivered => "DELIVERED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Delayed => "DELAYED",
        }
    }

    /// Statuses from which a shipment never moves again in normal operation.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| AppError::Validation(format!("unknown shipment status: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePoint {
    pub address: String,
    pub coordinates: Option<GeoPoint>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cargo {
    pub description: String,
    pub weight_kg: f64,
    pub volume_m3: Option<f64>,
    pub category: Option<String>,
    #[serde(default)]
    pub hazardous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSnapshot {
    pub amount: Option<f64>,
    pub currency: String,
    pub verified: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Default for PaymentSnapshot {
    fn default() -> Self {
        Self {
            amount: None,
            currency: "USD".to_string(),
            verified: false,
            paid_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: ShipmentStatus,
    pub note: String,
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    pub cargo: Cargo,
    pub notes: Option<String>,
    pub status: ShipmentStatus,
    pub timeline: Vec<TimelineEntry>,
    pub selected_application_id: Option<Uuid>,
    pub assigned_truck_id: Option<Uuid>,
    pub assigned_driver_id: Option<Uuid>,
    pub current_location: Option<LocationSnapshot>,
    pub payment: PaymentSnapshot,
    pub actual_pickup_date: Option<DateTime<Utc>>,
    pub actual_delivery_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        merchant_id: Uuid,
        origin: RoutePoint,
        destination: RoutePoint,
        cargo: Cargo,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            origin,
            destination,
            cargo,
            notes,
            status: ShipmentStatus::Requested,
            timeline: vec![TimelineEntry {
                status: ShipmentStatus::Requested,
                note: "shipment requested".to_string(),
                location: None,
                documents: Vec::new(),
                recorded_at: now,
            }],
            selected_application_id: None,
            assigned_truck_id: None,
            assigned_driver_id: None,
            current_location: None,
            payment: PaymentSnapshot::default(),
            actual_pickup_date: None,
            actual_delivery_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the shipment to `status` and appends the matching timeline entry.
    ///
    /// Pickup and delivery timestamps are only ever set once.
    pub fn record_transition(
        &mut self,
        status: ShipmentStatus,
        note: impl Into<String>,
        location: Option<GeoPoint>,
        documents: Vec<String>,
    ) {
        let now = Utc::now();

        if status == ShipmentStatus::InTransit && self.actual_pickup_date.is_none() {
            self.actual_pickup_date = Some(now);
        }
        if status == ShipmentStatus::Delivered && self.actual_delivery_date.is_none() {
            self.actual_delivery_date = Some(now);
        }
        if let Some(point) = location {
            self.current_location = Some(LocationSnapshot {
                point,
                recorded_at: now,
            });
        }

        self.status = status;
        self.timeline.push(TimelineEntry {
            status,
            note: note.into(),
            location,
            documents,
            recorded_at: now,
        });
    }

    pub fn timeline_status(&self) -> Option<ShipmentStatus> {
        self.timeline.last().map(|entry| entry.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
