use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Last known position of a shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

/// Published on the location sink every time a driver reports a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub shipment_id: Uuid,
    pub driver_id: Uuid,
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub near_destination: bool,
}
