use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::Role;

/// Identity record owned by the identity service; read-mostly here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Truck owner a driver works for. `None` means unaffiliated.
    pub employer_id: Option<Uuid>,
    pub is_available: bool,
    pub updated_at: DateTime<Utc>,
}

/// Fleet record owned by the fleet service; read-mostly here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truck {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plate_number: String,
    pub capacity_kg: f64,
    pub is_available: bool,
    pub updated_at: DateTime<Utc>,
}
