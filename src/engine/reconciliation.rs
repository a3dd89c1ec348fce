use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::acceptance::AcceptanceStep;

/// A partially applied acceptance that someone has to repair.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub application_id: Uuid,
    pub step: AcceptanceStep,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ReconciliationLog {
    records: DashMap<Uuid, ReconciliationRecord>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        shipment_id: Uuid,
        application_id: Uuid,
        step: AcceptanceStep,
        reason: String,
    ) -> ReconciliationRecord {
        let record = ReconciliationRecord {
            id: Uuid::new_v4(),
            shipment_id,
            application_id,
            step,
            reason,
            recorded_at: Utc::now(),
        };
        self.records.insert(record.id, record.clone());
        record
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<ReconciliationRecord> {
        let mut records: Vec<ReconciliationRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.recorded_at);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
