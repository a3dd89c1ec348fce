use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::acceptance::AcceptanceCoordinator;
use crate::engine::reconciliation::ReconciliationLog;
use crate::models::location::LocationUpdate;
use crate::observability::metrics::Metrics;
use crate::storage::{FleetDirectory, MemoryStore, Storage};

pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub fleet: Arc<dyn FleetDirectory>,
    pub acceptance: AcceptanceCoordinator,
    pub reconciliation: Arc<ReconciliationLog>,
    pub location_events_tx: broadcast::Sender<LocationUpdate>,
    pub metrics: Metrics,
    pub arrival_radius_km: f64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Storage>,
        fleet: Arc<dyn FleetDirectory>,
        event_buffer_size: usize,
        arrival_radius_km: f64,
    ) -> Self {
        let (location_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();
        let reconciliation = Arc::new(ReconciliationLog::new());
        let acceptance = AcceptanceCoordinator::for_store(
            store.clone(),
            fleet.clone(),
            reconciliation.clone(),
            metrics.clone(),
        );

        Self {
            store,
            fleet,
            acceptance,
            reconciliation,
            location_events_tx,
            metrics,
            arrival_radius_km,
        }
    }

    /// State backed by a fresh in-process store.
    pub fn in_memory(storage_transactions: bool, event_buffer_size: usize, arrival_radius_km: f64) -> Self {
        let store = Arc::new(MemoryStore::new(storage_transactions));
        Self::new(store.clone(), store, event_buffer_size, arrival_radius_km)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::in_memory(
            config.storage_transactions,
            config.event_buffer_size,
            config.arrival_radius_km,
        )
    }
}
