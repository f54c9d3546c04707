use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::config::{Config, DispatchPolicy, FareDefaults};
use crate::error::AppError;
use crate::models::admin::AdminAccount;
use crate::models::driver::Driver;
use crate::models::due_request::DueRequest;
use crate::models::event::{EventName, RideEvent};
use crate::models::franchise::Franchise;
use crate::models::ledger::{LedgerAccount, LedgerKey};
use crate::models::ride::Ride;
use crate::models::rider::Rider;
use crate::models::settings::{CommissionSetting, FareSetting};
use crate::models::weekly_bill::WeeklyBill;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub drivers: DashMap<Uuid, Driver>,
    pub riders: DashMap<Uuid, Rider>,
    pub franchises: DashMap<Uuid, Franchise>,
    pub rides: DashMap<Uuid, Ride>,
    pub ledgers: DashMap<LedgerKey, LedgerAccount>,
    /// One row per franchise id.
    pub commission_settings: DashMap<Uuid, CommissionSetting>,
    pub due_requests: DashMap<Uuid, DueRequest>,
    pub weekly_bills: DashMap<Uuid, WeeklyBill>,
    pub admin: RwLock<AdminAccount>,
    pub fare_settings: RwLock<FareSetting>,
    pub fare_defaults: FareDefaults,
    pub dispatch: DispatchPolicy,
    pub events_tx: broadcast::Sender<RideEvent>,
    pub metrics: Metrics,
    tx_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            drivers: DashMap::new(),
            riders: DashMap::new(),
            franchises: DashMap::new(),
            rides: DashMap::new(),
            ledgers: DashMap::new(),
            commission_settings: DashMap::new(),
            due_requests: DashMap::new(),
            weekly_bills: DashMap::new(),
            admin: RwLock::new(AdminAccount::new(config.admin_name.clone())),
            fare_settings: RwLock::new(FareSetting::from_defaults(&config.fare_defaults)),
            fare_defaults: config.fare_defaults.clone(),
            dispatch: config.dispatch.clone(),
            events_tx,
            metrics: Metrics::new(),
            tx_lock: Mutex::new(()),
        }
    }

    /// Serializes multi-record writes. Hold the guard from the first
    /// precondition read until the last write.
    pub async fn transaction(&self) -> MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    pub async fn admin_id(&self) -> Uuid {
        self.admin.read().await.id
    }

    /// Snapshot of the current fare settings.
    pub async fn fare_snapshot(&self) -> FareSetting {
        self.fare_settings.read().await.clone()
    }

    /// Replaces the active fare settings wholesale, keeping the change history.
    pub async fn reload_fare_settings(&self, mut settings: FareSetting) {
        let mut current = self.fare_settings.write().await;
        let mut history = std::mem::take(&mut current.history);
        history.append(&mut settings.history);
        settings.history = history;
        settings.updated_at = Utc::now();
        *current = settings;
    }

    pub fn insert_driver(&self, driver: Driver) -> Uuid {
        let id = driver.id;
        if let Some(franchise_id) = driver.franchise_id {
            if let Some(mut franchise) = self.franchises.get_mut(&franchise_id) {
                franchise.total_drivers += 1;
            }
        }
        self.drivers.insert(id, driver);
        id
    }

    pub fn insert_rider(&self, rider: Rider) -> Uuid {
        let id = rider.id;
        self.riders.insert(id, rider);
        id
    }

    pub fn insert_franchise(&self, franchise: Franchise) -> Uuid {
        let id = franchise.id;
        self.franchises.insert(id, franchise);
        id
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn rider(&self, id: Uuid) -> Result<Rider, AppError> {
        self.riders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))
    }

    pub fn franchise(&self, id: Uuid) -> Result<Franchise, AppError> {
        self.franchises
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("franchise {id} not found")))
    }

    pub fn ride(&self, id: Uuid) -> Result<Ride, AppError> {
        self.rides
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))
    }

    pub fn due_request(&self, id: Uuid) -> Result<DueRequest, AppError> {
        self.due_requests
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("due request {id} not found")))
    }

    pub fn weekly_bill(&self, id: Uuid) -> Result<WeeklyBill, AppError> {
        self.weekly_bills
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("weekly bill {id} not found")))
    }

    /// The driver's franchise, if it is active and approved.
    pub fn operational_franchise(&self, driver: &Driver) -> Option<Franchise> {
        let franchise_id = driver.franchise_id?;
        self.franchises
            .get(&franchise_id)
            .filter(|franchise| franchise.is_operational())
            .map(|franchise| franchise.value().clone())
    }

    /// Best-effort push; nobody listening is not an error.
    pub fn notify(&self, recipient: Uuid, name: EventName, payload: Value) {
        let event = RideEvent {
            recipient,
            event: name,
            payload,
            emitted_at: Utc::now(),
        };
        if self.events_tx.send(event).is_err() {
            tracing::debug!(%recipient, event = ?name, "no realtime subscribers");
        }
    }
}
