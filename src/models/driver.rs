use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallets {
    pub cash: i64,
    pub online: i64,
    /// What the driver currently owes upstream (admin and franchise).
    pub due: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    pub is_active: bool,
    pub is_approved: bool,
    pub is_on_ride: bool,
    pub current_ride: Option<Uuid>,
    pub wallets: Wallets,
    pub franchise_id: Option<Uuid>,
    pub total_earning: i64,
    pub total_rides: u64,
    pub total_distance_km: f64,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// An approved, active driver with empty wallets.
    pub fn new(name: impl Into<String>, phone: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: phone.into(),
            location,
            is_active: true,
            is_approved: true,
            is_on_ride: false,
            current_ride: None,
            wallets: Wallets::default(),
            franchise_id: None,
            total_earning: 0,
            total_rides: 0,
            total_distance_km: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_franchise(mut self, franchise_id: Uuid) -> Self {
        self.franchise_id = Some(franchise_id);
        self
    }

    /// Reserved by an accepted ride or already riding.
    pub fn is_engaged(&self) -> bool {
        self.is_on_ride || self.current_ride.is_some()
    }
}
