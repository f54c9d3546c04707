use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: Option<GeoPoint>,
    pub is_on_ride: bool,
    pub current_ride: Option<Uuid>,
    pub completed_rides: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: phone.into(),
            location: None,
            is_on_ride: false,
            current_ride: None,
            completed_rides: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.is_on_ride || self.current_ride.is_some()
    }
}
