use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Online,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Online => "online",
        }
    }
}

/// Lifecycle position of a persisted ride. A cancelled ride is deleted,
/// so it has no variant here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Accepted,
    /// Pickup OTP verified.
    Started,
    /// Drop OTP verified.
    Ended,
    /// Payment mode set and posted to the ledger.
    Paid,
}

/// Rates and the resulting three-way split, frozen onto a ride.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CommissionSplit {
    pub admin_rate: f64,
    pub franchise_rate: f64,
    pub admin_profit: i64,
    pub franchise_profit: i64,
    pub driver_profit: i64,
}

impl CommissionSplit {
    pub fn total(&self) -> i64 {
        self.admin_profit + self.franchise_profit + self.driver_profit
    }

    /// What the driver owes upstream once the fare is collected.
    pub fn upstream_due(&self) -> i64 {
        self.admin_profit + self.franchise_profit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub driver_id: Uuid,
    pub rider_id: Uuid,
    pub franchise_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub total_km: f64,
    pub total_amount: i64,
    pub commission: CommissionSplit,
    #[serde(skip_serializing)]
    pub pickup_otp: String,
    #[serde(skip_serializing)]
    pub drop_otp: String,
    pub status: RideStatus,
    pub payment_mode: Option<PaymentMode>,
    pub accepted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn is_picked_up(&self) -> bool {
        self.status != RideStatus::Accepted
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RideStatus::Accepted | RideStatus::Started)
    }
}
