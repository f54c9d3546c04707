use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Generated,
    PendingPayment,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyBill {
    pub id: Uuid,
    pub franchise_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// What the franchise owes the admin for the window.
    pub admin_commission: i64,
    pub franchise_commission: i64,
    pub total_generated: i64,
    pub ride_count: u64,
    pub status: BillStatus,
    pub due_request_id: Option<Uuid>,
    pub generated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}
