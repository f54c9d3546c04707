use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::PaymentMode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Requester {
    Driver(Uuid),
    Franchise(Uuid),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Approver {
    Admin,
    Franchise(Uuid),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    DriverDue,
    FranchiseWeeklyBill,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::DriverDue => "driver_due",
            RequestType::FranchiseWeeklyBill => "franchise_weekly_bill",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvidence {
    pub method: PaymentMode,
    /// Reference to an uploaded receipt image.
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueRequest {
    pub id: Uuid,
    pub requester: Requester,
    pub admin_id: Uuid,
    pub franchise_id: Option<Uuid>,
    pub request_type: RequestType,
    pub amount: i64,
    pub status: RequestStatus,
    pub approved_by_franchise: bool,
    pub franchise_approved_at: Option<DateTime<Utc>>,
    pub approved_by_admin: bool,
    pub admin_approved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Approver>,
    pub payment: PaymentEvidence,
    pub weekly_bill_id: Option<Uuid>,
    pub paid_amount: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DueRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}
