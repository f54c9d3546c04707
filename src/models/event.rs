use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    RideAccepted,
    RideRejected,
    PickupVerified,
    RideCompleted,
    PaymentModeUpdated,
    CancelRide,
}

/// A push addressed to one rider or driver session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    pub recipient: Uuid,
    pub event: EventName,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}
