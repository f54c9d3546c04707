use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The platform operator. There is exactly one per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: Uuid,
    pub name: String,
    pub due_wallet: i64,
    pub total_earning: i64,
}

impl AdminAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            due_wallet: 0,
            total_earning: 0,
        }
    }
}
