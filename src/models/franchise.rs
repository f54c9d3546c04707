use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyAccumulation {
    pub admin_profit: i64,
    pub franchise_profit: i64,
    pub total_rides: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Franchise {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub is_approved: bool,
    pub total_drivers: u64,
    /// Franchise share credited when drivers settle their Khata.
    pub due_wallet: i64,
    /// Franchise share accrued as rides are paid.
    pub total_earnings: i64,
    /// Franchise share realised through settled driver dues.
    pub settled_earnings: i64,
    /// Admin commission collected through franchise drivers, not yet billed.
    pub accumulated_admin_profit: i64,
    /// Keyed by ISO week, e.g. `2026-W42`.
    pub weekly_accumulations: BTreeMap<String, WeeklyAccumulation>,
    pub last_weekly_bill_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Franchise {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            is_approved: true,
            total_drivers: 0,
            due_wallet: 0,
            total_earnings: 0,
            settled_earnings: 0,
            accumulated_admin_profit: 0,
            weekly_accumulations: BTreeMap::new(),
            last_weekly_bill_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Only active, approved franchises take a commission share.
    pub fn is_operational(&self) -> bool {
        self.is_active && self.is_approved
    }
}

pub fn iso_week_key(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
