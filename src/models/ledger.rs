use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::{CommissionSplit, PaymentMode};

/// A driver has one Khata per franchise affiliation (or none).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub driver_id: Uuid,
    pub franchise_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ride_id: Uuid,
    pub total_price: i64,
    pub commission: CommissionSplit,
    pub payment_mode: PaymentMode,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTotals {
    pub total_amount: i64,
    pub driver_profit: i64,
    pub admin_profit: i64,
    pub franchise_profit: i64,
    pub ride_count: u64,
}

/// Running account of unsettled dues ("Khata").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub franchise_id: Option<Uuid>,
    pub admin_id: Uuid,
    pub driver_due: i64,
    pub admin_due: i64,
    pub franchise_due: i64,
    pub entries: Vec<LedgerEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerAccount {
    pub fn open(key: LedgerKey, admin_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id: key.driver_id,
            franchise_id: key.franchise_id,
            admin_id,
            driver_due: 0,
            admin_due: 0,
            franchise_due: 0,
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            driver_id: self.driver_id,
            franchise_id: self.franchise_id,
        }
    }

    pub fn post(&mut self, entry: LedgerEntry) {
        self.driver_due += entry.commission.driver_profit;
        self.admin_due += entry.commission.admin_profit;
        self.franchise_due += entry.commission.franchise_profit;
        self.updated_at = entry.posted_at;
        self.entries.push(entry);
    }

    pub fn totals(&self) -> LedgerTotals {
        self.entries
            .iter()
            .fold(LedgerTotals::default(), |mut acc, entry| {
                acc.total_amount += entry.total_price;
                acc.driver_profit += entry.commission.driver_profit;
                acc.admin_profit += entry.commission.admin_profit;
                acc.franchise_profit += entry.commission.franchise_profit;
                acc.ride_count += 1;
                acc
            })
    }

    /// Running balances must equal the sum of the unsettled entries.
    pub fn is_balanced(&self) -> bool {
        let totals = self.totals();
        totals.driver_profit == self.driver_due
            && totals.admin_profit == self.admin_due
            && totals.franchise_profit == self.franchise_due
    }

    pub fn clear(&mut self, at: DateTime<Utc>) {
        self.driver_due = 0;
        self.admin_due = 0;
        self.franchise_due = 0;
        self.entries.clear();
        self.updated_at = at;
    }
}
