use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FareDefaults;

pub const PLATFORM_ADMIN_RATE: f64 = 18.0;
pub const DEFAULT_FRANCHISE_ADMIN_RATE: f64 = 18.0;
pub const DEFAULT_FRANCHISE_RATE: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FareField {
    BaseFare,
    PerKmCharge,
    NightSurchargePercent,
    NightStartHour,
    NightEndHour,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareChange {
    pub field: FareField,
    pub old_value: f64,
    pub new_value: f64,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareSetting {
    pub base_fare: f64,
    pub per_km_charge: f64,
    pub night_surcharge_percent: f64,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub last_changed_by: Option<Uuid>,
    pub history: Vec<FareChange>,
    pub updated_at: DateTime<Utc>,
}

impl FareSetting {
    pub fn from_defaults(defaults: &FareDefaults) -> Self {
        Self {
            base_fare: defaults.base_fare,
            per_km_charge: defaults.per_km_charge,
            night_surcharge_percent: defaults.night_surcharge_percent,
            night_start_hour: defaults.night_start_hour,
            night_end_hour: defaults.night_end_hour,
            last_changed_by: None,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn value(&self, field: FareField) -> f64 {
        match field {
            FareField::BaseFare => self.base_fare,
            FareField::PerKmCharge => self.per_km_charge,
            FareField::NightSurchargePercent => self.night_surcharge_percent,
            FareField::NightStartHour => f64::from(self.night_start_hour),
            FareField::NightEndHour => f64::from(self.night_end_hour),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionField {
    AdminRate,
    FranchiseRate,
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionChange {
    pub field: CommissionField,
    pub old_value: f64,
    pub new_value: f64,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

/// Commission rates of one franchise. Keyed by franchise id, so there is
/// never more than one row per franchise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSetting {
    pub franchise_id: Uuid,
    pub admin_rate: f64,
    pub franchise_rate: f64,
    pub is_active: bool,
    pub last_changed_by: Uuid,
    pub history: Vec<CommissionChange>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionSetting {
    pub fn with_defaults(franchise_id: Uuid, created_by: Uuid) -> Self {
        let now = Utc::now();
        let reason = "Initial commission settings created".to_string();
        Self {
            franchise_id,
            admin_rate: DEFAULT_FRANCHISE_ADMIN_RATE,
            franchise_rate: DEFAULT_FRANCHISE_RATE,
            is_active: true,
            last_changed_by: created_by,
            history: vec![
                CommissionChange {
                    field: CommissionField::AdminRate,
                    old_value: 0.0,
                    new_value: DEFAULT_FRANCHISE_ADMIN_RATE,
                    changed_by: created_by,
                    changed_at: now,
                    reason: reason.clone(),
                },
                CommissionChange {
                    field: CommissionField::FranchiseRate,
                    old_value: 0.0,
                    new_value: DEFAULT_FRANCHISE_RATE,
                    changed_by: created_by,
                    changed_at: now,
                    reason,
                },
            ],
            updated_at: now,
        }
    }
}
