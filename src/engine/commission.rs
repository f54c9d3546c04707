use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::franchise::Franchise;
use crate::models::ride::CommissionSplit;
use crate::models::settings::{
    CommissionChange, CommissionField, CommissionSetting, DEFAULT_FRANCHISE_ADMIN_RATE,
    DEFAULT_FRANCHISE_RATE, PLATFORM_ADMIN_RATE,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CommissionRates {
    pub admin_rate: f64,
    pub franchise_rate: f64,
}

impl CommissionRates {
    pub fn platform_default() -> Self {
        Self {
            admin_rate: PLATFORM_ADMIN_RATE,
            franchise_rate: 0.0,
        }
    }
}

fn percent_of(rate: f64, fare: i64) -> i64 {
    (rate * fare as f64 / 100.0).ceil() as i64
}

fn validate_rates(admin_rate: f64, franchise_rate: f64) -> Result<(), AppError> {
    let in_range = |rate: f64| rate.is_finite() && (0.0..=100.0).contains(&rate);
    if !in_range(admin_rate) || !in_range(franchise_rate) {
        return Err(AppError::Validation(
            "commission rates must be between 0 and 100".to_string(),
        ));
    }
    if admin_rate + franchise_rate > 100.0 {
        return Err(AppError::Validation(
            "admin and franchise commission together cannot exceed 100".to_string(),
        ));
    }
    Ok(())
}

/// Splits a fare into admin, franchise and driver shares. Commission shares
/// round up; the driver keeps the remainder, which must not go negative.
pub fn split(fare: i64, rates: CommissionRates) -> Result<CommissionSplit, AppError> {
    if fare < 0 {
        return Err(AppError::Validation("fare cannot be negative".to_string()));
    }
    validate_rates(rates.admin_rate, rates.franchise_rate)
        .map_err(|err| AppError::Integrity(format!("stored {err}")))?;

    let franchise_profit = percent_of(rates.franchise_rate, fare);
    let admin_profit = percent_of(rates.admin_rate, fare);
    let driver_profit = fare - franchise_profit - admin_profit;

    if driver_profit < 0 {
        error!(
            fare,
            admin_rate = rates.admin_rate,
            franchise_rate = rates.franchise_rate,
            "commission split leaves the driver a negative share"
        );
        return Err(AppError::Integrity(format!(
            "commission split of fare {fare} would leave the driver {driver_profit}"
        )));
    }

    Ok(CommissionSplit {
        admin_rate: rates.admin_rate,
        franchise_rate: rates.franchise_rate,
        admin_profit,
        franchise_profit,
        driver_profit,
    })
}

/// Returns the franchise's settings, creating the default row on first use.
pub fn get_or_create_settings(state: &AppState, franchise_id: Uuid, actor: Uuid) -> CommissionSetting {
    state
        .commission_settings
        .entry(franchise_id)
        .or_insert_with(|| {
            info!(%franchise_id, "created default commission settings");
            CommissionSetting::with_defaults(franchise_id, actor)
        })
        .value()
        .clone()
}

/// Rates for a driver's resolved franchise, or the platform default.
pub async fn resolve_rates(state: &AppState, franchise: Option<&Franchise>) -> CommissionRates {
    let Some(franchise) = franchise.filter(|franchise| franchise.is_operational()) else {
        return CommissionRates::platform_default();
    };

    let actor = state.admin_id().await;
    let settings = get_or_create_settings(state, franchise.id, actor);
    if settings.is_active {
        CommissionRates {
            admin_rate: settings.admin_rate,
            franchise_rate: settings.franchise_rate,
        }
    } else {
        CommissionRates {
            admin_rate: DEFAULT_FRANCHISE_ADMIN_RATE,
            franchise_rate: DEFAULT_FRANCHISE_RATE,
        }
    }
}

/// Resolves the driver's franchise and prices the fare split. Used both for
/// quotes during discovery and for the split frozen at acceptance.
pub async fn resolve_split(
    state: &AppState,
    driver: &Driver,
    fare: i64,
) -> Result<(Option<Franchise>, CommissionSplit), AppError> {
    let franchise = state.operational_franchise(driver);
    let rates = resolve_rates(state, franchise.as_ref()).await;
    let split = split(fare, rates)?;
    Ok((franchise, split))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommissionSettingsUpdate {
    pub admin_rate: Option<f64>,
    pub franchise_rate: Option<f64>,
    pub reason: Option<String>,
}

pub async fn settings_for(state: &AppState, franchise_id: Uuid) -> Result<CommissionSetting, AppError> {
    state.franchise(franchise_id)?;
    let actor = state.admin_id().await;
    Ok(get_or_create_settings(state, franchise_id, actor))
}

pub async fn update_settings(
    state: &AppState,
    franchise_id: Uuid,
    update: CommissionSettingsUpdate,
) -> Result<CommissionSetting, AppError> {
    if update.admin_rate.is_none() && update.franchise_rate.is_none() {
        return Err(AppError::Validation("no fields provided for update".to_string()));
    }

    let current = settings_for(state, franchise_id).await?;
    let admin_rate = update.admin_rate.unwrap_or(current.admin_rate);
    let franchise_rate = update.franchise_rate.unwrap_or(current.franchise_rate);
    validate_rates(admin_rate, franchise_rate)?;

    let actor = state.admin_id().await;
    let reason = update
        .reason
        .unwrap_or_else(|| "Commission settings updated".to_string());
    let now = Utc::now();

    let mut entry = state
        .commission_settings
        .get_mut(&franchise_id)
        .ok_or_else(|| AppError::NotFound(format!("commission settings for {franchise_id} not found")))?;

    for (field, old_value, new_value) in [
        (CommissionField::AdminRate, entry.admin_rate, admin_rate),
        (CommissionField::FranchiseRate, entry.franchise_rate, franchise_rate),
    ] {
        if old_value != new_value {
            entry.history.push(CommissionChange {
                field,
                old_value,
                new_value,
                changed_by: actor,
                changed_at: now,
                reason: reason.clone(),
            });
        }
    }
    entry.admin_rate = admin_rate;
    entry.franchise_rate = franchise_rate;
    entry.last_changed_by = actor;
    entry.updated_at = now;

    info!(%franchise_id, admin_rate, franchise_rate, "commission settings updated");
    Ok(entry.value().clone())
}

pub async fn set_active(
    state: &AppState,
    franchise_id: Uuid,
    active: bool,
    reason: Option<String>,
) -> Result<CommissionSetting, AppError> {
    let current = settings_for(state, franchise_id).await?;
    if current.is_active == active {
        let verb = if active { "active" } else { "inactive" };
        return Err(AppError::Conflict(format!("commission settings are already {verb}")));
    }

    let actor = state.admin_id().await;
    let now = Utc::now();
    let default_reason = if active {
        "Commission settings reactivated"
    } else {
        "Commission settings deactivated"
    };

    let mut entry = state
        .commission_settings
        .get_mut(&franchise_id)
        .ok_or_else(|| AppError::NotFound(format!("commission settings for {franchise_id} not found")))?;
    entry.history.push(CommissionChange {
        field: CommissionField::Status,
        old_value: if active { 0.0 } else { 1.0 },
        new_value: if active { 1.0 } else { 0.0 },
        changed_by: actor,
        changed_at: now,
        reason: reason.unwrap_or_else(|| default_reason.to_string()),
    });
    entry.is_active = active;
    entry.last_changed_by = actor;
    entry.updated_at = now;

    info!(%franchise_id, active, "commission settings status changed");
    Ok(entry.value().clone())
}

#[cfg(test)]
mod tests {
    use super::{
        resolve_split, set_active, split, update_settings, CommissionRates,
        CommissionSettingsUpdate,
    };
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::driver::{Driver, GeoPoint};
    use crate::models::franchise::Franchise;
    use crate::state::AppState;

    const FRANCHISE_DEFAULT: CommissionRates = CommissionRates {
        admin_rate: 18.0,
        franchise_rate: 10.0,
    };

    fn point() -> GeoPoint {
        GeoPoint { lat: 12.9716, lng: 77.5946 }
    }

    #[test]
    fn platform_driver_keeps_the_remainder() {
        let split = split(100, CommissionRates::platform_default()).unwrap();
        assert_eq!(split.admin_profit, 18);
        assert_eq!(split.franchise_profit, 0);
        assert_eq!(split.driver_profit, 82);
    }

    #[test]
    fn franchise_driver_pays_both_commissions() {
        let split = split(100, FRANCHISE_DEFAULT).unwrap();
        assert_eq!(split.franchise_profit, 10);
        assert_eq!(split.admin_profit, 18);
        assert_eq!(split.driver_profit, 72);
        assert_eq!(split.total(), 100);
    }

    #[test]
    fn shares_always_sum_to_the_fare() {
        let rate_pairs = [(18.0, 10.0), (18.0, 0.0), (12.5, 7.5), (0.0, 0.0), (33.0, 33.0), (49.0, 49.0)];
        for fare in [1_i64, 7, 33, 99, 100, 101, 257, 1_234, 99_999] {
            for (admin_rate, franchise_rate) in rate_pairs {
                if let Ok(split) = split(fare, CommissionRates { admin_rate, franchise_rate }) {
                    assert_eq!(split.total(), fare);
                    assert!(split.admin_profit >= 0 && split.franchise_profit >= 0);
                    assert!(split.driver_profit >= 0);
                }
            }
        }
    }

    #[test]
    fn rounding_that_overdraws_the_driver_is_an_integrity_error() {
        let rates = CommissionRates {
            admin_rate: 50.0,
            franchise_rate: 50.0,
        };
        assert!(matches!(split(3, rates), Err(AppError::Integrity(_))));
    }

    #[tokio::test]
    async fn first_use_creates_default_settings_once() {
        let state = AppState::new(&Config::default());
        let franchise_id = state.insert_franchise(Franchise::new("North"));
        let driver = Driver::new("Asha", "9000000001", point()).with_franchise(franchise_id);

        let (franchise, first) = resolve_split(&state, &driver, 100).await.unwrap();
        let (_, second) = resolve_split(&state, &driver, 100).await.unwrap();

        assert_eq!(franchise.map(|f| f.id), Some(franchise_id));
        assert_eq!(first, second);
        let settings = state.commission_settings.get(&franchise_id).unwrap();
        assert_eq!(settings.history.len(), 2);
        assert_eq!(state.commission_settings.len(), 1);
    }

    #[tokio::test]
    async fn inactive_franchise_falls_back_to_platform_rate() {
        let state = AppState::new(&Config::default());
        let mut franchise = Franchise::new("Paused");
        franchise.is_approved = false;
        let franchise_id = state.insert_franchise(franchise);
        let driver = Driver::new("Ravi", "9000000002", point()).with_franchise(franchise_id);

        let (franchise, split) = resolve_split(&state, &driver, 100).await.unwrap();

        assert!(franchise.is_none());
        assert_eq!((split.admin_profit, split.franchise_profit, split.driver_profit), (18, 0, 82));
        assert!(state.commission_settings.is_empty());
    }

    #[tokio::test]
    async fn updated_rates_apply_to_new_splits() {
        let state = AppState::new(&Config::default());
        let franchise_id = state.insert_franchise(Franchise::new("East"));
        let driver = Driver::new("Meera", "9000000003", point()).with_franchise(franchise_id);

        let updated = update_settings(
            &state,
            franchise_id,
            CommissionSettingsUpdate {
                franchise_rate: Some(15.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.history.len(), 3);

        let (_, split) = resolve_split(&state, &driver, 200).await.unwrap();
        assert_eq!((split.admin_profit, split.franchise_profit, split.driver_profit), (36, 30, 134));
    }

    #[tokio::test]
    async fn update_rejects_rates_over_one_hundred_percent() {
        let state = AppState::new(&Config::default());
        let franchise_id = state.insert_franchise(Franchise::new("West"));

        let result = update_settings(
            &state,
            franchise_id,
            CommissionSettingsUpdate {
                admin_rate: Some(60.0),
                franchise_rate: Some(45.0),
                reason: None,
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let settings = state.commission_settings.get(&franchise_id).unwrap();
        assert_eq!(settings.admin_rate, 18.0);
    }

    #[tokio::test]
    async fn deactivated_settings_use_franchise_defaults() {
        let state = AppState::new(&Config::default());
        let franchise_id = state.insert_franchise(Franchise::new("South"));
        let driver = Driver::new("Kiran", "9000000004", point()).with_franchise(franchise_id);

        update_settings(
            &state,
            franchise_id,
            CommissionSettingsUpdate {
                admin_rate: Some(20.0),
                franchise_rate: Some(20.0),
                reason: None,
            },
        )
        .await
        .unwrap();
        set_active(&state, franchise_id, false, None).await.unwrap();
        assert!(matches!(
            set_active(&state, franchise_id, false, None).await,
            Err(AppError::Conflict(_))
        ));

        let (_, split) = resolve_split(&state, &driver, 100).await.unwrap();
        assert_eq!((split.admin_profit, split.franchise_profit), (18, 10));
    }
}
