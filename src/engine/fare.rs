use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::settings::{FareChange, FareField, FareSetting};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareQuote {
    pub base_fare: f64,
    pub distance_km: f64,
    pub per_km_charge: f64,
    pub distance_charge: i64,
    pub is_night_time: bool,
    pub night_surcharge_percent: f64,
    pub total_fare: i64,
}

/// Night windows may wrap past midnight (22 -> 6). Equal bounds mean no window.
pub fn is_night_hour(hour: u32, start: u32, end: u32) -> bool {
    if start < end {
        hour >= start && hour < end
    } else if start > end {
        hour >= start || hour < end
    } else {
        false
    }
}

/// Prices a ride from the given settings snapshot. The ride start time is
/// taken in the rider's local offset, which decides the night window.
pub fn quote(
    settings: &FareSetting,
    distance_km: f64,
    ride_start: Option<DateTime<FixedOffset>>,
) -> Result<FareQuote, AppError> {
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(AppError::Validation(
            "distance must be a positive number of kilometres".to_string(),
        ));
    }

    let distance_charge = distance_km * settings.per_km_charge;
    let mut total_fare = (settings.base_fare + distance_charge).ceil();

    let is_night_time = ride_start
        .map(|start| {
            is_night_hour(
                start.hour(),
                settings.night_start_hour,
                settings.night_end_hour,
            )
        })
        .unwrap_or(false);

    if is_night_time {
        total_fare = (total_fare * (100.0 + settings.night_surcharge_percent) / 100.0).ceil();
    }

    Ok(FareQuote {
        base_fare: settings.base_fare,
        distance_km,
        per_km_charge: settings.per_km_charge,
        distance_charge: distance_charge.ceil() as i64,
        is_night_time,
        night_surcharge_percent: if is_night_time {
            settings.night_surcharge_percent
        } else {
            0.0
        },
        total_fare: total_fare as i64,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FareSettingsUpdate {
    pub base_fare: Option<f64>,
    pub per_km_charge: Option<f64>,
    pub night_surcharge_percent: Option<f64>,
    pub night_start_hour: Option<u32>,
    pub night_end_hour: Option<u32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FareSettingsChanged {
    pub settings: FareSetting,
    pub changes: Vec<FareChange>,
}

fn validate_field(field: FareField, value: f64) -> Result<(), AppError> {
    let message = match field {
        FareField::BaseFare if value < 0.0 => "base fare cannot be negative",
        FareField::PerKmCharge if value < 0.0 => "per km charge cannot be negative",
        FareField::NightSurchargePercent if !(0.0..=100.0).contains(&value) => {
            "night surcharge must be between 0 and 100"
        }
        FareField::NightStartHour if value > 23.0 => "night start hour must be between 0 and 23",
        FareField::NightEndHour if value > 23.0 => "night end hour must be between 0 and 23",
        _ if !value.is_finite() => "fare settings must be finite numbers",
        _ => return Ok(()),
    };
    Err(AppError::Validation(message.to_string()))
}

fn apply_field(settings: &mut FareSetting, field: FareField, value: f64) {
    match field {
        FareField::BaseFare => settings.base_fare = value,
        FareField::PerKmCharge => settings.per_km_charge = value,
        FareField::NightSurchargePercent => settings.night_surcharge_percent = value,
        FareField::NightStartHour => settings.night_start_hour = value as u32,
        FareField::NightEndHour => settings.night_end_hour = value as u32,
    }
}

/// Applies the given fields, all validated before any is written. Unchanged
/// values leave no history.
pub async fn update_fare_settings(
    state: &AppState,
    update: FareSettingsUpdate,
) -> Result<FareSettingsChanged, AppError> {
    let requested: Vec<(FareField, f64)> = [
        (FareField::BaseFare, update.base_fare),
        (FareField::PerKmCharge, update.per_km_charge),
        (FareField::NightSurchargePercent, update.night_surcharge_percent),
        (FareField::NightStartHour, update.night_start_hour.map(f64::from)),
        (FareField::NightEndHour, update.night_end_hour.map(f64::from)),
    ]
    .into_iter()
    .filter_map(|(field, value)| value.map(|value| (field, value)))
    .collect();

    if requested.is_empty() {
        return Err(AppError::Validation("no fields provided for update".to_string()));
    }
    for (field, value) in &requested {
        validate_field(*field, *value)?;
    }

    let reason = update
        .reason
        .unwrap_or_else(|| "Fare settings updated".to_string());
    let actor = state.admin_id().await;
    let changes = write_fields(state, actor, &requested, &reason).await;
    let settings = state.fare_snapshot().await;

    info!(changes = changes.len(), "fare settings updated");
    Ok(FareSettingsChanged { settings, changes })
}

/// Restores the configured defaults.
pub async fn reset_fare_settings(
    state: &AppState,
    reason: Option<String>,
) -> Result<FareSettingsChanged, AppError> {
    let reason = reason
        .filter(|reason| !reason.trim().is_empty())
        .ok_or_else(|| AppError::Validation("reason for reset is required".to_string()))?;

    let defaults = FareSetting::from_defaults(&state.fare_defaults);
    let current = state.fare_snapshot().await;
    let actor = state.admin_id().await;
    let now = Utc::now();

    let changes: Vec<FareChange> = [
        FareField::BaseFare,
        FareField::PerKmCharge,
        FareField::NightSurchargePercent,
        FareField::NightStartHour,
        FareField::NightEndHour,
    ]
    .into_iter()
    .filter(|field| current.value(*field) != defaults.value(*field))
    .map(|field| FareChange {
        field,
        old_value: current.value(field),
        new_value: defaults.value(field),
        changed_by: actor,
        changed_at: now,
        reason: format!("Reset to default: {reason}"),
    })
    .collect();

    if !changes.is_empty() {
        let mut next = defaults;
        next.last_changed_by = Some(actor);
        next.history = changes.clone();
        state.reload_fare_settings(next).await;
        info!(changes = changes.len(), "fare settings reset to defaults");
    }

    Ok(FareSettingsChanged {
        settings: state.fare_snapshot().await,
        changes,
    })
}

async fn write_fields(
    state: &AppState,
    actor: Uuid,
    requested: &[(FareField, f64)],
    reason: &str,
) -> Vec<FareChange> {
    let mut settings = state.fare_settings.write().await;
    let now = Utc::now();
    let mut changes = Vec::new();

    for (field, value) in requested {
        let old_value = settings.value(*field);
        if old_value == *value {
            continue;
        }
        apply_field(&mut settings, *field, *value);
        changes.push(FareChange {
            field: *field,
            old_value,
            new_value: *value,
            changed_by: actor,
            changed_at: now,
            reason: reason.to_string(),
        });
    }

    if !changes.is_empty() {
        settings.history.extend(changes.iter().cloned());
        settings.last_changed_by = Some(actor);
        settings.updated_at = now;
    }
    changes
}
