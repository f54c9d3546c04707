use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub event_buffer_size: usize,
    pub admin_name: String,
    pub dispatch: DispatchPolicy,
    pub fare_defaults: FareDefaults,
}

/// Eligibility and ETA parameters used by driver discovery.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub search_radius_km: f64,
    /// Drivers owing this much or more are not offered rides.
    pub due_wallet_limit: i64,
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
}

#[derive(Debug, Clone)]
pub struct FareDefaults {
    pub base_fare: f64,
    pub per_km_charge: f64,
    pub night_surcharge_percent: f64,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            search_radius_km: 5.0,
            due_wallet_limit: 500,
            min_speed_kmh: 18.0,
            max_speed_kmh: 30.0,
        }
    }
}

impl Default for FareDefaults {
    fn default() -> Self {
        Self {
            base_fare: 20.0,
            per_km_charge: 8.0,
            night_surcharge_percent: 20.0,
            night_start_hour: 22,
            night_end_hour: 6,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            event_buffer_size: 1024,
            admin_name: "admin".to_string(),
            dispatch: DispatchPolicy::default(),
            fare_defaults: FareDefaults::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let dispatch = DispatchPolicy::default();
        let fare = FareDefaults::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            admin_name: env::var("ADMIN_NAME").unwrap_or_else(|_| "admin".to_string()),
            dispatch: DispatchPolicy {
                search_radius_km: parse_or_default("SEARCH_RADIUS_KM", dispatch.search_radius_km)?,
                due_wallet_limit: parse_or_default("DUE_WALLET_LIMIT", dispatch.due_wallet_limit)?,
                min_speed_kmh: parse_or_default("MIN_SPEED_KMH", dispatch.min_speed_kmh)?,
                max_speed_kmh: parse_or_default("MAX_SPEED_KMH", dispatch.max_speed_kmh)?,
            },
            fare_defaults: FareDefaults {
                base_fare: parse_or_default("BASE_FARE", fare.base_fare)?,
                per_km_charge: parse_or_default("PER_KM_CHARGE", fare.per_km_charge)?,
                night_surcharge_percent: parse_or_default(
                    "NIGHT_SURCHARGE_PERCENT",
                    fare.night_surcharge_percent,
                )?,
                night_start_hour: parse_or_default("NIGHT_START_HOUR", fare.night_start_hour)?,
                night_end_hour: parse_or_default("NIGHT_END_HOUR", fare.night_end_hour)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let fare = &self.fare_defaults;
        if fare.base_fare < 0.0 || fare.per_km_charge < 0.0 {
            return Err(AppError::Internal("fare defaults cannot be negative".to_string()));
        }
        if !(0.0..=100.0).contains(&fare.night_surcharge_percent) {
            return Err(AppError::Internal(
                "NIGHT_SURCHARGE_PERCENT must be within 0..=100".to_string(),
            ));
        }
        if fare.night_start_hour > 23 || fare.night_end_hour > 23 {
            return Err(AppError::Internal("night hours must be within 0..=23".to_string()));
        }
        let dispatch = &self.dispatch;
        if dispatch.min_speed_kmh <= 0.0 || dispatch.max_speed_kmh < dispatch.min_speed_kmh {
            return Err(AppError::Internal(
                "speeds must be positive and MIN_SPEED_KMH <= MAX_SPEED_KMH".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
