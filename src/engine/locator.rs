use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::commission::resolve_split;
use crate::engine::fare::{quote, FareQuote};
use crate::error::AppError;
use crate::geo::{haversine_km, validate_point, within_radius};
use crate::models::driver::{Driver, GeoPoint};
use crate::models::ride::CommissionSplit;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct FindDrivers {
    pub rider_id: Uuid,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub ride_start_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EtaRange {
    pub min_minutes: f64,
    pub max_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    pub franchise_id: Option<Uuid>,
    pub franchise_name: Option<String>,
    pub distance_to_pickup_km: f64,
    pub eta: EtaRange,
    pub fare: FareQuote,
    pub total_price: i64,
    pub commission: CommissionSplit,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverSearch {
    pub is_available: bool,
    pub pickup_to_drop_km: f64,
    pub search_radius_km: f64,
    pub available_drivers: Vec<DriverCandidate>,
}

pub fn eta_range(distance_km: f64, min_speed_kmh: f64, max_speed_kmh: f64) -> EtaRange {
    EtaRange {
        min_minutes: distance_km / max_speed_kmh * 60.0,
        max_minutes: distance_km / min_speed_kmh * 60.0,
    }
}

/// Active, idle drivers within the search radius whose dues are under the
/// dispatch limit, nearest first.
fn nearby_drivers(state: &AppState, pickup: &GeoPoint) -> Vec<(Driver, f64)> {
    let policy = &state.dispatch;
    let mut candidates: Vec<(Driver, f64)> = state
        .drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            let eligible = driver.is_active
                && driver.is_approved
                && !driver.is_engaged()
                && driver.wallets.due < policy.due_wallet_limit
                && within_radius(pickup, &driver.location, policy.search_radius_km);

            if eligible {
                Some((driver.clone(), haversine_km(&driver.location, pickup)))
            } else {
                None
            }
        })
        .collect();

    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates
}

pub async fn find_drivers(state: &AppState, request: FindDrivers) -> Result<DriverSearch, AppError> {
    let start = Instant::now();
    let result = search(state, request).await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .driver_search_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

async fn search(state: &AppState, request: FindDrivers) -> Result<DriverSearch, AppError> {
    validate_point("pickup", &request.pickup)?;
    validate_point("drop", &request.drop)?;
    state.rider(request.rider_id)?;

    let settings = state.fare_snapshot().await;
    let pickup_to_drop_km = haversine_km(&request.pickup, &request.drop);
    let nearby = nearby_drivers(state, &request.pickup);

    let mut available_drivers = Vec::with_capacity(nearby.len());
    for (driver, distance_to_pickup_km) in nearby {
        let fare = quote(
            &settings,
            distance_to_pickup_km + pickup_to_drop_km,
            request.ride_start_time,
        )?;
        let (franchise, commission) = resolve_split(state, &driver, fare.total_fare).await?;

        available_drivers.push(DriverCandidate {
            driver_id: driver.id,
            name: driver.name,
            phone: driver.phone,
            location: driver.location,
            franchise_id: franchise.as_ref().map(|franchise| franchise.id),
            franchise_name: franchise.map(|franchise| franchise.name),
            distance_to_pickup_km,
            eta: eta_range(
                distance_to_pickup_km,
                state.dispatch.min_speed_kmh,
                state.dispatch.max_speed_kmh,
            ),
            total_price: fare.total_fare,
            fare,
            commission,
        });
    }

    state
        .metrics
        .driver_search_candidates
        .observe(available_drivers.len() as f64);

    if available_drivers.is_empty() {
        warn!(rider_id = %request.rider_id, "no available drivers near pickup");
    } else {
        info!(
            rider_id = %request.rider_id,
            candidates = available_drivers.len(),
            "drivers found"
        );
    }

    Ok(DriverSearch {
        is_available: !available_drivers.is_empty(),
        pickup_to_drop_km,
        search_radius_km: state.dispatch.search_radius_km,
        available_drivers,
    })
}
