use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::commission::{resolve_rates, split};
use crate::error::AppError;
use crate::geo::validate_point;
use crate::models::driver::{Driver, GeoPoint};
use crate::models::event::EventName;
use crate::models::ride::{CommissionSplit, Ride, RideStatus};
use crate::state::AppState;

/// Three-digit numeric session code. Not a secret, just a handshake.
pub fn generate_otp() -> String {
    rand::rng().random_range(100..=999).to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptRide {
    pub driver_id: Uuid,
    pub rider_id: Uuid,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub total_km: f64,
    pub total_price: i64,
    /// The split quoted during discovery. Informational only: the frozen
    /// split is always resolved from the driver's current rates.
    pub commission: Option<CommissionSplit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRide {
    pub driver_id: Uuid,
    pub rider_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtp {
    pub ride_id: Uuid,
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRide {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
}

pub async fn accept_ride(state: &AppState, request: AcceptRide) -> Result<Ride, AppError> {
    validate_point("pickup", &request.pickup)?;
    validate_point("drop", &request.drop)?;
    if !request.total_km.is_finite() || request.total_km <= 0.0 {
        return Err(AppError::Validation("total_km must be positive".to_string()));
    }
    if request.total_price <= 0 {
        return Err(AppError::Validation("total_price must be positive".to_string()));
    }

    let admin_id = state.admin_id().await;
    let _tx = state.transaction().await;

    let rider = state.rider(request.rider_id)?;
    let driver = state.driver(request.driver_id)?;

    if rider.is_engaged() {
        return Err(AppError::Conflict("rider is already on a ride".to_string()));
    }
    if driver.is_engaged() {
        return Err(AppError::Conflict("driver is already on a ride".to_string()));
    }
    if !driver.is_active || !driver.is_approved {
        return Err(AppError::Conflict("driver is not eligible for rides".to_string()));
    }

    let franchise = state.operational_franchise(&driver);
    let rates = resolve_rates(state, franchise.as_ref()).await;
    let commission = split(request.total_price, rates)?;
    if request.commission.is_some_and(|quoted| quoted != commission) {
        warn!(
            driver_id = %driver.id,
            "quoted commission differs from the driver's current rates; using resolved split"
        );
    }

    let ride = Ride {
        id: Uuid::new_v4(),
        admin_id,
        driver_id: driver.id,
        rider_id: rider.id,
        franchise_id: franchise.as_ref().map(|franchise| franchise.id),
        pickup: request.pickup,
        drop: request.drop,
        total_km: request.total_km,
        total_amount: request.total_price,
        commission,
        pickup_otp: generate_otp(),
        drop_otp: generate_otp(),
        status: RideStatus::Accepted,
        payment_mode: None,
        accepted_at: Utc::now(),
        started_at: None,
        ended_at: None,
        paid_at: None,
    };

    if let Some(mut rider) = state.riders.get_mut(&ride.rider_id) {
        rider.current_ride = Some(ride.id);
        rider.updated_at = ride.accepted_at;
    }
    if let Some(mut driver) = state.drivers.get_mut(&ride.driver_id) {
        driver.current_ride = Some(ride.id);
        driver.updated_at = ride.accepted_at;
    }
    state.rides.insert(ride.id, ride.clone());

    state.metrics.ride_event("accepted");
    state.metrics.active_rides.inc();
    info!(
        ride_id = %ride.id,
        driver_id = %ride.driver_id,
        rider_id = %ride.rider_id,
        total_amount = ride.total_amount,
        "ride accepted"
    );

    state.notify(
        ride.rider_id,
        EventName::RideAccepted,
        json!({
            "ride_id": ride.id,
            "driver_id": ride.driver_id,
            "driver_location": driver.location,
            "total_price": ride.total_amount,
            "pickup_otp": ride.pickup_otp,
            "drop_otp": ride.drop_otp,
        }),
    );
    state.notify(
        ride.driver_id,
        EventName::RideAccepted,
        json!({
            "ride_id": ride.id,
            "rider_id": ride.rider_id,
            "rider_location": rider.location,
            "pickup": ride.pickup,
            "drop": ride.drop,
            "total_amount": ride.total_amount,
            "commission": ride.commission,
            "has_franchise": ride.franchise_id.is_some(),
        }),
    );

    Ok(ride)
}

pub async fn reject_ride(state: &AppState, request: RejectRide) -> Result<(), AppError> {
    let rider = state.rider(request.rider_id)?;
    state.driver(request.driver_id)?;

    state.metrics.ride_event("rejected");
    info!(driver_id = %request.driver_id, rider_id = %rider.id, "ride request rejected");

    state.notify(
        rider.id,
        EventName::RideRejected,
        json!({
            "is_booked": false,
            "message": "Your ride request has been rejected by the driver",
        }),
    );
    Ok(())
}

pub async fn verify_pickup_otp(state: &AppState, request: VerifyOtp) -> Result<Ride, AppError> {
    let _tx = state.transaction().await;

    let ride = state.ride(request.ride_id)?;
    if ride.status != RideStatus::Accepted {
        return Err(AppError::Conflict("pickup OTP already verified".to_string()));
    }
    state.rider(ride.rider_id)?;
    state.driver(ride.driver_id)?;

    if ride.pickup_otp != request.otp.trim() {
        warn!(ride_id = %ride.id, "invalid pickup OTP");
        return Err(AppError::Validation("invalid pickup OTP".to_string()));
    }

    let now = Utc::now();
    if let Some(mut rider) = state.riders.get_mut(&ride.rider_id) {
        rider.is_on_ride = true;
        rider.current_ride = Some(ride.id);
        rider.updated_at = now;
    }
    if let Some(mut driver) = state.drivers.get_mut(&ride.driver_id) {
        driver.is_on_ride = true;
        driver.current_ride = Some(ride.id);
        driver.updated_at = now;
    }

    let mut started = ride;
    started.status = RideStatus::Started;
    started.started_at = Some(now);
    state.rides.insert(started.id, started.clone());

    state.metrics.ride_event("pickup_verified");
    info!(ride_id = %started.id, "pickup verified, ride started");

    let payload = json!({
        "ride_id": started.id,
        "is_ride_started": true,
        "message": "Pickup OTP verified. Ride is now active.",
    });
    state.notify(started.rider_id, EventName::PickupVerified, payload.clone());
    state.notify(started.driver_id, EventName::PickupVerified, payload);

    Ok(started)
}

pub async fn verify_drop_otp(state: &AppState, request: VerifyOtp) -> Result<Ride, AppError> {
    let _tx = state.transaction().await;

    let ride = state.ride(request.ride_id)?;
    match ride.status {
        RideStatus::Started => {}
        RideStatus::Accepted => {
            return Err(AppError::Conflict("pickup OTP has not been verified".to_string()));
        }
        RideStatus::Ended | RideStatus::Paid => {
            return Err(AppError::Conflict("drop OTP already verified".to_string()));
        }
    }
    state.rider(ride.rider_id)?;
    state.driver(ride.driver_id)?;

    if ride.drop_otp != request.otp.trim() {
        warn!(ride_id = %ride.id, "invalid drop OTP");
        return Err(AppError::Validation("invalid drop OTP".to_string()));
    }

    let now = Utc::now();
    if let Some(mut rider) = state.riders.get_mut(&ride.rider_id) {
        rider.is_on_ride = false;
        rider.current_ride = None;
        rider.completed_rides.push(ride.id);
        rider.updated_at = now;
    }
    if let Some(mut driver) = state.drivers.get_mut(&ride.driver_id) {
        driver.is_on_ride = false;
        driver.current_ride = None;
        driver.updated_at = now;
    }

    let mut ended = ride;
    ended.status = RideStatus::Ended;
    ended.ended_at = Some(now);
    state.rides.insert(ended.id, ended.clone());

    state.metrics.ride_event("completed");
    state.metrics.active_rides.dec();
    info!(ride_id = %ended.id, "drop verified, ride ended");

    let payload = json!({
        "ride_id": ended.id,
        "is_ride_ended": true,
        "total_amount": ended.total_amount,
        "message": "Ride completed and OTP verified",
    });
    state.notify(ended.rider_id, EventName::RideCompleted, payload.clone());
    state.notify(ended.driver_id, EventName::RideCompleted, payload);

    Ok(ended)
}

/// Only the booking rider may cancel, and only before pickup.
pub async fn cancel_ride(state: &AppState, request: CancelRide) -> Result<(), AppError> {
    let _tx = state.transaction().await;

    let ride = state.ride(request.ride_id)?;
    if ride.rider_id != request.rider_id {
        return Err(AppError::Forbidden(
            "you are not authorized to cancel this ride".to_string(),
        ));
    }
    if ride.is_picked_up() {
        return Err(AppError::Conflict(
            "ride cannot be cancelled after pickup".to_string(),
        ));
    }
    state.driver(ride.driver_id)?;

    state.rides.remove(&ride.id);
    let now = Utc::now();
    if let Some(mut rider) = state.riders.get_mut(&ride.rider_id) {
        if rider.current_ride == Some(ride.id) {
            rider.current_ride = None;
            rider.updated_at = now;
        }
    }
    if let Some(mut driver) = state.drivers.get_mut(&ride.driver_id) {
        if driver.current_ride == Some(ride.id) {
            driver.current_ride = None;
            driver.updated_at = now;
        }
    }

    state.metrics.ride_event("cancelled");
    state.metrics.active_rides.dec();
    info!(ride_id = %ride.id, rider_id = %ride.rider_id, "ride cancelled");

    state.notify(
        ride.driver_id,
        EventName::CancelRide,
        json!({
            "ride_id": ride.id,
            "is_cancel": true,
            "message": "Ride Canceled",
        }),
    );
    Ok(())
}

/// Toggles availability under the same guard as accept, so a driver cannot
/// go offline between the eligibility check and the booking.
pub async fn set_driver_active(
    state: &AppState,
    driver_id: Uuid,
    is_active: bool,
) -> Result<Driver, AppError> {
    let _tx = state.transaction().await;

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
    if !is_active && driver.is_engaged() {
        return Err(AppError::Conflict(
            "driver cannot go offline during a ride".to_string(),
        ));
    }
    driver.is_active = is_active;
    driver.updated_at = Utc::now();
    info!(%driver_id, is_active, "driver status updated");

    Ok(driver.clone())
}

pub fn active_rides(state: &AppState) -> Vec<Ride> {
    let mut rides: Vec<Ride> = state
        .rides
        .iter()
        .filter(|entry| entry.value().is_active())
        .map(|entry| entry.value().clone())
        .collect();
    rides.sort_by_key(|ride| ride.accepted_at);
    rides
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RideHistoryFilter {
    pub rider_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyContact {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideHistoryEntry {
    pub ride: Ride,
    pub driver: Option<PartyContact>,
    pub rider: Option<PartyContact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideHistory {
    pub rides: Vec<RideHistoryEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverOnRide {
    pub driver_id: Uuid,
    pub ride_id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideStats {
    pub total_rides: usize,
    pub ended_rides: usize,
    /// Fare total of every ride past the drop OTP, paid or not.
    pub earnings_of_ended_rides: i64,
    pub drivers_on_ride: Vec<DriverOnRide>,
}

/// Finished and paid rides, newest first. A party removed since the ride
/// shows up as `None`.
pub fn ride_history(state: &AppState, filter: &RideHistoryFilter) -> RideHistory {
    let mut rides: Vec<Ride> = state
        .rides
        .iter()
        .filter(|ride| ride.status == RideStatus::Paid && ride.ended_at.is_some())
        .filter(|ride| filter.rider_id.is_none_or(|id| ride.rider_id == id))
        .filter(|ride| filter.driver_id.is_none_or(|id| ride.driver_id == id))
        .map(|ride| ride.value().clone())
        .collect();
    rides.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));

    let rides: Vec<RideHistoryEntry> = rides
        .into_iter()
        .map(|ride| RideHistoryEntry {
            driver: state.driver(ride.driver_id).ok().map(|driver| PartyContact {
                id: driver.id,
                name: driver.name,
                phone: driver.phone,
            }),
            rider: state.rider(ride.rider_id).ok().map(|rider| PartyContact {
                id: rider.id,
                name: rider.name,
                phone: rider.phone,
            }),
            ride,
        })
        .collect();

    RideHistory {
        total: rides.len(),
        rides,
    }
}

pub fn ride_stats(state: &AppState) -> RideStats {
    let mut ended_rides = 0;
    let mut earnings_of_ended_rides = 0;
    let mut on_ride = Vec::new();
    for ride in state.rides.iter() {
        match ride.status {
            RideStatus::Ended | RideStatus::Paid => {
                ended_rides += 1;
                earnings_of_ended_rides += ride.total_amount;
            }
            RideStatus::Started => on_ride.push((ride.driver_id, ride.id)),
            RideStatus::Accepted => {}
        }
    }

    let mut drivers_on_ride: Vec<DriverOnRide> = on_ride
        .into_iter()
        .filter_map(|(driver_id, ride_id)| {
            let driver = state.driver(driver_id).ok()?;
            Some(DriverOnRide {
                driver_id,
                ride_id,
                name: driver.name,
                phone: driver.phone,
                location: driver.location,
            })
        })
        .collect();
    drivers_on_ride.sort_by(|a, b| a.name.cmp(&b.name));

    RideStats {
        total_rides: state.rides.len(),
        ended_rides,
        earnings_of_ended_rides,
        drivers_on_ride,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast::error::TryRecvError;
    use uuid::Uuid;

    use super::{
        accept_ride, active_rides, cancel_ride, generate_otp, reject_ride, ride_history,
        ride_stats, set_driver_active, verify_drop_otp, verify_pickup_otp, AcceptRide,
        CancelRide, RejectRide, RideHistoryFilter, VerifyOtp,
    };
    use crate::config::Config;
    use crate::engine::commission::{split, CommissionRates};
    use crate::engine::ledger::{post_payment, SetPaymentMode};
    use crate::error::AppError;
    use crate::models::driver::{Driver, GeoPoint};
    use crate::models::event::EventName;
    use crate::models::franchise::Franchise;
    use crate::models::ride::{PaymentMode, RideStatus};
    use crate::models::rider::Rider;
    use crate::state::AppState;

    const PICKUP: GeoPoint = GeoPoint { lat: 12.9716, lng: 77.5946 };
    const DROP: GeoPoint = GeoPoint { lat: 13.0100, lng: 77.6200 };

    fn setup() -> (AppState, Uuid, Uuid) {
        let state = AppState::new(&Config::default());
        let rider_id = state.insert_rider(Rider::new("Nisha", "8000000001"));
        let driver_id = state.insert_driver(Driver::new("Arjun", "9000000001", PICKUP));
        (state, rider_id, driver_id)
    }

    fn accept(rider_id: Uuid, driver_id: Uuid) -> AcceptRide {
        AcceptRide {
            driver_id,
            rider_id,
            pickup: PICKUP,
            drop: DROP,
            total_km: 10.0,
            total_price: 100,
            commission: None,
        }
    }

    fn wrong(otp: &str) -> String {
        if otp == "999" { "100".to_string() } else { "999".to_string() }
    }

    #[test]
    fn otps_are_three_digits() {
        for _ in 0..200 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 3);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn accept_freezes_split_and_reserves_both_parties() {
        let (state, rider_id, driver_id) = setup();
        let mut events = state.events_tx.subscribe();

        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();

        assert_eq!(ride.status, RideStatus::Accepted);
        assert_eq!(ride.commission.total(), ride.total_amount);
        assert_eq!(ride.commission.admin_profit, 18);
        assert_ne!(ride.pickup_otp, "");
        assert_eq!(state.riders.get(&rider_id).unwrap().current_ride, Some(ride.id));
        assert_eq!(state.drivers.get(&driver_id).unwrap().current_ride, Some(ride.id));
        assert!(!state.drivers.get(&driver_id).unwrap().is_on_ride);

        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert_eq!(first.event, EventName::RideAccepted);
        assert_eq!(first.recipient, rider_id);
        assert_eq!(second.recipient, driver_id);
    }

    #[tokio::test]
    async fn quoted_split_is_replaced_by_the_driver_rates() {
        let (state, rider_id, driver_id) = setup();
        let zero_rates = split(100, CommissionRates { admin_rate: 0.0, franchise_rate: 0.0 }).unwrap();

        let mut request = accept(rider_id, driver_id);
        request.commission = Some(zero_rates);
        let ride = accept_ride(&state, request).await.unwrap();
        assert_eq!(ride.commission.admin_rate, 18.0);
        assert_eq!(ride.commission.admin_profit, 18);
        assert_eq!(ride.commission.driver_profit, 82);

        let other_rider = state.insert_rider(Rider::new("Omar", "8000000002"));
        let other_driver = state.insert_driver(Driver::new("Bela", "9000000002", PICKUP));
        let low_rate = split(100, CommissionRates { admin_rate: 15.0, franchise_rate: 0.0 }).unwrap();
        let mut request = accept(other_rider, other_driver);
        request.commission = Some(low_rate);
        let ride = accept_ride(&state, request).await.unwrap();
        assert_eq!(ride.commission.admin_profit, 18);
        assert_eq!(ride.commission.driver_profit, 82);
    }

    #[tokio::test]
    async fn quote_matching_the_driver_rates_is_frozen_as_is() {
        let (state, rider_id, driver_id) = setup();
        let quoted = split(100, CommissionRates::platform_default()).unwrap();

        let mut request = accept(rider_id, driver_id);
        request.commission = Some(quoted);
        let ride = accept_ride(&state, request).await.unwrap();

        assert_eq!(ride.commission, quoted);
    }

    #[tokio::test]
    async fn franchise_driver_ride_carries_franchise_split() {
        let (state, rider_id, _) = setup();
        let franchise_id = state.insert_franchise(Franchise::new("Central"));
        let driver_id =
            state.insert_driver(Driver::new("Dev", "9000000009", PICKUP).with_franchise(franchise_id));

        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();

        assert_eq!(ride.franchise_id, Some(franchise_id));
        assert_eq!(
            (ride.commission.admin_profit, ride.commission.franchise_profit, ride.commission.driver_profit),
            (18, 10, 72)
        );
    }

    #[tokio::test]
    async fn concurrent_accepts_book_the_driver_once() {
        let (state, rider_a, driver_id) = setup();
        let state = Arc::new(state);
        let rider_b = state.insert_rider(Rider::new("Omar", "8000000002"));

        let first = {
            let state = state.clone();
            tokio::spawn(async move { accept_ride(&state, accept(rider_a, driver_id)).await })
        };
        let second = {
            let state = state.clone();
            tokio::spawn(async move { accept_ride(&state, accept(rider_b, driver_id)).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict(_))))
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(state.rides.len(), 1);
    }

    #[tokio::test]
    async fn engaged_rider_cannot_book_twice() {
        let (state, rider_id, driver_id) = setup();
        let other_driver = state.insert_driver(Driver::new("Bela", "9000000002", PICKUP));

        accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();
        let result = accept_ride(&state, accept(rider_id, other_driver)).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn wrong_pickup_otp_changes_nothing() {
        let (state, rider_id, driver_id) = setup();
        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();

        let result = verify_pickup_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: wrong(&ride.pickup_otp),
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(state.rides.get(&ride.id).unwrap().status, RideStatus::Accepted);
        assert!(!state.riders.get(&rider_id).unwrap().is_on_ride);
        assert!(!state.drivers.get(&driver_id).unwrap().is_on_ride);
    }

    #[tokio::test]
    async fn correct_pickup_otp_starts_the_ride_exactly_once() {
        let (state, rider_id, driver_id) = setup();
        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();
        let verify = VerifyOtp {
            ride_id: ride.id,
            otp: ride.pickup_otp.clone(),
        };

        let started = verify_pickup_otp(&state, verify.clone()).await.unwrap();
        assert_eq!(started.status, RideStatus::Started);
        assert!(started.started_at.is_some());
        assert!(state.riders.get(&rider_id).unwrap().is_on_ride);
        assert!(state.drivers.get(&driver_id).unwrap().is_on_ride);

        let again = verify_pickup_otp(&state, verify).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
        assert_eq!(state.rides.get(&ride.id).unwrap().started_at, started.started_at);
    }

    #[tokio::test]
    async fn drop_otp_requires_pickup_and_releases_both_parties() {
        let (state, rider_id, driver_id) = setup();
        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();

        let early = verify_drop_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: ride.drop_otp.clone(),
            },
        )
        .await;
        assert!(matches!(early, Err(AppError::Conflict(_))));

        verify_pickup_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: ride.pickup_otp.clone(),
            },
        )
        .await
        .unwrap();

        let bad = verify_drop_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: wrong(&ride.drop_otp),
            },
        )
        .await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
        assert_eq!(state.rides.get(&ride.id).unwrap().status, RideStatus::Started);

        let ended = verify_drop_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: ride.drop_otp.clone(),
            },
        )
        .await
        .unwrap();

        assert_eq!(ended.status, RideStatus::Ended);
        let rider = state.riders.get(&rider_id).unwrap();
        let driver = state.drivers.get(&driver_id).unwrap();
        assert!(!rider.is_engaged());
        assert!(!driver.is_engaged());
        assert!(active_rides(&state).is_empty());
    }

    #[tokio::test]
    async fn rider_cancels_before_pickup_and_driver_is_told() {
        let (state, rider_id, driver_id) = setup();
        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();
        let mut events = state.events_tx.subscribe();

        let stranger = cancel_ride(
            &state,
            CancelRide {
                ride_id: ride.id,
                rider_id: Uuid::new_v4(),
            },
        )
        .await;
        assert!(matches!(stranger, Err(AppError::Forbidden(_))));

        cancel_ride(&state, CancelRide { ride_id: ride.id, rider_id }).await.unwrap();

        assert!(state.rides.get(&ride.id).is_none());
        assert!(!state.riders.get(&rider_id).unwrap().is_engaged());
        assert!(!state.drivers.get(&driver_id).unwrap().is_engaged());
        let event = events.try_recv().unwrap();
        assert_eq!(event.event, EventName::CancelRide);
        assert_eq!(event.recipient, driver_id);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn cancel_after_pickup_is_refused() {
        let (state, rider_id, driver_id) = setup();
        let ride = accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();
        verify_pickup_otp(
            &state,
            VerifyOtp {
                ride_id: ride.id,
                otp: ride.pickup_otp.clone(),
            },
        )
        .await
        .unwrap();

        let result = cancel_ride(&state, CancelRide { ride_id: ride.id, rider_id }).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(state.rides.get(&ride.id).unwrap().status, RideStatus::Started);
    }

    #[tokio::test]
    async fn reject_only_notifies_the_rider() {
        let (state, rider_id, driver_id) = setup();
        let mut events = state.events_tx.subscribe();

        reject_ride(&state, RejectRide { driver_id, rider_id }).await.unwrap();

        assert!(state.rides.is_empty());
        let event = events.try_recv().unwrap();
        assert_eq!(event.event, EventName::RideRejected);
        assert_eq!(event.recipient, rider_id);
    }

    async fn start(state: &AppState, rider_id: Uuid, driver_id: Uuid, price: i64) -> Uuid {
        let mut request = accept(rider_id, driver_id);
        request.total_price = price;
        let ride = accept_ride(state, request).await.unwrap();
        verify_pickup_otp(state, VerifyOtp { ride_id: ride.id, otp: ride.pickup_otp.clone() })
            .await
            .unwrap();
        ride.id
    }

    async fn finish(state: &AppState, ride_id: Uuid) {
        let otp = state.rides.get(&ride_id).unwrap().drop_otp.clone();
        verify_drop_otp(state, VerifyOtp { ride_id, otp }).await.unwrap();
    }

    async fn pay(state: &AppState, ride_id: Uuid) {
        post_payment(state, SetPaymentMode { ride_id, payment_mode: PaymentMode::Cash })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn history_lists_paid_rides_with_contacts() {
        let (state, rider_id, driver_id) = setup();
        let other_rider = state.insert_rider(Rider::new("Omar", "8000000002"));

        let first = start(&state, rider_id, driver_id, 100).await;
        finish(&state, first).await;
        pay(&state, first).await;
        let second = start(&state, other_rider, driver_id, 250).await;
        finish(&state, second).await;
        pay(&state, second).await;
        let unpaid = start(&state, rider_id, driver_id, 80).await;
        finish(&state, unpaid).await;

        let all = ride_history(&state, &RideHistoryFilter::default());
        assert_eq!(all.total, 2);
        assert_eq!(all.rides[0].ride.id, second);
        assert_eq!(all.rides[1].ride.id, first);
        let driver = all.rides[0].driver.as_ref().unwrap();
        assert_eq!((driver.name.as_str(), driver.phone.as_str()), ("Arjun", "9000000001"));
        assert_eq!(all.rides[0].rider.as_ref().unwrap().name, "Omar");

        let nisha = ride_history(
            &state,
            &RideHistoryFilter { rider_id: Some(rider_id), driver_id: None },
        );
        assert_eq!(nisha.total, 1);
        assert_eq!(nisha.rides[0].ride.id, first);

        let stranger = ride_history(
            &state,
            &RideHistoryFilter { rider_id: None, driver_id: Some(Uuid::new_v4()) },
        );
        assert_eq!(stranger.total, 0);
    }

    #[tokio::test]
    async fn stats_count_rides_earnings_and_drivers_on_ride() {
        let (state, rider_id, driver_id) = setup();
        let other_rider = state.insert_rider(Rider::new("Omar", "8000000002"));
        let other_driver = state.insert_driver(Driver::new("Bela", "9000000002", DROP));

        let paid = start(&state, rider_id, driver_id, 100).await;
        finish(&state, paid).await;
        pay(&state, paid).await;
        let ended = start(&state, rider_id, driver_id, 60).await;
        finish(&state, ended).await;
        let riding = start(&state, rider_id, driver_id, 300).await;
        accept_ride(&state, accept(other_rider, other_driver)).await.unwrap();

        let stats = ride_stats(&state);

        assert_eq!(stats.total_rides, 4);
        assert_eq!(stats.ended_rides, 2);
        assert_eq!(stats.earnings_of_ended_rides, 160);
        assert_eq!(stats.drivers_on_ride.len(), 1);
        let on_ride = &stats.drivers_on_ride[0];
        assert_eq!((on_ride.driver_id, on_ride.ride_id), (driver_id, riding));
        assert_eq!(on_ride.name, "Arjun");
        assert_eq!(on_ride.location, PICKUP);
    }

    #[tokio::test]
    async fn engaged_driver_cannot_go_offline() {
        let (state, rider_id, driver_id) = setup();
        accept_ride(&state, accept(rider_id, driver_id)).await.unwrap();

        let result = set_driver_active(&state, driver_id, false).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(state.drivers.get(&driver_id).unwrap().is_active);
        assert!(set_driver_active(&state, Uuid::new_v4(), true).await.is_err());
    }

    #[tokio::test]
    async fn going_offline_races_accept_without_booking_an_inactive_driver() {
        for _ in 0..50 {
            let (state, rider_id, driver_id) = setup();
            let state = Arc::new(state);

            let booking = {
                let state = state.clone();
                tokio::spawn(async move { accept_ride(&state, accept(rider_id, driver_id)).await })
            };
            let offline = {
                let state = state.clone();
                tokio::spawn(async move { set_driver_active(&state, driver_id, false).await })
            };

            let booked = booking.await.unwrap().is_ok();
            let went_offline = offline.await.unwrap().is_ok();
            assert!(booked != went_offline);
            let driver = state.driver(driver_id).unwrap();
            assert_eq!(driver.is_active, !booked);
            assert_eq!(driver.current_ride.is_some(), booked);
        }
    }
}
