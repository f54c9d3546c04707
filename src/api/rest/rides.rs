use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::engine::ledger::{post_payment, Posting, SetPaymentMode};
use crate::engine::lifecycle::{
    accept_ride, active_rides, cancel_ride, reject_ride, ride_history, ride_stats,
    verify_drop_otp, verify_pickup_otp, AcceptRide, CancelRide, RejectRide, RideHistory,
    RideHistoryFilter, RideStats, VerifyOtp,
};
use crate::engine::locator::{find_drivers, DriverSearch, FindDrivers};
use crate::error::AppError;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides/find-drivers", post(find_drivers_handler))
        .route("/rides/accept", post(accept))
        .route("/rides/reject", post(reject))
        .route("/rides/verify-pickup-otp", post(verify_pickup))
        .route("/rides/verify-drop-otp", post(verify_drop))
        .route("/rides/cancel", post(cancel))
        .route("/rides/payment-mode", post(payment_mode))
        .route("/rides/active", get(list_active))
        .route("/rides/history", get(history))
        .route("/rides/stats", get(stats))
        .route("/rides/:id", get(get_ride))
}

async fn find_drivers_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FindDrivers>,
) -> Result<ApiResponse<DriverSearch>, AppError> {
    let search = find_drivers(&state, payload).await?;
    let message = if search.is_available {
        "Available drivers fetched successfully"
    } else {
        "No drivers available nearby"
    };
    Ok(ApiResponse::ok(search, message))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AcceptRide>,
) -> Result<ApiResponse<Ride>, AppError> {
    let ride = accept_ride(&state, payload).await?;
    Ok(ApiResponse::created(ride, "Ride accepted successfully"))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RejectRide>,
) -> Result<ApiResponse<()>, AppError> {
    reject_ride(&state, payload).await?;
    Ok(ApiResponse::ok((), "Ride rejected"))
}

async fn verify_pickup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyOtp>,
) -> Result<ApiResponse<Ride>, AppError> {
    let ride = verify_pickup_otp(&state, payload).await?;
    Ok(ApiResponse::ok(ride, "Pickup OTP verified, ride started"))
}

async fn verify_drop(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyOtp>,
) -> Result<ApiResponse<Ride>, AppError> {
    let ride = verify_drop_otp(&state, payload).await?;
    Ok(ApiResponse::ok(ride, "Drop OTP verified, ride completed"))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CancelRide>,
) -> Result<ApiResponse<()>, AppError> {
    cancel_ride(&state, payload).await?;
    Ok(ApiResponse::ok((), "Ride cancelled"))
}

async fn payment_mode(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetPaymentMode>,
) -> Result<ApiResponse<Posting>, AppError> {
    let posting = post_payment(&state, payload).await?;
    Ok(ApiResponse::ok(posting, "Payment mode updated successfully"))
}

async fn list_active(State(state): State<Arc<AppState>>) -> ApiResponse<Vec<Ride>> {
    ApiResponse::ok(active_rides(&state), "Active rides fetched")
}

async fn history(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RideHistoryFilter>,
) -> ApiResponse<RideHistory> {
    ApiResponse::ok(ride_history(&state, &filter), "Ride history fetched")
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResponse<RideStats> {
    ApiResponse::ok(ride_stats(&state), "Ride stats fetched")
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Ride>, AppError> {
    Ok(ApiResponse::ok(state.ride(id)?, "Ride fetched"))
}
