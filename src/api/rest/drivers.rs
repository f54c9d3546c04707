use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::engine::ledger::{ledger_for_driver, DriverLedger};
use crate::engine::lifecycle::set_driver_active;
use crate::error::AppError;
use crate::geo::validate_point;
use crate::models::driver::{Driver, GeoPoint, Wallets};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/wallet", get(get_wallet))
        .route("/drivers/:id/ledger", get(get_ledger))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub driver_id: Uuid,
    pub wallets: Wallets,
    pub total_earning: i64,
    pub total_rides: u64,
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Driver>, AppError> {
    Ok(ApiResponse::ok(state.driver(id)?, "Driver fetched"))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<ApiResponse<Driver>, AppError> {
    validate_point("location", &payload.location)?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.location = payload.location;
    driver.updated_at = Utc::now();

    Ok(ApiResponse::ok(driver.clone(), "Location updated"))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<ApiResponse<Driver>, AppError> {
    let driver = set_driver_active(&state, id, payload.is_active).await?;
    Ok(ApiResponse::ok(driver, "Status updated"))
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<WalletResponse>, AppError> {
    let driver = state.driver(id)?;
    Ok(ApiResponse::ok(
        WalletResponse {
            driver_id: driver.id,
            wallets: driver.wallets,
            total_earning: driver.total_earning,
            total_rides: driver.total_rides,
        },
        "Wallet fetched",
    ))
}

async fn get_ledger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<DriverLedger>, AppError> {
    Ok(ApiResponse::ok(ledger_for_driver(&state, id)?, "Ledger fetched"))
}
