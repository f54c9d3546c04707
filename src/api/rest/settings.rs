use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::engine::commission::{
    set_active, settings_for, update_settings, CommissionSettingsUpdate,
};
use crate::engine::fare::{
    quote, reset_fare_settings, update_fare_settings, FareQuote, FareSettingsChanged,
    FareSettingsUpdate,
};
use crate::error::AppError;
use crate::models::settings::{CommissionChange, CommissionSetting, FareChange, FareSetting};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fare-settings", get(get_fare_settings).put(put_fare_settings))
        .route("/fare-settings/history", get(fare_history))
        .route("/fare-settings/reset", post(reset_fare))
        .route("/fare-settings/calculate", post(calculate_fare))
        .route("/commission-settings", get(list_commission_settings))
        .route(
            "/commission-settings/:franchise_id",
            get(get_commission_settings).put(put_commission_settings),
        )
        .route(
            "/commission-settings/:franchise_id/history",
            get(commission_history),
        )
        .route(
            "/commission-settings/:franchise_id/deactivate",
            put(deactivate_commission),
        )
        .route(
            "/commission-settings/:franchise_id/reactivate",
            put(reactivate_commission),
        )
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CalculateFareRequest {
    pub distance_km: f64,
    pub ride_start_time: Option<DateTime<FixedOffset>>,
}

#[derive(Default, Deserialize)]
pub struct StatusChangeRequest {
    pub reason: Option<String>,
}

async fn get_fare_settings(State(state): State<Arc<AppState>>) -> ApiResponse<FareSetting> {
    ApiResponse::ok(state.fare_snapshot().await, "Fare settings fetched")
}

async fn put_fare_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FareSettingsUpdate>,
) -> Result<ApiResponse<FareSettingsChanged>, AppError> {
    let changed = update_fare_settings(&state, payload).await?;
    let message = if changed.changes.is_empty() {
        "No changes detected"
    } else {
        "Fare settings updated successfully"
    };
    Ok(ApiResponse::ok(changed, message))
}

async fn fare_history(State(state): State<Arc<AppState>>) -> ApiResponse<Vec<FareChange>> {
    let mut history = state.fare_snapshot().await.history;
    history.reverse();
    ApiResponse::ok(history, "Fare settings history fetched")
}

async fn reset_fare(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetRequest>,
) -> Result<ApiResponse<FareSettingsChanged>, AppError> {
    let changed = reset_fare_settings(&state, payload.reason).await?;
    Ok(ApiResponse::ok(changed, "Fare settings reset to defaults"))
}

async fn calculate_fare(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CalculateFareRequest>,
) -> Result<ApiResponse<FareQuote>, AppError> {
    let settings = state.fare_snapshot().await;
    let fare = quote(&settings, payload.distance_km, payload.ride_start_time)?;
    Ok(ApiResponse::ok(fare, "Fare calculated"))
}

async fn list_commission_settings(
    State(state): State<Arc<AppState>>,
) -> ApiResponse<Vec<CommissionSetting>> {
    let mut settings: Vec<CommissionSetting> = state
        .commission_settings
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    settings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    ApiResponse::ok(settings, "Commission settings fetched")
}

async fn get_commission_settings(
    State(state): State<Arc<AppState>>,
    Path(franchise_id): Path<Uuid>,
) -> Result<ApiResponse<CommissionSetting>, AppError> {
    let settings = settings_for(&state, franchise_id).await?;
    Ok(ApiResponse::ok(settings, "Commission settings fetched"))
}

async fn put_commission_settings(
    State(state): State<Arc<AppState>>,
    Path(franchise_id): Path<Uuid>,
    Json(payload): Json<CommissionSettingsUpdate>,
) -> Result<ApiResponse<CommissionSetting>, AppError> {
    let settings = update_settings(&state, franchise_id, payload).await?;
    Ok(ApiResponse::ok(settings, "Commission settings updated successfully"))
}

async fn commission_history(
    State(state): State<Arc<AppState>>,
    Path(franchise_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<CommissionChange>>, AppError> {
    let mut history = settings_for(&state, franchise_id).await?.history;
    history.reverse();
    Ok(ApiResponse::ok(history, "Commission settings history fetched"))
}

async fn deactivate_commission(
    State(state): State<Arc<AppState>>,
    Path(franchise_id): Path<Uuid>,
    payload: Option<Json<StatusChangeRequest>>,
) -> Result<ApiResponse<CommissionSetting>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let settings = set_active(&state, franchise_id, false, payload.reason).await?;
    Ok(ApiResponse::ok(settings, "Commission settings deactivated"))
}

async fn reactivate_commission(
    State(state): State<Arc<AppState>>,
    Path(franchise_id): Path<Uuid>,
    payload: Option<Json<StatusChangeRequest>>,
) -> Result<ApiResponse<CommissionSetting>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let settings = set_active(&state, franchise_id, true, payload.reason).await?;
    Ok(ApiResponse::ok(settings, "Commission settings reactivated"))
}
