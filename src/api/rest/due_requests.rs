use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::engine::settlement::{
    create_driver_due_request, create_franchise_due_request, due_request_details,
    generate_weekly_bill, list_due_requests, list_weekly_bills, resolve_due_request,
    Decision, DriverDueRequest, DueRequestDetails, DueRequestFilter, FranchiseBillPayment,
    GenerateWeeklyBill, ResolveDueRequest,
};
use crate::error::AppError;
use crate::models::due_request::DueRequest;
use crate::models::weekly_bill::WeeklyBill;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/due-requests", post(create_driver_request).get(list_requests))
        .route("/due-requests/franchise", post(create_franchise_request))
        .route("/due-requests/weekly-bill", post(create_weekly_bill))
        .route("/due-requests/:id", get(get_request))
        .route("/due-requests/:id/approve", patch(resolve_request))
        .route("/weekly-bills", get(list_bills))
}

#[derive(Deserialize)]
pub struct WeeklyBillQuery {
    pub franchise_id: Option<Uuid>,
}

async fn create_driver_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DriverDueRequest>,
) -> Result<ApiResponse<DueRequest>, AppError> {
    let request = create_driver_due_request(&state, payload).await?;
    Ok(ApiResponse::created(request, "Due request created successfully"))
}

async fn create_franchise_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FranchiseBillPayment>,
) -> Result<ApiResponse<DueRequest>, AppError> {
    let request = create_franchise_due_request(&state, payload).await?;
    Ok(ApiResponse::created(request, "Weekly bill payment submitted"))
}

async fn create_weekly_bill(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateWeeklyBill>,
) -> Result<ApiResponse<WeeklyBill>, AppError> {
    let bill = generate_weekly_bill(&state, payload).await?;
    Ok(ApiResponse::created(bill, "Weekly bill generated"))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DueRequestFilter>,
) -> ApiResponse<Vec<DueRequest>> {
    ApiResponse::ok(list_due_requests(&state, &filter), "Due requests fetched")
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<DueRequestDetails>, AppError> {
    Ok(ApiResponse::ok(
        due_request_details(&state, id)?,
        "Due request details fetched",
    ))
}

async fn resolve_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveDueRequest>,
) -> Result<ApiResponse<DueRequest>, AppError> {
    let message = match payload.decision {
        Decision::Approved => "Due request approved",
        Decision::Rejected => "Due request rejected",
    };
    let request = resolve_due_request(&state, id, payload).await?;
    Ok(ApiResponse::ok(request, message))
}

async fn list_bills(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeeklyBillQuery>,
) -> ApiResponse<Vec<WeeklyBill>> {
    ApiResponse::ok(
        list_weekly_bills(&state, query.franchise_id),
        "Weekly bills fetched",
    )
}
