use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ledger::{combined_totals, driver_accounts};
use crate::error::AppError;
use crate::models::due_request::{
    Approver, DueRequest, PaymentEvidence, RequestStatus, RequestType, Requester,
};
use crate::models::franchise::iso_week_key;
use crate::models::ledger::{LedgerAccount, LedgerTotals};
use crate::models::ride::{PaymentMode, RideStatus};
use crate::models::weekly_bill::{BillStatus, WeeklyBill};
use crate::state::AppState;

const DEFAULT_REJECTION_NOTE: &str = "No rejection reason provided";

#[derive(Debug, Clone, Deserialize)]
pub struct DriverDueRequest {
    pub driver_id: Uuid,
    pub amount: i64,
    pub payment_method: Option<PaymentMode>,
    pub photo: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FranchiseBillPayment {
    pub franchise_id: Uuid,
    pub weekly_bill_id: Uuid,
    pub payment_method: PaymentMode,
    pub photo: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateWeeklyBill {
    pub franchise_id: Uuid,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDueRequest {
    /// Who is resolving. The embedding layer must set this from the
    /// authenticated principal; a client-supplied value is not trusted.
    pub approver: Approver,
    pub decision: Decision,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DueRequestFilter {
    pub status: Option<RequestStatus>,
    pub request_type: Option<RequestType>,
    pub franchise_id: Option<Uuid>,
}

/// Ledger totals with each party's share as a percentage of the gross.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub totals: LedgerTotals,
    pub driver_percent: f64,
    pub admin_percent: f64,
    pub franchise_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DueRequestDetails {
    pub request: DueRequest,
    pub ledger_summary: Option<LedgerSummary>,
    pub weekly_bill: Option<WeeklyBill>,
}

fn has_pending_request(state: &AppState, requester: Requester) -> bool {
    state
        .due_requests
        .iter()
        .any(|entry| entry.requester == requester && entry.is_pending())
}

fn new_request(
    requester: Requester,
    admin_id: Uuid,
    franchise_id: Option<Uuid>,
    request_type: RequestType,
    amount: i64,
    payment: PaymentEvidence,
    notes: Option<String>,
) -> DueRequest {
    DueRequest {
        id: Uuid::new_v4(),
        requester,
        admin_id,
        franchise_id,
        request_type,
        amount,
        status: RequestStatus::Pending,
        approved_by_franchise: false,
        franchise_approved_at: None,
        approved_by_admin: false,
        admin_approved_at: None,
        resolved_by: None,
        payment,
        weekly_bill_id: None,
        paid_amount: 0,
        notes,
        created_at: Utc::now(),
        resolved_at: None,
    }
}

pub async fn create_driver_due_request(
    state: &AppState,
    request: DriverDueRequest,
) -> Result<DueRequest, AppError> {
    if request.amount <= 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }

    let admin_id = state.admin_id().await;
    let _tx = state.transaction().await;

    let driver = state.driver(request.driver_id)?;
    if request.amount > driver.wallets.due {
        warn!(
            driver_id = %driver.id,
            requested = request.amount,
            due = driver.wallets.due,
            "due request exceeds due wallet"
        );
        return Err(AppError::Validation(format!(
            "requested amount {} exceeds due wallet balance {}",
            request.amount, driver.wallets.due
        )));
    }
    let requester = Requester::Driver(driver.id);
    if has_pending_request(state, requester) {
        return Err(AppError::Conflict(
            "a pending due request already exists for this driver".to_string(),
        ));
    }

    let franchise_id = state.operational_franchise(&driver).map(|franchise| franchise.id);
    let due_request = new_request(
        requester,
        admin_id,
        franchise_id,
        RequestType::DriverDue,
        request.amount,
        PaymentEvidence {
            method: request.payment_method.unwrap_or(PaymentMode::Cash),
            photo: request.photo,
        },
        request.notes,
    );
    state.due_requests.insert(due_request.id, due_request.clone());

    info!(
        request_id = %due_request.id,
        driver_id = %driver.id,
        amount = due_request.amount,
        "driver due request created"
    );
    Ok(due_request)
}

/// Bills the admin commission earned by a franchise's paid rides that ended
/// inside the window. Defaults to the seven days before today (UTC midnight).
pub async fn generate_weekly_bill(
    state: &AppState,
    request: GenerateWeeklyBill,
) -> Result<WeeklyBill, AppError> {
    let today = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| AppError::Internal("failed to compute billing window".to_string()))?;
    let window_end = request.window_end.unwrap_or(today);
    let window_start = request
        .window_start
        .unwrap_or(window_end - Duration::days(7));
    if window_start >= window_end {
        return Err(AppError::Validation(
            "window_start must be before window_end".to_string(),
        ));
    }

    let _tx = state.transaction().await;

    let franchise = state.franchise(request.franchise_id)?;
    let overlapping = state.weekly_bills.iter().any(|bill| {
        bill.franchise_id == franchise.id
            && bill.window_start < window_end
            && window_start < bill.window_end
    });
    if overlapping {
        return Err(AppError::Conflict(
            "a weekly bill already covers this window".to_string(),
        ));
    }

    let mut admin_commission = 0;
    let mut franchise_commission = 0;
    let mut total_generated = 0;
    let mut ride_count = 0u64;
    for ride in state.rides.iter() {
        let in_window = ride
            .ended_at
            .is_some_and(|ended| ended >= window_start && ended < window_end);
        if ride.franchise_id == Some(franchise.id) && ride.status == RideStatus::Paid && in_window {
            admin_commission += ride.commission.admin_profit;
            franchise_commission += ride.commission.franchise_profit;
            total_generated += ride.total_amount;
            ride_count += 1;
        }
    }
    if admin_commission <= 0 {
        return Err(AppError::Validation(
            "nothing to bill for this window".to_string(),
        ));
    }

    let now = Utc::now();
    let bill = WeeklyBill {
        id: Uuid::new_v4(),
        franchise_id: franchise.id,
        window_start,
        window_end,
        admin_commission,
        franchise_commission,
        total_generated,
        ride_count,
        status: BillStatus::Generated,
        due_request_id: None,
        generated_at: now,
        paid_at: None,
    };
    state.weekly_bills.insert(bill.id, bill.clone());
    if let Some(mut franchise) = state.franchises.get_mut(&bill.franchise_id) {
        franchise.last_weekly_bill_at = Some(now);
        franchise.updated_at = now;
    }

    info!(
        bill_id = %bill.id,
        franchise_id = %bill.franchise_id,
        admin_commission,
        ride_count,
        "weekly bill generated"
    );
    Ok(bill)
}

pub async fn create_franchise_due_request(
    state: &AppState,
    request: FranchiseBillPayment,
) -> Result<DueRequest, AppError> {
    let photo = request
        .photo
        .filter(|photo| !photo.trim().is_empty())
        .ok_or_else(|| AppError::Validation("payment photo is required".to_string()))?;

    let admin_id = state.admin_id().await;
    let _tx = state.transaction().await;

    let franchise = state.franchise(request.franchise_id)?;
    let bill = state.weekly_bill(request.weekly_bill_id)?;
    if bill.franchise_id != franchise.id {
        return Err(AppError::Forbidden(
            "weekly bill belongs to another franchise".to_string(),
        ));
    }
    if bill.status != BillStatus::Generated || bill.due_request_id.is_some() {
        return Err(AppError::Conflict(
            "weekly bill is already paid or awaiting approval".to_string(),
        ));
    }
    let requester = Requester::Franchise(franchise.id);
    if has_pending_request(state, requester) {
        return Err(AppError::Conflict(
            "a pending due request already exists for this franchise".to_string(),
        ));
    }

    let mut due_request = new_request(
        requester,
        admin_id,
        Some(franchise.id),
        RequestType::FranchiseWeeklyBill,
        bill.admin_commission,
        PaymentEvidence {
            method: request.payment_method,
            photo: Some(photo),
        },
        request.notes,
    );
    due_request.weekly_bill_id = Some(bill.id);

    if let Some(mut bill) = state.weekly_bills.get_mut(&bill.id) {
        bill.status = BillStatus::PendingPayment;
        bill.due_request_id = Some(due_request.id);
    }
    state.due_requests.insert(due_request.id, due_request.clone());

    info!(
        request_id = %due_request.id,
        franchise_id = %franchise.id,
        bill_id = %bill.id,
        amount = due_request.amount,
        "franchise bill payment submitted"
    );
    Ok(due_request)
}

/// Admin may resolve anything. A franchise may resolve dues of its own
/// drivers, never a weekly bill.
fn authorize(request: &DueRequest, approver: Approver, state: &AppState) -> Result<(), AppError> {
    match (request.request_type, approver) {
        (_, Approver::Admin) => Ok(()),
        (RequestType::DriverDue, Approver::Franchise(franchise_id)) => {
            let operational = state
                .franchises
                .get(&franchise_id)
                .is_some_and(|franchise| franchise.is_operational());
            if request.franchise_id == Some(franchise_id) && operational {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "franchise cannot resolve dues of drivers outside it".to_string(),
                ))
            }
        }
        (RequestType::FranchiseWeeklyBill, Approver::Franchise(_)) => Err(AppError::Forbidden(
            "only admin can resolve weekly bill payments".to_string(),
        )),
    }
}

pub async fn resolve_due_request(
    state: &AppState,
    request_id: Uuid,
    resolution: ResolveDueRequest,
) -> Result<DueRequest, AppError> {
    let _tx = state.transaction().await;

    let request = state.due_request(request_id)?;
    authorize(&request, resolution.approver, state)?;
    if !request.is_pending() {
        return Err(AppError::Conflict(format!(
            "due request {request_id} is already resolved"
        )));
    }

    let resolved = match (resolution.decision, request.request_type) {
        (Decision::Rejected, _) => reject(state, request, resolution),
        (Decision::Approved, RequestType::DriverDue) => {
            settle_driver_due(state, request, resolution).await?
        }
        (Decision::Approved, RequestType::FranchiseWeeklyBill) => {
            settle_weekly_bill(state, request, resolution).await?
        }
    };

    let outcome = match resolved.status {
        RequestStatus::Approved => "approved",
        _ => "rejected",
    };
    state
        .metrics
        .settlements_total
        .with_label_values(&[resolved.request_type.as_str(), outcome])
        .inc();
    state.due_requests.insert(resolved.id, resolved.clone());
    Ok(resolved)
}

fn mark_approved(request: &mut DueRequest, approver: Approver, at: DateTime<Utc>) {
    match approver {
        Approver::Admin => {
            request.approved_by_admin = true;
            request.admin_approved_at = Some(at);
        }
        Approver::Franchise(_) => {
            request.approved_by_franchise = true;
            request.franchise_approved_at = Some(at);
        }
    }
    request.status = RequestStatus::Approved;
    request.resolved_by = Some(approver);
    request.paid_amount = request.amount;
    request.resolved_at = Some(at);
}

fn reject(state: &AppState, mut request: DueRequest, resolution: ResolveDueRequest) -> DueRequest {
    let now = Utc::now();
    request.status = RequestStatus::Rejected;
    request.resolved_by = Some(resolution.approver);
    request.notes = Some(
        resolution
            .notes
            .unwrap_or_else(|| DEFAULT_REJECTION_NOTE.to_string()),
    );
    request.resolved_at = Some(now);

    if let Some(bill_id) = request.weekly_bill_id {
        if let Some(mut bill) = state.weekly_bills.get_mut(&bill_id) {
            if bill.due_request_id == Some(request.id) {
                bill.status = BillStatus::Generated;
                bill.due_request_id = None;
            }
        }
    }

    info!(
        request_id = %request.id,
        request_type = request.request_type.as_str(),
        "due request rejected"
    );
    request
}

/// Clears every Khata the driver holds and realises each party's share. An
/// account is credited to the franchise it was posted under, even if the
/// driver's affiliation changed since.
async fn settle_driver_due(
    state: &AppState,
    mut request: DueRequest,
    resolution: ResolveDueRequest,
) -> Result<DueRequest, AppError> {
    let Requester::Driver(driver_id) = request.requester else {
        return Err(AppError::Integrity(format!(
            "driver due request {} has a non-driver requester",
            request.id
        )));
    };
    state.driver(driver_id)?;
    let accounts = driver_accounts(state, driver_id);
    if accounts.is_empty() {
        return Err(AppError::NotFound(format!("no ledger for driver {driver_id}")));
    }
    for account in &accounts {
        if !account.is_balanced() {
            return Err(AppError::Integrity(format!(
                "ledger {} balances do not match its entries",
                account.id
            )));
        }
        if let Some(franchise_id) = account.franchise_id {
            state.franchise(franchise_id)?;
        }
    }

    let now = Utc::now();
    let week_key = iso_week_key(now);
    let mut driver_profit = 0;
    let mut direct_admin_profit = 0;

    for account in &accounts {
        if let Some(mut ledger) = state.ledgers.get_mut(&account.key()) {
            ledger.clear(now);
        }
        driver_profit += account.driver_due;

        match account.franchise_id {
            None => direct_admin_profit += account.admin_due,
            Some(franchise_id) => {
                if let Some(mut franchise) = state.franchises.get_mut(&franchise_id) {
                    franchise.due_wallet += account.franchise_due;
                    franchise.settled_earnings += account.franchise_due;
                    franchise.accumulated_admin_profit += account.admin_due;
                    let week = franchise
                        .weekly_accumulations
                        .entry(week_key.clone())
                        .or_default();
                    week.admin_profit += account.admin_due;
                    week.franchise_profit += account.franchise_due;
                    week.total_rides += account.entries.len() as u64;
                    franchise.updated_at = now;
                }
            }
        }
    }

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.wallets.due = (driver.wallets.due - request.amount).max(0);
        driver.total_earning += driver_profit;
        driver.updated_at = now;
    }

    {
        let mut admin = state.admin.write().await;
        admin.due_wallet = (admin.due_wallet - request.amount).max(0);
        admin.total_earning += direct_admin_profit;
    }

    mark_approved(&mut request, resolution.approver, now);
    if resolution.notes.is_some() {
        request.notes = resolution.notes;
    }

    info!(
        request_id = %request.id,
        %driver_id,
        amount = request.amount,
        accounts = accounts.len(),
        driver_profit,
        direct_admin_profit,
        "driver dues settled"
    );
    Ok(request)
}

async fn settle_weekly_bill(
    state: &AppState,
    mut request: DueRequest,
    resolution: ResolveDueRequest,
) -> Result<DueRequest, AppError> {
    let Requester::Franchise(franchise_id) = request.requester else {
        return Err(AppError::Integrity(format!(
            "weekly bill request {} has a non-franchise requester",
            request.id
        )));
    };
    let bill_id = request.weekly_bill_id.ok_or_else(|| {
        AppError::Integrity(format!("weekly bill request {} has no bill", request.id))
    })?;
    state.franchise(franchise_id)?;
    let bill = state.weekly_bill(bill_id)?;
    if bill.status == BillStatus::Paid {
        return Err(AppError::Conflict(format!("weekly bill {bill_id} is already paid")));
    }

    let now = Utc::now();
    if let Some(mut franchise) = state.franchises.get_mut(&franchise_id) {
        franchise.due_wallet = (franchise.due_wallet - bill.admin_commission).max(0);
        franchise.accumulated_admin_profit =
            (franchise.accumulated_admin_profit - bill.admin_commission).max(0);
        franchise.updated_at = now;
    }
    if let Some(mut bill) = state.weekly_bills.get_mut(&bill_id) {
        bill.status = BillStatus::Paid;
        bill.due_request_id = Some(request.id);
        bill.paid_at = Some(now);
    }
    state.admin.write().await.total_earning += bill.admin_commission;

    mark_approved(&mut request, resolution.approver, now);
    if resolution.notes.is_some() {
        request.notes = resolution.notes;
    }

    info!(
        request_id = %request.id,
        %franchise_id,
        %bill_id,
        amount = bill.admin_commission,
        "weekly bill paid"
    );
    Ok(request)
}

pub fn list_due_requests(state: &AppState, filter: &DueRequestFilter) -> Vec<DueRequest> {
    let mut requests: Vec<DueRequest> = state
        .due_requests
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .filter(|entry| {
            filter
                .request_type
                .is_none_or(|request_type| entry.request_type == request_type)
        })
        .filter(|entry| {
            filter
                .franchise_id
                .is_none_or(|franchise_id| entry.franchise_id == Some(franchise_id))
        })
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

pub fn summarize(accounts: &[LedgerAccount]) -> LedgerSummary {
    let totals = combined_totals(accounts);
    LedgerSummary {
        driver_percent: percent(totals.driver_profit, totals.total_amount),
        admin_percent: percent(totals.admin_profit, totals.total_amount),
        franchise_percent: percent(totals.franchise_profit, totals.total_amount),
        totals,
    }
}

pub fn due_request_details(state: &AppState, id: Uuid) -> Result<DueRequestDetails, AppError> {
    let request = state.due_request(id)?;
    let ledger_summary = match request.requester {
        Requester::Driver(driver_id) => {
            let accounts = driver_accounts(state, driver_id);
            (!accounts.is_empty()).then(|| summarize(&accounts))
        }
        Requester::Franchise(_) => None,
    };
    let weekly_bill = request
        .weekly_bill_id
        .and_then(|bill_id| state.weekly_bill(bill_id).ok());

    Ok(DueRequestDetails {
        request,
        ledger_summary,
        weekly_bill,
    })
}

pub fn list_weekly_bills(state: &AppState, franchise_id: Option<Uuid>) -> Vec<WeeklyBill> {
    let mut bills: Vec<WeeklyBill> = state
        .weekly_bills
        .iter()
        .filter(|bill| franchise_id.is_none_or(|id| bill.franchise_id == id))
        .map(|bill| bill.value().clone())
        .collect();
    bills.sort_by(|a, b| b.window_start.cmp(&a.window_start));
    bills
}
