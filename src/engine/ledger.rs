use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::EventName;
use crate::models::ledger::{LedgerAccount, LedgerEntry, LedgerKey, LedgerTotals};
use crate::models::ride::{PaymentMode, Ride, RideStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SetPaymentMode {
    pub ride_id: Uuid,
    pub payment_mode: PaymentMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct Posting {
    pub ride: Ride,
    pub ledger: LedgerAccount,
}

/// Records the payment mode of an ended ride and posts it to the driver's
/// Khata. A ride posts at most once.
pub async fn post_payment(state: &AppState, request: SetPaymentMode) -> Result<Posting, AppError> {
    let admin_id = state.admin_id().await;
    let _tx = state.transaction().await;

    let ride = state.ride(request.ride_id)?;
    match ride.status {
        RideStatus::Ended => {}
        RideStatus::Paid => {
            return Err(AppError::Conflict("payment mode already set for this ride".to_string()));
        }
        RideStatus::Accepted | RideStatus::Started => {
            return Err(AppError::Conflict("ride has not ended yet".to_string()));
        }
    }
    state.driver(ride.driver_id)?;
    state.rider(ride.rider_id)?;
    if let Some(franchise_id) = ride.franchise_id {
        state.franchise(franchise_id)?;
    }
    if ride.commission.total() != ride.total_amount {
        return Err(AppError::Integrity(format!(
            "ride {} commission does not add up to its fare",
            ride.id
        )));
    }

    let now = Utc::now();
    let commission = ride.commission;
    let key = LedgerKey {
        driver_id: ride.driver_id,
        franchise_id: ride.franchise_id,
    };

    let ledger = {
        let mut account = state
            .ledgers
            .entry(key)
            .or_insert_with(|| LedgerAccount::open(key, admin_id));
        account.post(LedgerEntry {
            ride_id: ride.id,
            total_price: ride.total_amount,
            commission,
            payment_mode: request.payment_mode,
            posted_at: now,
        });
        account.value().clone()
    };

    if let Some(mut driver) = state.drivers.get_mut(&ride.driver_id) {
        match request.payment_mode {
            PaymentMode::Cash => driver.wallets.cash += ride.total_amount,
            PaymentMode::Online => driver.wallets.online += ride.total_amount,
        }
        driver.wallets.due += commission.upstream_due();
        driver.total_rides += 1;
        driver.total_distance_km += ride.total_km;
        driver.updated_at = now;
    }

    if let Some(franchise_id) = ride.franchise_id {
        if let Some(mut franchise) = state.franchises.get_mut(&franchise_id) {
            franchise.total_earnings += commission.franchise_profit;
            franchise.updated_at = now;
        }
    }

    state.admin.write().await.due_wallet += commission.admin_profit;

    let mut paid = ride;
    paid.status = RideStatus::Paid;
    paid.payment_mode = Some(request.payment_mode);
    paid.paid_at = Some(now);
    state.rides.insert(paid.id, paid.clone());

    state
        .metrics
        .ledger_postings_total
        .with_label_values(&[request.payment_mode.as_str()])
        .inc();
    state.metrics.ride_event("payment_mode_set");
    info!(
        ride_id = %paid.id,
        driver_id = %paid.driver_id,
        payment_mode = request.payment_mode.as_str(),
        admin_profit = commission.admin_profit,
        franchise_profit = commission.franchise_profit,
        driver_profit = commission.driver_profit,
        "ride posted to ledger"
    );

    let payload = json!({
        "ride_id": paid.id,
        "payment_mode": request.payment_mode,
        "total_amount": paid.total_amount,
        "message": "Payment mode updated successfully",
    });
    state.notify(paid.rider_id, EventName::PaymentModeUpdated, payload.clone());
    state.notify(paid.driver_id, EventName::PaymentModeUpdated, payload);

    Ok(Posting { ride: paid, ledger })
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub ledger: LedgerAccount,
    pub totals: LedgerTotals,
}

/// Every Khata a driver holds, one per franchise affiliation a ride was
/// posted under, with totals across all of them.
#[derive(Debug, Clone, Serialize)]
pub struct DriverLedger {
    pub accounts: Vec<LedgerView>,
    pub totals: LedgerTotals,
}

/// The driver's accounts as posted, oldest first. Affiliation changes after
/// posting do not move an account.
pub fn driver_accounts(state: &AppState, driver_id: Uuid) -> Vec<LedgerAccount> {
    let mut accounts: Vec<LedgerAccount> = state
        .ledgers
        .iter()
        .filter(|entry| entry.key().driver_id == driver_id)
        .map(|entry| entry.value().clone())
        .collect();
    accounts.sort_by_key(|account| account.created_at);
    accounts
}

pub fn combined_totals(accounts: &[LedgerAccount]) -> LedgerTotals {
    accounts
        .iter()
        .map(LedgerAccount::totals)
        .fold(LedgerTotals::default(), |mut acc, totals| {
            acc.total_amount += totals.total_amount;
            acc.driver_profit += totals.driver_profit;
            acc.admin_profit += totals.admin_profit;
            acc.franchise_profit += totals.franchise_profit;
            acc.ride_count += totals.ride_count;
            acc
        })
}

pub fn ledger_for_driver(state: &AppState, driver_id: Uuid) -> Result<DriverLedger, AppError> {
    state.driver(driver_id)?;
    let accounts = driver_accounts(state, driver_id);
    if accounts.is_empty() {
        return Err(AppError::NotFound(format!("no ledger for driver {driver_id}")));
    }

    Ok(DriverLedger {
        totals: combined_totals(&accounts),
        accounts: accounts
            .into_iter()
            .map(|ledger| LedgerView {
                totals: ledger.totals(),
                ledger,
            })
            .collect(),
    })
}
