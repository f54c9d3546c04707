pub mod admin;
pub mod driver;
pub mod due_request;
pub mod event;
pub mod franchise;
pub mod ledger;
pub mod ride;
pub mod rider;
pub mod settings;
pub mod weekly_bill;
