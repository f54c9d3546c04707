pub mod commission;
pub mod fare;
pub mod ledger;
pub mod lifecycle;
pub mod locator;
pub mod settlement;
