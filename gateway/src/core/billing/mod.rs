mod meter;
mod tracker;

pub use meter::{BillingError, BillingMeter, BillingOutcome, INSUFFICIENT_FUNDS_MESSAGE};
pub use tracker::BillingTracker;
