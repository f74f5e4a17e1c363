//! Scan ranges and bounded result collection.

pub mod collector;
pub mod range;

pub use collector::{unit_cost, LimitCollector, ScanRow};
pub use range::ScanRange;
