//! Balance Aggregation
//!
//! Turns the engine's bursty, push-based balance notifications into one
//! settled [`BalanceSnapshot`] per request.

pub mod aggregator;
pub mod error;
pub mod snapshot;

pub use aggregator::{BalanceAggregator, SettleReason};
pub use error::AggregateError;
pub use snapshot::BalanceSnapshot;
