//! Engine Event Fan-out
//!
//! Wraps the engine's single-callback-per-kind notification mechanism into
//! in-process subscriptions. See [`bus::EventBus`].

pub mod bus;

pub use bus::{EventBus, Subscription, SubscriptionId};
