//! Shielded Ops - balance aggregation and staged private transfers
//!
//! Orchestration layer over a shielded (zero-knowledge) wallet engine and an
//! EVM chain provider, both external.
//!
//! # Modules
//!
//! - [`core_types`] - Wallet ids, chain references, amounts
//! - [`money`] - Token unit parsing/formatting
//! - [`engine`] - Shielded wallet engine contract (+ simulator)
//! - [`chain`] - Chain provider contract, gas details, JSON-RPC provider
//! - [`events`] - Single-callback engine events fanned out to subscribers
//! - [`balance`] - Quiescence-based balance snapshot aggregation
//! - [`workflow`] - Stage contract, executor, run records, retry
//! - [`transfer`] - Five-stage private transfer workflow
//! - [`reconcile`] - Best-effort POI reconciliation
//! - [`session`] - Engine session handle tying it all together
//! - [`report`] - Human-readable output for the CLI

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod money;

pub mod chain;
pub mod engine;
pub mod events;

pub mod balance;
pub mod reconcile;
pub mod transfer;
pub mod workflow;

pub mod report;
pub mod session;

// Convenient re-exports at crate root
pub use balance::{AggregateError, BalanceAggregator, BalanceSnapshot};
pub use chain::{ChainProvider, FeeData, GasDetails, GasType, ProviderError, Receipt};
pub use config::{AppConfig, ConfigError, Credentials, EncryptionKey};
pub use core_types::{Amount, Chain, TxHash, WalletId};
pub use engine::{BalanceBucket, EngineError, EngineEvent, EventKind, ShieldedEngine};
pub use events::{EventBus, Subscription};
pub use reconcile::{PoiRefreshState, ReconciliationManager, ReconciliationReport};
pub use session::Session;
pub use transfer::{TransferOutcome, TransferRequest, TransferWorkflow};
pub use workflow::{
    ErrorKind, RunPolicy, RunStatus, Stage, StageError, StageResult, WorkflowExecutor, WorkflowRun,
};
