//! Shielded Wallet Engine Contract
//!
//! The scanning/proving engine is an external collaborator. This module
//! defines the contract the rest of the crate requires from it: balance
//! refresh with push-style notifications, transfer gas estimation, proof
//! generation, transaction population and POI bookkeeping.
//!
//! # Callback Registration
//!
//! The engine keeps a single active callback per [`EventKind`]. Registering
//! again silently replaces the previous callback, so nothing in this crate
//! calls [`ShieldedEngine::set_event_callback`] directly except the
//! [`EventBus`](crate::events::EventBus).

pub mod artifacts;
pub mod error;
#[cfg(feature = "sim-engine")]
pub mod sim;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use error::EngineError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::chain::gas::GasDetails;
use crate::config::EncryptionKey;
use crate::core_types::{Amount, Chain, WalletId};

/// Balance category reflecting settlement state.
///
/// Names match the engine's bucket identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BalanceBucket {
    Spendable,
    ShieldBlocked,
    ShieldPending,
    ProofSubmitted,
    MissingInternalPOI,
    MissingExternalPOI,
    Spent,
}

impl BalanceBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceBucket::Spendable => "Spendable",
            BalanceBucket::ShieldBlocked => "ShieldBlocked",
            BalanceBucket::ShieldPending => "ShieldPending",
            BalanceBucket::ProofSubmitted => "ProofSubmitted",
            BalanceBucket::MissingInternalPOI => "MissingInternalPOI",
            BalanceBucket::MissingExternalPOI => "MissingExternalPOI",
            BalanceBucket::Spent => "Spent",
        }
    }
}

impl fmt::Display for BalanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token's amount inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_address: String,
    pub amount: Amount,
}

impl TokenBalance {
    pub fn new(token_address: impl Into<String>, amount: impl Into<Amount>) -> Self {
        Self {
            token_address: token_address.into(),
            amount: amount.into(),
        }
    }
}

/// Complete snapshot of one bucket for one wallet on one chain.
///
/// The engine emits whole buckets, not deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEvent {
    pub chain: Chain,
    pub wallet_id: WalletId,
    pub bucket: BalanceBucket,
    pub tokens: Vec<TokenBalance>,
}

/// Merkletree scan lifecycle as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Started,
    Updated,
    Complete,
    Incomplete,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Started => "STARTED",
            ScanStatus::Updated => "UPDATED",
            ScanStatus::Complete => "COMPLETE",
            ScanStatus::Incomplete => "INCOMPLETE",
        }
    }
}

/// Scan progress notification
#[derive(Debug, Clone, PartialEq)]
pub struct MerkletreeScanEvent {
    pub chain: Chain,
    pub status: ScanStatus,
    /// 0.0 ..= 1.0
    pub progress: f64,
}

/// Push notification kinds the engine supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BalanceUpdate,
    MerkletreeScan,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BalanceUpdate => "BALANCE_UPDATE",
            EventKind::MerkletreeScan => "MERKLETREE_SCAN",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push notification payload
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    BalanceUpdate(BalanceEvent),
    MerkletreeScan(MerkletreeScanEvent),
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::BalanceUpdate(_) => EventKind::BalanceUpdate,
            EngineEvent::MerkletreeScan(_) => EventKind::MerkletreeScan,
        }
    }
}

/// Upstream callback type. Invoked synchronously on the engine's thread.
pub type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Proof progress callback, `fraction` in 0.0 ..= 1.0
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// A single ERC-20 transfer leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecipient {
    pub token_address: String,
    pub amount: Amount,
    /// Shielded (`0zk...`) recipient address
    pub recipient_address: String,
}

/// Parameters shared by every engine call of one private transfer
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub network: String,
    pub wallet_id: WalletId,
    pub encryption_key: EncryptionKey,
    pub memo: Option<String>,
    pub recipients: Vec<TransferRecipient>,
    pub show_sender_address_to_recipient: bool,
    /// Self-signed submission (no broadcaster fee)
    pub send_with_public_wallet: bool,
}

/// Opaque handle to a proof cached inside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProof {
    pub id: String,
}

/// Unsigned transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPayload {
    pub chain_id: u64,
    pub to: String,
    /// `0x`-prefixed calldata
    pub data: String,
    pub value: Amount,
    pub gas: GasDetails,
    pub gas_limit: Option<Amount>,
}

/// Contract required from the shielded wallet engine
#[async_trait]
pub trait ShieldedEngine: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &'static str;

    /// Replace the single active callback for `kind` (`None` clears it).
    fn set_event_callback(&self, kind: EventKind, callback: Option<EventCallback>);

    /// Load (or create) the wallet derived from `mnemonic`, scanning from
    /// `creation_block`. Idempotent for the same inputs.
    async fn load_wallet(
        &self,
        encryption_key: &EncryptionKey,
        mnemonic: &str,
        creation_block: u64,
    ) -> Result<WalletId, EngineError>;

    /// Trigger a balance rescan. Results arrive as `BalanceUpdate` events,
    /// zero or more times, at unspecified intervals.
    async fn refresh_balances(&self, chain: Chain, wallet_ids: &[WalletId])
    -> Result<(), EngineError>;

    async fn estimate_transfer_gas(
        &self,
        params: &TransferParams,
        gas: &GasDetails,
    ) -> Result<Amount, EngineError>;

    async fn generate_transfer_proof(
        &self,
        params: &TransferParams,
        min_gas_price: &Amount,
        on_progress: ProgressCallback,
    ) -> Result<TransferProof, EngineError>;

    async fn populate_transfer(
        &self,
        params: &TransferParams,
        proof: &TransferProof,
        min_gas_price: &Amount,
        gas: &GasDetails,
    ) -> Result<TransactionPayload, EngineError>;

    async fn refresh_spent_pois(&self, network: &str, wallet_id: &WalletId)
    -> Result<(), EngineError>;

    async fn refresh_receive_pois(
        &self,
        network: &str,
        wallet_id: &WalletId,
    ) -> Result<(), EngineError>;

    async fn generate_pois(&self, network: &str, wallet_id: &WalletId) -> Result<(), EngineError>;

    /// Stop the engine and release its resources
    async fn shutdown(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_ordering_is_stable() {
        let mut buckets = vec![
            BalanceBucket::Spent,
            BalanceBucket::ShieldPending,
            BalanceBucket::Spendable,
        ];
        buckets.sort();
        assert_eq!(
            buckets,
            vec![
                BalanceBucket::Spendable,
                BalanceBucket::ShieldPending,
                BalanceBucket::Spent
            ]
        );
    }

    #[test]
    fn test_event_kind() {
        let event = EngineEvent::MerkletreeScan(MerkletreeScanEvent {
            chain: Chain::evm(1),
            status: ScanStatus::Updated,
            progress: 0.5,
        });
        assert_eq!(event.kind(), EventKind::MerkletreeScan);
        assert_eq!(EventKind::BalanceUpdate.to_string(), "BALANCE_UPDATE");
    }

    #[test]
    fn test_bucket_serde_uses_engine_names() {
        let json = serde_json::to_string(&BalanceBucket::MissingInternalPOI).unwrap();
        assert_eq!(json, r#""MissingInternalPOI""#);
    }
}
