//! Chain Provider Contract
//!
//! Fee-market queries, transaction submission and confirmation waits. The
//! provider is external; [`rpc::JsonRpcProvider`] talks to a node over
//! JSON-RPC and [`sim::SimulatedProvider`] backs dev runs and tests.

pub mod gas;
pub mod rpc;
#[cfg(feature = "sim-engine")]
pub mod sim;

pub use gas::{GasDetails, GasType};
pub use rpc::JsonRpcProvider;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::{Amount, TxHash};
use crate::engine::TransactionPayload;

/// Current fee-market data. Fields the node cannot provide are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<Amount>,
    pub max_fee_per_gas: Option<Amount>,
    pub max_priority_fee_per_gas: Option<Amount>,
}

/// Inclusion receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: Amount,
    /// `false` when the transaction was included but reverted
    pub success: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("No confirmation for {tx_hash} after {waited:?}")]
    Timeout { tx_hash: TxHash, waited: Duration },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// The request left this process but no response came back; the node
    /// may or may not have acted on it
    #[error("Request sent, response lost: {0}")]
    ResponseLost(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::RpcConnection(_) => "RPC_CONNECTION",
            ProviderError::Rejected(_) => "TX_REJECTED",
            ProviderError::Timeout { .. } => "CONFIRMATION_TIMEOUT",
            ProviderError::InvalidResponse(_) => "INVALID_RESPONSE",
            ProviderError::ResponseLost(_) => "RESPONSE_LOST",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RpcConnection(_))
    }
}

/// Contract required from the chain provider
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fee_data(&self) -> Result<FeeData, ProviderError>;

    /// Sign and submit. Returns the transaction hash.
    async fn send_transaction(&self, payload: &TransactionPayload)
    -> Result<TxHash, ProviderError>;

    /// Wait for inclusion, giving up with [`ProviderError::Timeout`] after `timeout`.
    async fn wait_for_confirmation(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::RpcConnection("reset".into()).is_transient());
        assert!(!ProviderError::Rejected("nonce too low".into()).is_transient());
        let timeout = ProviderError::Timeout {
            tx_hash: TxHash::new("0xabc"),
            waited: Duration::from_secs(5),
        };
        assert!(!timeout.is_transient());
        assert_eq!(timeout.code(), "CONFIRMATION_TIMEOUT");

        let lost = ProviderError::ResponseLost("timed out".into());
        assert!(!lost.is_transient());
        assert_eq!(lost.code(), "RESPONSE_LOST");
    }
}
