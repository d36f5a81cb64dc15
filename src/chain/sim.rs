//! Simulated Chain Provider
//!
//! In-process provider for dev runs and tests: fixed fee data, deterministic
//! or scripted transaction hashes, configurable confirmation latency.

use async_trait::async_trait;
use dashmap::DashMap;
use num_bigint::BigUint;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

use super::{ChainProvider, FeeData, ProviderError, Receipt};
use crate::core_types::TxHash;
use crate::engine::TransactionPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    FeeData,
    SendTransaction,
    WaitForConfirmation,
}

pub struct SimulatedProvider {
    fee_data: Mutex<FeeData>,
    tx_hash: Mutex<Option<TxHash>>,
    confirm_delay: Mutex<Duration>,
    revert: AtomicBool,
    lose_send_response: AtomicBool,
    calls: DashMap<ProviderOp, usize>,
    failures: DashMap<ProviderOp, VecDeque<ProviderError>>,
    sent: Mutex<Vec<TransactionPayload>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            fee_data: Mutex::new(FeeData {
                gas_price: Some(BigUint::from(20_000_000_000u64)),
                max_fee_per_gas: Some(BigUint::from(40_000_000_000u64)),
                max_priority_fee_per_gas: Some(BigUint::from(1_000_000_000u64)),
            }),
            tx_hash: Mutex::new(None),
            confirm_delay: Mutex::new(Duration::ZERO),
            revert: AtomicBool::new(false),
            lose_send_response: AtomicBool::new(false),
            calls: DashMap::new(),
            failures: DashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fee_data(&self, fee: FeeData) {
        *self.fee_data.lock().unwrap_or_else(PoisonError::into_inner) = fee;
    }

    /// Hash returned by the next submissions (random when unset)
    pub fn set_tx_hash(&self, hash: impl Into<String>) {
        *self.tx_hash.lock().unwrap_or_else(PoisonError::into_inner) = Some(TxHash::new(hash));
    }

    pub fn set_confirm_delay(&self, delay: Duration) {
        *self.confirm_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Included-but-reverted receipts from now on
    pub fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    /// Next submission is accepted and recorded, but the caller sees
    /// [`ProviderError::ResponseLost`]
    pub fn lose_next_send_response(&self) {
        self.lose_send_response.store(true, Ordering::SeqCst);
    }

    pub fn push_failure(&self, op: ProviderOp, error: ProviderError) {
        self.failures.entry(op).or_default().push_back(error);
    }

    pub fn call_count(&self, op: ProviderOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Payloads accepted by `send_transaction`, in order
    pub fn sent(&self) -> Vec<TransactionPayload> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn begin(&self, op: ProviderOp) -> Result<(), ProviderError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(|mut q| q.pop_front()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fee_data(&self) -> Result<FeeData, ProviderError> {
        self.begin(ProviderOp::FeeData)?;
        Ok(self
            .fee_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn send_transaction(
        &self,
        payload: &TransactionPayload,
    ) -> Result<TxHash, ProviderError> {
        self.begin(ProviderOp::SendTransaction)?;

        let hash = self
            .tx_hash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| {
                TxHash::new(format!("0x{:x}", uuid::Uuid::new_v4().simple()))
            });
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());

        if self.lose_send_response.swap(false, Ordering::SeqCst) {
            info!(tx_hash = %hash, "Simulated submission, response dropped");
            return Err(ProviderError::ResponseLost(format!(
                "connection closed after sending {hash}"
            )));
        }

        info!(tx_hash = %hash, "Simulated submission");
        Ok(hash)
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ProviderError> {
        self.begin(ProviderOp::WaitForConfirmation)?;

        let delay = *self
            .confirm_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ProviderError::Timeout {
                tx_hash: tx_hash.clone(),
                waited: timeout,
            });
        }
        tokio::time::sleep(delay).await;

        Ok(Receipt {
            tx_hash: tx_hash.clone(),
            block_number: 1,
            gas_used: BigUint::from(21000u32),
            success: !self.revert.load(Ordering::SeqCst),
        })
    }
}
