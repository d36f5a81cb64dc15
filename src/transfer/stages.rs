//! Transfer stages
//!
//! Each stage reads what earlier stages merged into [`TransferContext`] and
//! returns exactly one [`TransferOutput`].

use async_trait::async_trait;
use num_bigint::BigUint;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::{TransferContext, TransferOutput};
use crate::chain::gas::buffered_gas_limit;
use crate::chain::{ChainProvider, GasDetails, ProviderError};
use crate::engine::{ProgressCallback, ShieldedEngine};
use crate::logging::ENGINE_TARGET;
use crate::workflow::{RetryPolicy, Stage, StageError, StageResult};

pub const ESTIMATE_GAS: &str = "EstimateGas";
pub const GENERATE_PROOF: &str = "GenerateProof";
pub const POPULATE_TRANSACTION: &str = "PopulateTransaction";
pub const BROADCAST: &str = "Broadcast";
pub const CONFIRM: &str = "Confirm";

/// Field an earlier stage should have produced
fn require<'a, T>(value: &'a Option<T>, what: &str) -> Result<&'a T, StageError> {
    value
        .as_ref()
        .ok_or_else(|| StageError::engine(format!("{what} missing from context")))
}

// ============================================================================
// EstimateGas
// ============================================================================

pub struct EstimateGas {
    engine: Arc<dyn ShieldedEngine>,
    provider: Arc<dyn ChainProvider>,
}

impl EstimateGas {
    pub fn new(engine: Arc<dyn ShieldedEngine>, provider: Arc<dyn ChainProvider>) -> Self {
        Self { engine, provider }
    }

    async fn run(&self, ctx: &TransferContext) -> Result<TransferOutput, StageError> {
        let fee = self.provider.fee_data().await?;
        // Zero estimate: the engine fills it in
        let placeholder = GasDetails::from_fee_data(ctx.gas_type, &fee, BigUint::ZERO);
        let estimate = self
            .engine
            .estimate_transfer_gas(&ctx.params, &placeholder)
            .await?;

        info!(
            wallet_id = %ctx.params.wallet_id,
            gas_type = %ctx.gas_type,
            gas_estimate = %estimate,
            "Transfer gas estimated"
        );

        Ok(TransferOutput::GasEstimate {
            estimate,
            min_gas_price: placeholder.min_gas_price().clone(),
        })
    }
}

#[async_trait]
impl Stage<TransferContext> for EstimateGas {
    fn name(&self) -> &'static str {
        ESTIMATE_GAS
    }

    async fn execute(
        &self,
        ctx: &TransferContext,
        _cancel: &CancellationToken,
    ) -> StageResult<TransferOutput> {
        self.run(ctx).await.into()
    }
}

// ============================================================================
// GenerateProof
// ============================================================================

pub struct GenerateProof {
    engine: Arc<dyn ShieldedEngine>,
}

impl GenerateProof {
    pub fn new(engine: Arc<dyn ShieldedEngine>) -> Self {
        Self { engine }
    }

    async fn run(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> Result<TransferOutput, StageError> {
        let min_gas_price = require(&ctx.min_gas_price, "min gas price")?;

        let wallet_id = ctx.params.wallet_id.clone();
        let on_progress: ProgressCallback = Arc::new(move |fraction: f64| {
            let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
            info!(target: ENGINE_TARGET, wallet_id = %wallet_id, percent, "Proof progress");
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(StageError::cancelled("proof generation cancelled"))
            }
            result = self.engine.generate_transfer_proof(&ctx.params, min_gas_price, on_progress) => {
                let proof = result?;
                debug!(proof_id = %proof.id, "Proof generated");
                Ok(TransferOutput::Proof(proof))
            }
        }
    }
}

#[async_trait]
impl Stage<TransferContext> for GenerateProof {
    fn name(&self) -> &'static str {
        GENERATE_PROOF
    }

    async fn execute(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> StageResult<TransferOutput> {
        self.run(ctx, cancel).await.into()
    }
}

// ============================================================================
// PopulateTransaction
// ============================================================================

pub struct PopulateTransaction {
    engine: Arc<dyn ShieldedEngine>,
    provider: Arc<dyn ChainProvider>,
    gas_limit_buffer_percent: u32,
}

impl PopulateTransaction {
    pub fn new(
        engine: Arc<dyn ShieldedEngine>,
        provider: Arc<dyn ChainProvider>,
        gas_limit_buffer_percent: u32,
    ) -> Self {
        Self {
            engine,
            provider,
            gas_limit_buffer_percent,
        }
    }

    async fn run(&self, ctx: &TransferContext) -> Result<TransferOutput, StageError> {
        let estimate = require(&ctx.gas_estimate, "gas estimate")?;
        let min_gas_price = require(&ctx.min_gas_price, "min gas price")?;
        let proof = require(&ctx.proof, "proof")?;

        // Fees may have moved while proving
        let fee = self.provider.fee_data().await?;
        let gas = GasDetails::from_fee_data(ctx.gas_type, &fee, estimate.clone());

        let mut payload = self
            .engine
            .populate_transfer(&ctx.params, proof, min_gas_price, &gas)
            .await?;
        let gas_limit = buffered_gas_limit(estimate, self.gas_limit_buffer_percent);

        info!(
            wallet_id = %ctx.params.wallet_id,
            to = %payload.to,
            gas_limit = %gas_limit,
            "Transaction populated"
        );
        payload.gas_limit = Some(gas_limit);

        Ok(TransferOutput::Payload(payload))
    }
}

#[async_trait]
impl Stage<TransferContext> for PopulateTransaction {
    fn name(&self) -> &'static str {
        POPULATE_TRANSACTION
    }

    async fn execute(
        &self,
        ctx: &TransferContext,
        _cancel: &CancellationToken,
    ) -> StageResult<TransferOutput> {
        self.run(ctx).await.into()
    }
}

// ============================================================================
// Broadcast
// ============================================================================

pub struct Broadcast {
    provider: Arc<dyn ChainProvider>,
    retry: RetryPolicy,
}

impl Broadcast {
    pub fn new(provider: Arc<dyn ChainProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    async fn run(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> Result<TransferOutput, StageError> {
        let payload = require(&ctx.payload, "transaction payload")?;

        let provider = &self.provider;
        let tx_hash = self
            .retry
            .run(BROADCAST, cancel, move || async move {
                provider
                    .send_transaction(payload)
                    .await
                    .map_err(submission_error)
            })
            .await?;

        info!(wallet_id = %ctx.params.wallet_id, tx_hash = %tx_hash, "Transaction sent");
        Ok(TransferOutput::Broadcast(tx_hash))
    }
}

/// Only a refused connection is safe to resend; anything else may have
/// reached the mempool
fn submission_error(e: ProviderError) -> StageError {
    match e {
        ProviderError::RpcConnection(_) | ProviderError::Rejected(_) => StageError::from(e),
        ProviderError::ResponseLost(_)
        | ProviderError::InvalidResponse(_)
        | ProviderError::Timeout { .. } => {
            StageError::unknown_outcome(format!("submission outcome unknown: {e}"))
        }
    }
}

#[async_trait]
impl Stage<TransferContext> for Broadcast {
    fn name(&self) -> &'static str {
        BROADCAST
    }

    async fn execute(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> StageResult<TransferOutput> {
        self.run(ctx, cancel).await.into()
    }
}

// ============================================================================
// Confirm
// ============================================================================

pub struct Confirm {
    provider: Arc<dyn ChainProvider>,
    timeout: Duration,
}

impl Confirm {
    pub fn new(provider: Arc<dyn ChainProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn run(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> Result<TransferOutput, StageError> {
        let tx_hash = require(&ctx.tx_hash, "transaction hash")?;

        // Already broadcast: stopping to wait leaves the outcome open
        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(StageError::unknown_outcome(format!(
                    "cancelled while awaiting confirmation of {tx_hash}"
                )));
            }
            result = self.provider.wait_for_confirmation(tx_hash, self.timeout) => {
                // Any provider error here leaves inclusion open, not failed
                result.map_err(|e| {
                    StageError::unknown_outcome(format!("confirmation of {tx_hash} unknown: {e}"))
                })?
            }
        };

        if !receipt.success {
            return Err(StageError::rejected(format!(
                "transaction {tx_hash} reverted in block {}",
                receipt.block_number
            )));
        }

        info!(
            tx_hash = %tx_hash,
            block_number = receipt.block_number,
            gas_used = %receipt.gas_used,
            "Transaction confirmed"
        );
        Ok(TransferOutput::Confirmed(receipt))
    }
}

#[async_trait]
impl Stage<TransferContext> for Confirm {
    fn name(&self) -> &'static str {
        CONFIRM
    }

    async fn execute(
        &self,
        ctx: &TransferContext,
        cancel: &CancellationToken,
    ) -> StageResult<TransferOutput> {
        self.run(ctx, cancel).await.into()
    }
}
