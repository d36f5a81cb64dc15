//! Private Transfer Workflow
//!
//! Five strictly ordered stages:
//!
//! ```text
//! EstimateGas → GenerateProof → PopulateTransaction → Broadcast → Confirm
//! ```
//!
//! The fee model is fixed when the run starts. A confirmation timeout is an
//! unknown outcome, never a failed transfer: the transaction may still land.

pub mod context;
pub mod stages;

pub use context::{TransferContext, TransferOutput, TransferRequest};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainProvider, Receipt};
use crate::config::{NetworkConfig, TransferConfig};
use crate::core_types::TxHash;
use crate::engine::ShieldedEngine;
use crate::workflow::{RetryPolicy, StageList, WorkflowExecutor, WorkflowRun};
use stages::{Broadcast, Confirm, EstimateGas, GenerateProof, PopulateTransaction};

pub const WORKFLOW_NAME: &str = "transfer";

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub run: WorkflowRun,
    /// Set once Broadcast succeeded, even if Confirm did not
    pub tx_hash: Option<TxHash>,
    pub receipt: Option<Receipt>,
}

impl TransferOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.run.status.is_success() && self.receipt.is_some()
    }
}

pub struct TransferWorkflow {
    network: NetworkConfig,
    stages: StageList<TransferContext>,
}

impl TransferWorkflow {
    pub fn new(
        engine: Arc<dyn ShieldedEngine>,
        provider: Arc<dyn ChainProvider>,
        network: NetworkConfig,
        config: &TransferConfig,
    ) -> Self {
        let stages: StageList<TransferContext> = vec![
            Arc::new(EstimateGas::new(engine.clone(), provider.clone())),
            Arc::new(GenerateProof::new(engine.clone())),
            Arc::new(PopulateTransaction::new(
                engine,
                provider.clone(),
                config.gas_limit_buffer_percent,
            )),
            Arc::new(Broadcast::new(
                provider.clone(),
                RetryPolicy::from_config(&config.retry),
            )),
            Arc::new(Confirm::new(provider, config.confirm_timeout())),
        ];

        Self { network, stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(
        &self,
        request: TransferRequest,
        cancel: &CancellationToken,
    ) -> TransferOutcome {
        let wallet_id = request.wallet_id.clone();
        let ctx = TransferContext::new(
            request.into_params(&self.network.name),
            self.network.gas_type,
        );

        let (run, ctx) = WorkflowExecutor::strict()
            .run(WORKFLOW_NAME, &wallet_id, &self.stages, ctx, cancel)
            .await;

        TransferOutcome {
            run,
            tx_hash: ctx.tx_hash,
            receipt: ctx.receipt,
        }
    }
}

#[cfg(all(test, feature = "sim-engine"))]
mod tests {
    use super::*;
    use crate::chain::sim::{ProviderOp, SimulatedProvider};
    use crate::chain::{GasType, ProviderError};
    use crate::config::EncryptionKey;
    use crate::core_types::WalletId;
    use crate::engine::EngineError;
    use crate::engine::sim::{EngineOp, SimulatedEngine};
    use crate::workflow::{ErrorKind, RunStatus, StageState};
    use num_bigint::BigUint;
    use std::time::Duration;

    fn network(gas_type: GasType) -> NetworkConfig {
        NetworkConfig {
            name: "Ethereum".to_string(),
            chain_id: 1,
            gas_type,
        }
    }

    fn request() -> TransferRequest {
        TransferRequest::single(
            WalletId::from("w1"),
            EncryptionKey::from_passphrase_or_hex("pass"),
            "0xweth",
            BigUint::from(10_000_000_000_000_000u64),
            "0zk1recipient",
        )
    }

    fn setup() -> (Arc<SimulatedEngine>, Arc<SimulatedProvider>, TransferWorkflow) {
        let engine = Arc::new(SimulatedEngine::new());
        let provider = Arc::new(SimulatedProvider::new());
        let config = TransferConfig {
            confirm_timeout_ms: 1_000,
            ..TransferConfig::default()
        };
        let workflow = TransferWorkflow::new(
            engine.clone(),
            provider.clone(),
            network(GasType::Eip1559),
            &config,
        );
        (engine, provider, workflow)
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_limit_has_buffer() {
        let (engine, provider, workflow) = setup();
        engine.set_gas_estimate(100_000u32);

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Completed);
        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].gas_limit, Some(BigUint::from(120_000u32)));
        assert_eq!(sent[0].gas.gas_type(), GasType::Eip1559);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_rejection_halts_before_proof() {
        let (engine, _provider, workflow) = setup();
        engine.push_failure(
            EngineOp::EstimateGas,
            EngineError::Rejected("insufficient balance".into()),
        );

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(outcome.run.error().map(|e| e.kind), Some(ErrorKind::Rejected));
        assert_eq!(engine.call_count(EngineOp::GenerateProof), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_retries_transient_errors() {
        let (_engine, provider, workflow) = setup();
        provider.push_failure(
            ProviderOp::SendTransaction,
            ProviderError::RpcConnection("reset".into()),
        );

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(provider.call_count(ProviderOp::SendTransaction), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout_is_unknown_outcome() {
        let (_engine, provider, workflow) = setup();
        provider.set_confirm_delay(Duration::from_secs(5));

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(
            outcome.run.error().map(|e| e.kind),
            Some(ErrorKind::UnknownOutcome)
        );
        assert!(outcome.tx_hash.is_some());
        assert!(outcome.receipt.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_receipt_is_rejected() {
        let (_engine, provider, workflow) = setup();
        provider.set_revert(true);

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(outcome.run.error().map(|e| e.kind), Some(ErrorKind::Rejected));
        assert!(!outcome.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_rpc_error_is_unknown_outcome() {
        let (_engine, provider, workflow) = setup();
        provider.push_failure(
            ProviderOp::WaitForConfirmation,
            ProviderError::Rejected("header not found".into()),
        );

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(
            outcome.run.error().map(|e| e.kind),
            Some(ErrorKind::UnknownOutcome)
        );
        assert!(outcome.tx_hash.is_some());
        assert!(outcome.receipt.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_broadcast_response_is_not_resent() {
        let (_engine, provider, workflow) = setup();
        provider.lose_next_send_response();

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Failed);
        let broadcast = outcome.run.stage(stages::BROADCAST).unwrap();
        assert_eq!(broadcast.state, StageState::Failed);
        assert_eq!(
            broadcast.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::UnknownOutcome)
        );
        assert_eq!(provider.call_count(ProviderOp::SendTransaction), 1);
        assert_eq!(provider.sent().len(), 1);
        assert_eq!(
            outcome.run.stage(stages::CONFIRM).map(|s| s.state),
            Some(StageState::Pending)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_error_is_fatal() {
        let (engine, _provider, workflow) = setup();
        engine.push_failure(
            EngineOp::PopulateTransfer,
            EngineError::Session("engine crashed".into()),
        );

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Fatal);
        assert!(outcome.run.requires_escalation());
        assert_eq!(
            outcome.run.stage(stages::BROADCAST).map(|s| s.state),
            Some(StageState::Pending)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_fee_model_is_kept_through_populate() {
        let engine = Arc::new(SimulatedEngine::new());
        let provider = Arc::new(SimulatedProvider::new());
        let workflow = TransferWorkflow::new(
            engine,
            provider.clone(),
            network(GasType::Legacy),
            &TransferConfig::default(),
        );

        let outcome = workflow.execute(request(), &CancellationToken::new()).await;

        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(provider.sent()[0].gas.gas_type(), GasType::Legacy);
    }
}
