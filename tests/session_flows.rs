//! Session-level flows against the simulated engine and provider.

use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use shielded_ops::chain::sim::{ProviderOp, SimulatedProvider};
use shielded_ops::config::{AppConfig, Credentials, EncryptionKey};
use shielded_ops::engine::sim::{EngineOp, ScriptedEvent, SimulatedEngine};
use shielded_ops::engine::{BalanceBucket, BalanceEvent, EngineError, EngineEvent, TokenBalance};
use shielded_ops::reconcile::stages::{GENERATE_POIS, REFRESH_RECEIVE_POIS, REFRESH_SPENT_POIS};
use shielded_ops::transfer::stages::{ESTIMATE_GAS, GENERATE_PROOF, POPULATE_TRANSACTION};
use shielded_ops::workflow::{ErrorKind, RunStatus, StageState};
use shielded_ops::{Chain, Session, TransferRequest, TransferWorkflow, WalletId};

const CONFIG: &str = r#"
log_level: "info"
log_dir: "./logs"
log_file: "test.log"
use_json: false
rotation: "never"
enable_tracing: false
network:
  name: "Ethereum"
  chain_id: 1
  gas_type: "eip1559"
aggregator:
  quiescence_window_ms: 500
  ceiling_ms: 2000
transfer:
  confirm_timeout_ms: 5000
  gas_limit_buffer_percent: 20
  retry:
    max_attempts: 3
    initial_backoff_ms: 10
    max_backoff_ms: 100
  token_address: "0xweth"
  amount: "0.01"
  token_decimals: 18
events:
  queue_capacity: 64
"#;

fn config() -> AppConfig {
    AppConfig::from_yaml(CONFIG).unwrap()
}

fn credentials() -> Credentials {
    let vars: HashMap<&str, &str> = [
        ("MNEMONIC", "test test test test test test test test test test test junk"),
        ("ENCRYPTION_KEY", "demo passphrase"),
        ("RPC_URL", "http://127.0.0.1:8545"),
        ("TARGET_0ZK_ADDRESS", "0zk1recipient"),
    ]
    .into_iter()
    .collect();
    Credentials::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn request(wallet_id: WalletId) -> TransferRequest {
    TransferRequest::single(
        wallet_id,
        EncryptionKey::from_passphrase_or_hex("demo passphrase"),
        "0xweth",
        BigUint::from(10_000_000_000_000_000u64),
        "0zk1recipient",
    )
}

#[tokio::test(start_paused = true)]
async fn balances_then_transfer_end_to_end() {
    let engine = Arc::new(SimulatedEngine::new());
    let provider = Arc::new(SimulatedProvider::new());
    engine.set_gas_estimate(21_000u32);
    provider.set_tx_hash("0xabc");

    let session = Session::new(engine.clone(), provider.clone(), &config());
    let wallet_id = session.load_wallet(&credentials()).await.unwrap();

    engine.set_balance_script(vec![ScriptedEvent {
        delay: Duration::from_millis(100),
        event: EngineEvent::BalanceUpdate(BalanceEvent {
            chain: Chain::evm(1),
            wallet_id: wallet_id.clone(),
            bucket: BalanceBucket::Spendable,
            tokens: vec![TokenBalance::new("0xweth", 50_000_000_000_000_000u64)],
        }),
    }]);
    let snapshot = session.refresh_balances(&wallet_id).await.unwrap();
    assert!(snapshot.get(BalanceBucket::Spendable).is_some());

    let outcome = session.transfer(request(wallet_id.clone())).await;

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.tx_hash.as_ref().map(|h| h.as_str()), Some("0xabc"));
    assert!(outcome.is_confirmed());
    assert!(outcome.run.stages.iter().all(|s| s.state == StageState::Completed));

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].gas_limit, Some(BigUint::from(25_200u32)));

    let report = session.reconcile(&wallet_id).await;
    assert_eq!(report.run.status, RunStatus::Completed);

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_during_proof_stops_before_populate() {
    let engine = Arc::new(SimulatedEngine::new());
    let provider = Arc::new(SimulatedProvider::new());
    engine.set_proof_duration(Duration::from_secs(10));

    let app = config();
    let workflow = TransferWorkflow::new(
        engine.clone(),
        provider.clone(),
        app.network.clone(),
        &app.transfer,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let outcome = workflow.execute(request(WalletId::from("w1")), &cancel).await;

    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert_eq!(
        outcome.run.stage(ESTIMATE_GAS).map(|s| s.state),
        Some(StageState::Completed)
    );
    let proof = outcome.run.stage(GENERATE_PROOF).unwrap();
    assert_eq!(proof.state, StageState::Failed);
    assert_eq!(proof.error.as_ref().map(|e| e.kind), Some(ErrorKind::Cancelled));
    assert_eq!(
        outcome.run.stage(POPULATE_TRANSACTION).map(|s| s.state),
        Some(StageState::Pending)
    );

    assert_eq!(engine.call_count(EngineOp::PopulateTransfer), 0);
    assert_eq!(provider.call_count(ProviderOp::SendTransaction), 0);
    assert!(outcome.tx_hash.is_none());
}

#[tokio::test]
async fn reconciliation_keeps_going_after_failures() {
    let engine = Arc::new(SimulatedEngine::new());
    engine.push_failure(
        EngineOp::RefreshSpentPois,
        EngineError::Network("poi node unreachable".into()),
    );
    engine.push_failure(
        EngineOp::RefreshReceivePois,
        EngineError::Poi("bad list key".into()),
    );

    let session = Session::new(engine.clone(), Arc::new(SimulatedProvider::new()), &config());
    let report = session.reconcile(&WalletId::from("w1")).await;

    let invocations = engine.call_count(EngineOp::RefreshSpentPois)
        + engine.call_count(EngineOp::RefreshReceivePois)
        + engine.call_count(EngineOp::GeneratePois);
    assert_eq!(invocations, 3);

    assert_eq!(report.run.status, RunStatus::CompletedWithWarnings);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(report.warnings[0].stage, REFRESH_SPENT_POIS);
    assert_eq!(report.warnings[1].stage, REFRESH_RECEIVE_POIS);
    assert_eq!(
        report.run.stage(GENERATE_POIS).map(|s| s.state),
        Some(StageState::Completed)
    );
    assert!(!report.state.spent_refreshed);
    assert!(report.state.generation_triggered);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_blocks_later_work() {
    let engine = Arc::new(SimulatedEngine::new());
    let session = Session::new(engine.clone(), Arc::new(SimulatedProvider::new()), &config());

    session.shutdown().await.unwrap();
    session.shutdown().await.unwrap();
    assert_eq!(engine.call_count(EngineOp::Shutdown), 1);

    let outcome = session.transfer(request(WalletId::from("w1"))).await;
    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert_eq!(outcome.run.error().map(|e| e.kind), Some(ErrorKind::Cancelled));
    assert_eq!(engine.call_count(EngineOp::EstimateGas), 0);
}
