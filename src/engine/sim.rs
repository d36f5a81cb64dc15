//! Simulated Engine
//!
//! Scriptable in-process stand-in for the shielded wallet engine. Used by the
//! binary in dev environments and by tests.
//!
//! - Balance events are scripted with delays relative to each
//!   `refresh_balances` call and emitted through whichever callback is
//!   registered at emission time (single callback per kind, exactly like the
//!   real engine).
//! - Failures are queued per operation; each call pops at most one.
//! - Every operation is counted.

use async_trait::async_trait;
use dashmap::DashMap;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::artifacts::ArtifactStore;
use super::{
    EngineError, EngineEvent, EventCallback, EventKind, ProgressCallback, ShieldedEngine,
    TransactionPayload, TransferParams, TransferProof,
};
use crate::chain::gas::GasDetails;
use crate::config::EncryptionKey;
use crate::core_types::{Amount, Chain, WalletId};

/// Shielded relay contract on Ethereum mainnet
pub const RELAY_CONTRACT: &str = "0xFA7093CDD9EE6932B4eb2c9e1cde7CE00B1FA4b9";

/// Operations tracked by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    LoadWallet,
    RefreshBalances,
    EstimateGas,
    GenerateProof,
    PopulateTransfer,
    RefreshSpentPois,
    RefreshReceivePois,
    GeneratePois,
    Shutdown,
}

/// Circuit artifact fetched on first proof, then served from the store
pub const TRANSFER_CIRCUIT_KEY: &str = "v2/circuits/transfer/zkey";

/// Scripted event emitted `delay` after a refresh call
#[derive(Debug, Clone)]
pub struct ScriptedEvent {
    pub delay: Duration,
    pub event: EngineEvent,
}

pub struct SimulatedEngine {
    callbacks: Arc<DashMap<EventKind, EventCallback>>,
    registrations: DashMap<EventKind, usize>,
    calls: DashMap<EngineOp, usize>,
    failures: DashMap<EngineOp, VecDeque<EngineError>>,
    script: Mutex<Vec<ScriptedEvent>>,
    late_refresh_failures: Mutex<VecDeque<(Duration, EngineError)>>,
    gas_estimate: Mutex<Amount>,
    proof_duration: Mutex<Duration>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    stopped: AtomicBool,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(DashMap::new()),
            registrations: DashMap::new(),
            calls: DashMap::new(),
            failures: DashMap::new(),
            script: Mutex::new(Vec::new()),
            late_refresh_failures: Mutex::new(VecDeque::new()),
            gas_estimate: Mutex::new(BigUint::from(21000u32)),
            proof_duration: Mutex::new(Duration::ZERO),
            artifacts: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Cache circuit artifacts in `store` the way a real prover does
    pub fn with_artifacts(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    async fn ensure_circuit(&self) -> Result<(), EngineError> {
        let Some(store) = &self.artifacts else {
            return Ok(());
        };
        let cached = store
            .exists(TRANSFER_CIRCUIT_KEY)
            .await
            .map_err(|e| EngineError::Proof(e.to_string()))?;
        if !cached {
            store
                .put(TRANSFER_CIRCUIT_KEY, b"simulated-zkey")
                .await
                .map_err(|e| EngineError::Proof(e.to_string()))?;
            info!(key = TRANSFER_CIRCUIT_KEY, "Circuit artifact downloaded");
        }
        Ok(())
    }

    /// Events to emit after every subsequent `refresh_balances`
    pub fn set_balance_script(&self, script: Vec<ScriptedEvent>) {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
    }

    /// Next `refresh_balances` still emits its script, then fails `after` the call
    pub fn push_late_refresh_failure(&self, after: Duration, error: EngineError) {
        self.late_refresh_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((after, error));
    }

    pub fn set_gas_estimate(&self, estimate: impl Into<Amount>) {
        *self.gas_estimate.lock().unwrap_or_else(PoisonError::into_inner) = estimate.into();
    }

    /// Total simulated proving time, reported in 10% progress steps
    pub fn set_proof_duration(&self, duration: Duration) {
        *self.proof_duration.lock().unwrap_or_else(PoisonError::into_inner) = duration;
    }

    /// Queue a failure for the next call of `op`
    pub fn push_failure(&self, op: EngineOp, error: EngineError) {
        self.failures.entry(op).or_default().push_back(error);
    }

    pub fn call_count(&self, op: EngineOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// How many times a callback was (re)registered for `kind`
    pub fn registration_count(&self, kind: EventKind) -> usize {
        self.registrations.get(&kind).map(|c| *c).unwrap_or(0)
    }

    pub fn has_callback(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Push an event through the registered callback right now
    pub fn emit(&self, event: EngineEvent) {
        emit_through(&self.callbacks, event);
    }

    fn begin(&self, op: EngineOp) -> Result<(), EngineError> {
        *self.calls.entry(op).or_insert(0) += 1;

        if op != EngineOp::Shutdown && self.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::Session("engine stopped".to_string()));
        }

        let scripted = self.failures.get_mut(&op).and_then(|mut q| q.pop_front());
        match scripted {
            Some(e) => {
                debug!(op = ?op, error = %e, "Simulated failure");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn emit_through(callbacks: &DashMap<EventKind, EventCallback>, event: EngineEvent) {
    // Clone out of the map so the callback never runs under a shard lock
    let callback = callbacks.get(&event.kind()).map(|c| c.value().clone());
    if let Some(callback) = callback {
        callback(event);
    }
}

#[async_trait]
impl ShieldedEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn set_event_callback(&self, kind: EventKind, callback: Option<EventCallback>) {
        match callback {
            Some(cb) => {
                *self.registrations.entry(kind).or_insert(0) += 1;
                self.callbacks.insert(kind, cb);
            }
            None => {
                self.callbacks.remove(&kind);
            }
        }
    }

    async fn load_wallet(
        &self,
        _encryption_key: &EncryptionKey,
        mnemonic: &str,
        creation_block: u64,
    ) -> Result<WalletId, EngineError> {
        self.begin(EngineOp::LoadWallet)?;
        let digest = Sha256::digest(mnemonic.trim().as_bytes());
        let wallet_id = WalletId::new(hex::encode(&digest[..16]));
        info!(wallet_id = %wallet_id, creation_block, "Simulated wallet loaded");
        Ok(wallet_id)
    }

    async fn refresh_balances(
        &self,
        chain: Chain,
        wallet_ids: &[WalletId],
    ) -> Result<(), EngineError> {
        self.begin(EngineOp::RefreshBalances)?;

        let script = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(chain = %chain, wallets = wallet_ids.len(), events = script.len(), "Simulated refresh");

        if !script.is_empty() {
            let callbacks = self.callbacks.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now();
                for scripted in script {
                    tokio::time::sleep_until(start + scripted.delay).await;
                    emit_through(&callbacks, scripted.event);
                }
            });
        }

        let late = self
            .late_refresh_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some((after, error)) = late {
            tokio::time::sleep(after).await;
            debug!(error = %error, "Simulated late refresh failure");
            return Err(error);
        }

        Ok(())
    }

    async fn estimate_transfer_gas(
        &self,
        params: &TransferParams,
        _gas: &GasDetails,
    ) -> Result<Amount, EngineError> {
        self.begin(EngineOp::EstimateGas)?;
        if params.recipients.is_empty() {
            return Err(EngineError::Rejected("no recipients".to_string()));
        }
        Ok(self
            .gas_estimate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn generate_transfer_proof(
        &self,
        params: &TransferParams,
        _min_gas_price: &Amount,
        on_progress: ProgressCallback,
    ) -> Result<TransferProof, EngineError> {
        self.begin(EngineOp::GenerateProof)?;
        self.ensure_circuit().await?;

        let total = *self
            .proof_duration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let step = total / 10;
        for i in 1..=10 {
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            on_progress(i as f64 / 10.0);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        info!(wallet_id = %params.wallet_id, proof_id = %id, "Simulated proof ready");
        Ok(TransferProof { id })
    }

    async fn populate_transfer(
        &self,
        _params: &TransferParams,
        proof: &TransferProof,
        _min_gas_price: &Amount,
        gas: &GasDetails,
    ) -> Result<TransactionPayload, EngineError> {
        self.begin(EngineOp::PopulateTransfer)?;
        Ok(TransactionPayload {
            chain_id: 1,
            to: RELAY_CONTRACT.to_string(),
            data: format!("0x{}", hex::encode(proof.id.as_bytes())),
            value: BigUint::ZERO,
            gas: gas.clone(),
            gas_limit: None,
        })
    }

    async fn refresh_spent_pois(
        &self,
        _network: &str,
        _wallet_id: &WalletId,
    ) -> Result<(), EngineError> {
        self.begin(EngineOp::RefreshSpentPois)
    }

    async fn refresh_receive_pois(
        &self,
        _network: &str,
        _wallet_id: &WalletId,
    ) -> Result<(), EngineError> {
        self.begin(EngineOp::RefreshReceivePois)
    }

    async fn generate_pois(&self, _network: &str, _wallet_id: &WalletId) -> Result<(), EngineError> {
        self.begin(EngineOp::GeneratePois)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.begin(EngineOp::Shutdown)?;
        self.stopped.store(true, Ordering::SeqCst);
        self.callbacks.clear();
        info!("Simulated engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BalanceBucket, BalanceEvent, TokenBalance};
    use std::sync::atomic::AtomicUsize;

    fn balance_event() -> EngineEvent {
        EngineEvent::BalanceUpdate(BalanceEvent {
            chain: Chain::evm(1),
            wallet_id: WalletId::from("w1"),
            bucket: BalanceBucket::Spendable,
            tokens: vec![TokenBalance::new("0xweth", 5u32)],
        })
    }

    #[test]
    fn test_reregistration_replaces_callback() {
        let engine = SimulatedEngine::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        engine.set_event_callback(
            EventKind::BalanceUpdate,
            Some(Arc::new(move |_: EngineEvent| {
                f.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let s = second.clone();
        engine.set_event_callback(
            EventKind::BalanceUpdate,
            Some(Arc::new(move |_: EngineEvent| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
        );

        engine.emit(balance_event());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(engine.registration_count(EventKind::BalanceUpdate), 2);
    }

    #[tokio::test]
    async fn test_queued_failure_is_consumed_once() {
        let engine = SimulatedEngine::new();
        engine.push_failure(EngineOp::GeneratePois, EngineError::Poi("node down".into()));

        assert!(engine.generate_pois("Ethereum", &"w1".into()).await.is_err());
        assert!(engine.generate_pois("Ethereum", &"w1".into()).await.is_ok());
        assert_eq!(engine.call_count(EngineOp::GeneratePois), 2);
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_are_session_errors() {
        let engine = SimulatedEngine::new();
        engine.shutdown().await.unwrap();
        let err = engine
            .refresh_balances(Chain::evm(1), &["w1".into()])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_load_wallet_is_deterministic() {
        let engine = SimulatedEngine::new();
        let key = EncryptionKey::from_passphrase_or_hex("pass");
        let a = engine.load_wallet(&key, "test test junk", 0).await.unwrap();
        let b = engine.load_wallet(&key, "test test junk", 0).await.unwrap();
        let c = engine.load_wallet(&key, "other words", 0).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 32);
    }

    #[tokio::test]
    async fn test_first_proof_caches_circuit() {
        use crate::engine::artifacts::FsArtifactStore;
        use crate::engine::TransferRecipient;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()));
        let engine = SimulatedEngine::new().with_artifacts(store.clone());
        let params = TransferParams {
            network: "Ethereum".to_string(),
            wallet_id: WalletId::from("w1"),
            encryption_key: EncryptionKey::from_passphrase_or_hex("pass"),
            memo: None,
            recipients: vec![TransferRecipient {
                token_address: "0xweth".to_string(),
                amount: BigUint::from(1u32),
                recipient_address: "0zk1recipient".to_string(),
            }],
            show_sender_address_to_recipient: false,
            send_with_public_wallet: true,
        };

        assert!(!store.exists(TRANSFER_CIRCUIT_KEY).await.unwrap());
        engine
            .generate_transfer_proof(&params, &BigUint::ZERO, Arc::new(|_: f64| {}))
            .await
            .unwrap();
        assert!(store.exists(TRANSFER_CIRCUIT_KEY).await.unwrap());
    }
}
