//! Engine Session
//!
//! Explicit handle over one engine instance and everything wired to it: the
//! event bus, the balance aggregator and both workflows. Every operation
//! goes through a `Session`; `shutdown` releases callbacks before stopping
//! the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::balance::{AggregateError, BalanceAggregator, BalanceSnapshot};
use crate::chain::ChainProvider;
use crate::config::{AppConfig, Credentials};
use crate::core_types::{Chain, WalletId};
use crate::engine::{EngineError, EngineEvent, EventKind, ShieldedEngine};
use crate::events::EventBus;
use crate::logging::ENGINE_TARGET;
use crate::reconcile::{ReconciliationManager, ReconciliationReport};
use crate::transfer::{TransferOutcome, TransferRequest, TransferWorkflow};

pub struct Session {
    engine: Arc<dyn ShieldedEngine>,
    provider: Arc<dyn ChainProvider>,
    bus: Arc<EventBus>,
    aggregator: BalanceAggregator,
    transfer: TransferWorkflow,
    reconciliation: ReconciliationManager,
    chain: Chain,
    quiescence_window: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        engine: Arc<dyn ShieldedEngine>,
        provider: Arc<dyn ChainProvider>,
        config: &AppConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new(
            engine.clone(),
            config.events.queue_capacity,
        ));
        let aggregator = BalanceAggregator::new(engine.clone(), bus.clone(), &config.aggregator);
        let transfer = TransferWorkflow::new(
            engine.clone(),
            provider.clone(),
            config.network.clone(),
            &config.transfer,
        );
        let reconciliation = ReconciliationManager::new(engine.clone(), config.network.name.clone());

        info!(
            engine = engine.name(),
            provider = provider.name(),
            chain = %config.network.chain(),
            "Session opened"
        );

        Self {
            engine,
            provider,
            bus,
            aggregator,
            transfer,
            reconciliation,
            chain: config.network.chain(),
            quiescence_window: config.aggregator.quiescence_window(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ShieldedEngine> {
        &self.engine
    }

    pub fn provider(&self) -> &Arc<dyn ChainProvider> {
        &self.provider
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn aggregator(&self) -> &BalanceAggregator {
        &self.aggregator
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); child tokens stop with it
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn load_wallet(&self, credentials: &Credentials) -> Result<WalletId, EngineError> {
        let wallet_id = self
            .engine
            .load_wallet(
                &credentials.encryption_key,
                &credentials.mnemonic,
                credentials.creation_block,
            )
            .await?;
        info!(wallet_id = %wallet_id, "Wallet loaded");
        Ok(wallet_id)
    }

    /// Settled snapshot using the configured quiescence window
    pub async fn refresh_balances(
        &self,
        wallet_id: &WalletId,
    ) -> Result<BalanceSnapshot, AggregateError> {
        self.aggregator
            .aggregate(wallet_id, self.chain, self.quiescence_window)
            .await
    }

    pub async fn transfer(&self, request: TransferRequest) -> TransferOutcome {
        let cancel = self.cancel.child_token();
        self.transfer.execute(request, &cancel).await
    }

    pub async fn reconcile(&self, wallet_id: &WalletId) -> ReconciliationReport {
        let cancel = self.cancel.child_token();
        self.reconciliation.reconcile(wallet_id, &cancel).await
    }

    /// Log merkletree scan progress until the session shuts down
    pub fn watch_scan_progress(&self) -> JoinHandle<()> {
        let mut events = self.bus.subscribe(EventKind::MerkletreeScan);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let EngineEvent::MerkletreeScan(scan) = event {
                    info!(
                        target: ENGINE_TARGET,
                        chain = %scan.chain,
                        status = scan.status.as_str(),
                        progress = format!("{:.1}%", scan.progress * 100.0),
                        "Merkletree scan"
                    );
                }
            }
        })
    }

    /// Cancel running workflows, release every callback and stop the engine.
    /// Only the first call does anything.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        self.bus.unsubscribe_all();

        match self.engine.shutdown().await {
            Ok(()) => {
                info!("Session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Engine shutdown failed");
                Err(e)
            }
        }
    }
}
