//! Balance Aggregator
//!
//! One `aggregate` call triggers a single engine refresh and folds every
//! matching balance notification into a snapshot until one of:
//!
//! - no accepted event for `quiescence_window` (timer armed by the first
//!   accepted event, re-armed by each following one)
//! - the overall ceiling elapses (covers "no events ever")
//! - the event stream closes
//!
//! Concurrent calls for the same wallet join the in-flight aggregation and
//! receive the same result. Collection runs on its own task, which removes
//! the in-flight entry when it settles, so dropping every caller never
//! leaves a half-finished aggregation behind for the next call to join.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::AggregateError;
use super::snapshot::BalanceSnapshot;
use crate::config::AggregatorConfig;
use crate::core_types::{Chain, WalletId};
use crate::engine::{EngineEvent, EventKind, ShieldedEngine};
use crate::events::{EventBus, Subscription};

type SharedResult = Shared<BoxFuture<'static, Result<BalanceSnapshot, AggregateError>>>;

struct InFlight {
    generation: u64,
    result: SharedResult,
}

/// Why an aggregation stopped collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    Quiescent,
    Ceiling,
    StreamClosed,
}

impl SettleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettleReason::Quiescent => "quiescent",
            SettleReason::Ceiling => "ceiling",
            SettleReason::StreamClosed => "stream_closed",
        }
    }
}

pub struct BalanceAggregator {
    engine: Arc<dyn ShieldedEngine>,
    bus: Arc<EventBus>,
    ceiling: Duration,
    default_window: Duration,
    in_flight: Arc<DashMap<WalletId, InFlight>>,
    next_generation: AtomicU64,
}

impl BalanceAggregator {
    pub fn new(
        engine: Arc<dyn ShieldedEngine>,
        bus: Arc<EventBus>,
        config: &AggregatorConfig,
    ) -> Self {
        Self {
            engine,
            bus,
            ceiling: config.ceiling(),
            default_window: config.quiescence_window(),
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Quiescence window from configuration
    pub fn default_window(&self) -> Duration {
        self.default_window
    }

    /// Refresh `wallet_id` on `chain` and return the settled snapshot.
    ///
    /// A call made while another aggregation for the same wallet is running
    /// joins it instead of triggering a second refresh; the joiner's
    /// `quiescence_window` is ignored in that case.
    pub async fn aggregate(
        &self,
        wallet_id: &WalletId,
        chain: Chain,
        quiescence_window: Duration,
    ) -> Result<BalanceSnapshot, AggregateError> {
        if self.ceiling <= quiescence_window {
            return Err(AggregateError::InvalidConfig {
                quiescence: quiescence_window,
                ceiling: self.ceiling,
            });
        }

        let result = match self.in_flight.entry(wallet_id.clone()) {
            Entry::Occupied(existing) => {
                debug!(wallet_id = %wallet_id, "Joining in-flight aggregation");
                existing.get().result.clone()
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                // Subscribe before the refresh so no early event is missed
                let events = self.bus.subscribe(EventKind::BalanceUpdate);
                let in_flight = Arc::clone(&self.in_flight);
                let key = wallet_id.clone();
                let collecting = collect(
                    Arc::clone(&self.engine),
                    events,
                    wallet_id.clone(),
                    chain,
                    quiescence_window,
                    self.ceiling,
                );
                // Owns its own cleanup: runs to completion even if every caller is gone
                let task = tokio::spawn(async move {
                    let outcome = collecting.await;
                    in_flight.remove_if(&key, |_, entry| entry.generation == generation);
                    outcome
                });
                let run = async move {
                    task.await
                        .unwrap_or_else(|e| Err(AggregateError::Aborted(e.to_string())))
                }
                .boxed()
                .shared();
                slot.insert(InFlight {
                    generation,
                    result: run.clone(),
                });
                run
            }
        };

        result.await
    }

    /// Wallets with an aggregation currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

async fn collect(
    engine: Arc<dyn ShieldedEngine>,
    mut events: Subscription,
    wallet_id: WalletId,
    chain: Chain,
    window: Duration,
    ceiling: Duration,
) -> Result<BalanceSnapshot, AggregateError> {
    let started = Instant::now();
    let mut snapshot = BalanceSnapshot::new();
    let mut accepted = 0usize;

    let wallets = [wallet_id.clone()];
    let refresh = engine.refresh_balances(chain, &wallets);
    tokio::pin!(refresh);
    let mut refresh_done = false;

    let ceiling_timer = tokio::time::sleep(ceiling);
    tokio::pin!(ceiling_timer);
    let quiescence = tokio::time::sleep(window);
    tokio::pin!(quiescence);
    let mut armed = false;

    let reason = loop {
        tokio::select! {
            result = &mut refresh, if !refresh_done => {
                refresh_done = true;
                match result {
                    Ok(()) => debug!(wallet_id = %wallet_id, "Balance refresh triggered"),
                    Err(e) if accepted == 0 => {
                        error!(wallet_id = %wallet_id, error = %e, "Balance refresh failed");
                        return Err(AggregateError::Refresh(e));
                    }
                    Err(e) => {
                        warn!(wallet_id = %wallet_id, error = %e, "Balance refresh failed after events arrived, continuing");
                    }
                }
            }
            event = events.recv() => match event {
                Some(EngineEvent::BalanceUpdate(update)) => {
                    if update.wallet_id != wallet_id || update.chain != chain {
                        continue;
                    }
                    if snapshot.apply(update.bucket, &update.tokens) {
                        accepted += 1;
                        quiescence.as_mut().reset(Instant::now() + window);
                        armed = true;
                        debug!(
                            wallet_id = %wallet_id,
                            bucket = update.bucket.as_str(),
                            tokens = update.tokens.len(),
                            "Balance bucket updated"
                        );
                    }
                }
                Some(_) => {}
                None => break SettleReason::StreamClosed,
            },
            () = &mut quiescence, if armed => break SettleReason::Quiescent,
            () = &mut ceiling_timer => break SettleReason::Ceiling,
        }
    };

    info!(
        wallet_id = %wallet_id,
        chain = %chain,
        reason = reason.as_str(),
        events = accepted,
        buckets = snapshot.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Balance snapshot settled"
    );

    Ok(snapshot)
}
