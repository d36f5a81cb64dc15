//! Event Bus
//!
//! Registers exactly one upstream callback per [`EventKind`] with the engine
//! and fans each notification out to every in-process subscriber through a
//! bounded queue.
//!
//! ```text
//!   engine ──callback(kind)──▶ dispatch ──try_send──▶ Subscription #1
//!                                       ├─try_send──▶ Subscription #2
//!                                       └─try_send──▶ Subscription #N
//! ```
//!
//! Upstream registration is mutated only by [`EventBus::subscribe`] (first
//! subscriber of a kind) and [`EventBus::unsubscribe_all`], both under one
//! mutex. Dropping a [`Subscription`] only prunes the fan-out table; the
//! upstream callback stays until `unsubscribe_all`.

use dashmap::DashMap;
use futures::Stream;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, EventCallback, EventKind, ShieldedEngine};

/// Unique subscription identifier
pub type SubscriptionId = u64;

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<EngineEvent>,
}

type FanoutTable = DashMap<EventKind, Vec<Subscriber>>;

pub struct EventBus {
    engine: Arc<dyn ShieldedEngine>,
    subscribers: Arc<FanoutTable>,
    /// Kinds with a live upstream callback
    registered: Mutex<HashSet<EventKind>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl EventBus {
    pub fn new(engine: Arc<dyn ShieldedEngine>, queue_capacity: usize) -> Self {
        Self {
            engine,
            subscribers: Arc::new(DashMap::new()),
            registered: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Subscribe to every future event of `kind`.
    ///
    /// The stream ends only when [`unsubscribe_all`](Self::unsubscribe_all)
    /// tears the bus down.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.subscribers
            .entry(kind)
            .or_default()
            .push(Subscriber { id, tx });

        if registered.insert(kind) {
            let table = Arc::clone(&self.subscribers);
            let callback: EventCallback = Arc::new(move |event: EngineEvent| {
                dispatch(&table, event);
            });
            self.engine.set_event_callback(kind, Some(callback));
            info!(kind = %kind, engine = self.engine.name(), "Upstream callback registered");
        }

        debug!(kind = %kind, subscription_id = id, "Subscription added");

        Subscription {
            kind,
            id,
            rx,
            table: Arc::downgrade(&self.subscribers),
        }
    }

    /// Release every upstream callback and close every subscription stream
    pub fn unsubscribe_all(&self) {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for kind in registered.drain() {
            self.engine.set_event_callback(kind, None);
            debug!(kind = %kind, "Upstream callback released");
        }

        // Dropping the senders ends every stream
        self.subscribers.clear();
        info!("Event bus torn down");
    }

    /// Number of live subscribers for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }
}

/// Deliver one upstream event to every subscriber of its kind
fn dispatch(table: &FanoutTable, event: EngineEvent) {
    let kind = event.kind();
    let Some(mut subscribers) = table.get_mut(&kind) else {
        return;
    };

    subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(kind = %kind, subscription_id = sub.id, "Subscriber queue full, event dropped");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });
}

/// Lazy, infinite stream of engine events of one kind
pub struct Subscription {
    kind: EventKind,
    id: SubscriptionId,
    rx: mpsc::Receiver<EngineEvent>,
    table: Weak<FanoutTable>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the bus is torn down
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = EngineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade()
            && let Some(mut subscribers) = table.get_mut(&self.kind)
        {
            subscribers.retain(|s| s.id != self.id);
        }
    }
}

#[cfg(all(test, feature = "sim-engine"))]
mod tests {
    use super::*;
    use crate::core_types::{Chain, WalletId};
    use crate::engine::sim::SimulatedEngine;
    use crate::engine::{BalanceBucket, BalanceEvent, TokenBalance};
    use futures::StreamExt;

    fn balance_event(amount: u32) -> EngineEvent {
        EngineEvent::BalanceUpdate(BalanceEvent {
            chain: Chain::evm(1),
            wallet_id: WalletId::from("w1"),
            bucket: BalanceBucket::Spendable,
            tokens: vec![TokenBalance::new("0xweth", amount)],
        })
    }

    #[tokio::test]
    async fn test_single_upstream_registration_fans_out() {
        let engine = Arc::new(SimulatedEngine::new());
        let bus = EventBus::new(engine.clone(), 16);

        let mut a = bus.subscribe(EventKind::BalanceUpdate);
        let mut b = bus.subscribe(EventKind::BalanceUpdate);
        assert_eq!(engine.registration_count(EventKind::BalanceUpdate), 1);
        assert_eq!(bus.subscriber_count(EventKind::BalanceUpdate), 2);

        engine.emit(balance_event(7));

        assert_eq!(a.recv().await, Some(balance_event(7)));
        assert_eq!(b.next().await, Some(balance_event(7)));
    }

    #[tokio::test]
    async fn test_drop_prunes_subscriber_but_keeps_upstream() {
        let engine = Arc::new(SimulatedEngine::new());
        let bus = EventBus::new(engine.clone(), 16);

        let a = bus.subscribe(EventKind::BalanceUpdate);
        drop(a);
        assert_eq!(bus.subscriber_count(EventKind::BalanceUpdate), 0);
        assert!(engine.has_callback(EventKind::BalanceUpdate));

        let _b = bus.subscribe(EventKind::BalanceUpdate);
        assert_eq!(engine.registration_count(EventKind::BalanceUpdate), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_closes_streams() {
        let engine = Arc::new(SimulatedEngine::new());
        let bus = EventBus::new(engine.clone(), 16);

        let mut a = bus.subscribe(EventKind::BalanceUpdate);
        let mut scan = bus.subscribe(EventKind::MerkletreeScan);
        bus.unsubscribe_all();

        assert_eq!(a.recv().await, None);
        assert_eq!(scan.recv().await, None);
        assert!(!engine.has_callback(EventKind::BalanceUpdate));
        assert!(!bus.is_registered(EventKind::MerkletreeScan));

        // Fresh subscription after teardown registers again
        let _c = bus.subscribe(EventKind::BalanceUpdate);
        assert_eq!(engine.registration_count(EventKind::BalanceUpdate), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_for_that_subscriber_only() {
        let engine = Arc::new(SimulatedEngine::new());
        let bus = EventBus::new(engine.clone(), 1);

        let mut slow = bus.subscribe(EventKind::BalanceUpdate);
        engine.emit(balance_event(1));
        engine.emit(balance_event(2));

        assert_eq!(slow.recv().await, Some(balance_event(1)));
        assert!(slow.rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(EventKind::BalanceUpdate), 1);
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let engine = Arc::new(SimulatedEngine::new());
        let bus = EventBus::new(engine.clone(), 16);

        let mut scan = bus.subscribe(EventKind::MerkletreeScan);
        let _balances = bus.subscribe(EventKind::BalanceUpdate);
        engine.emit(balance_event(3));

        assert!(scan.rx.try_recv().is_err());
    }
}
