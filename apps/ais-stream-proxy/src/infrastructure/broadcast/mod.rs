//! Subscription Registry and Broadcaster
//!
//! Owns one pool of downstream subscribers, each with an optional
//! bounding-box filter, and fans every vessel update out to them.
//!
//! # Delivery Pass
//!
//! 1. Snapshot matching subscribers under the read lock, then release it.
//! 2. Deliver sequentially; no lock is held across an `.await`.
//! 3. Evict every subscriber whose delivery failed, under the write lock.
//! 4. Hand the update to the external sink, if any, regardless of filters.
//!
//! A failing subscriber never affects delivery to the others.
//!
//! # Pools
//!
//! `/ws/ais-stream` connections live in the primary registry. The
//! `/ws/vessels` pool is a second registry fed through [`bridge_sink`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::metrics::{self, Pool};
use crate::application::ports::{DeliveryError, VesselSink};
use crate::domain::region::BoundingBox;
use crate::domain::vessel::VesselUpdate;

// =============================================================================
// Types
// =============================================================================

/// Opaque subscriber handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }

    /// Raw numeric value, for logging.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Callback receiving every update after the subscriber pass.
pub type ExternalSink = Arc<dyn Fn(Arc<VesselUpdate>) + Send + Sync>;

/// Shared registry reference.
pub type SharedRegistry = Arc<SubscriptionRegistry>;

/// Result of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers that accepted the update.
    pub delivered: usize,
    /// Subscribers skipped by their region filter.
    pub filtered: usize,
    /// Subscribers evicted after a failed delivery.
    pub evicted: usize,
}

/// Point-in-time registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Pool this registry serves.
    pub pool: Pool,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Subscribers with a region filter.
    pub filtered_subscribers: usize,
    /// Updates broadcast since start.
    pub updates_broadcast: u64,
    /// Successful deliveries since start.
    pub deliveries: u64,
    /// Evictions since start.
    pub evictions: u64,
    /// Whether an external sink is attached.
    pub has_external_sink: bool,
}

struct Subscriber {
    sink: Arc<dyn VesselSink>,
    filter: Option<BoundingBox>,
}

impl Subscriber {
    fn accepts(&self, update: &VesselUpdate) -> bool {
        self.filter
            .is_none_or(|bbox| bbox.contains(update.latitude, update.longitude))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of downstream subscribers for one pool.
pub struct SubscriptionRegistry {
    pool: Pool,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    external_sink: RwLock<Option<ExternalSink>>,
    updates_broadcast: AtomicU64,
    deliveries: AtomicU64,
    evictions: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry for `pool`.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            subscribers: RwLock::new(HashMap::new()),
            external_sink: RwLock::new(None),
            updates_broadcast: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Pool this registry serves.
    #[must_use]
    pub const fn pool(&self) -> Pool {
        self.pool
    }

    /// Register a subscriber with no filter (full feed).
    pub fn add_subscriber(&self, sink: Arc<dyn VesselSink>) -> SubscriberId {
        self.add_subscriber_with_filter(sink, None)
    }

    /// Register a subscriber whose filter is in place before its first
    /// delivery.
    pub fn add_subscriber_with_filter(
        &self,
        sink: Arc<dyn VesselSink>,
        filter: Option<BoundingBox>,
    ) -> SubscriberId {
        let id = SubscriberId::generate();
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, Subscriber { sink, filter });
            subscribers.len()
        };

        metrics::set_subscribers(self.pool, count);
        tracing::info!(
            pool = self.pool.as_str(),
            subscriber = %id,
            bbox = ?filter,
            total = count,
            "Subscriber added"
        );
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            metrics::set_subscribers(self.pool, count);
            tracing::info!(pool = self.pool.as_str(), subscriber = %id, total = count, "Subscriber removed");
        }
        removed
    }

    /// Replace a subscriber's filter; `None` means the full feed.
    ///
    /// Returns `false` if the subscriber is not registered.
    pub fn set_filter(&self, id: SubscriberId, filter: Option<BoundingBox>) -> bool {
        let mut subscribers = self.subscribers.write();
        match subscribers.get_mut(&id) {
            Some(subscriber) => {
                subscriber.filter = filter;
                true
            }
            None => false,
        }
    }

    /// Current filter of a subscriber, `None` if unfiltered or unknown.
    #[must_use]
    pub fn filter(&self, id: SubscriberId) -> Option<BoundingBox> {
        self.subscribers.read().get(&id).and_then(|s| s.filter)
    }

    /// Whether a subscriber is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Attach the external sink, replacing any previous one.
    pub fn set_external_sink(&self, sink: ExternalSink) {
        *self.external_sink.write() = Some(sink);
    }

    /// Detach the external sink.
    pub fn clear_external_sink(&self) {
        *self.external_sink.write() = None;
    }

    /// Fan an update out to every matching subscriber, then to the external
    /// sink.
    pub async fn broadcast(&self, update: Arc<VesselUpdate>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        let targets: Vec<(SubscriberId, Arc<dyn VesselSink>)> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .filter(|(_, subscriber)| {
                    let accepted = subscriber.accepts(&update);
                    if !accepted {
                        outcome.filtered += 1;
                    }
                    accepted
                })
                .map(|(id, subscriber)| (*id, Arc::clone(&subscriber.sink)))
                .collect()
        };

        let mut failed = Vec::new();
        for (id, sink) in targets {
            match sink.deliver(Arc::clone(&update)).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        pool = self.pool.as_str(),
                        subscriber = %id,
                        error = %e,
                        "Delivery failed, evicting subscriber"
                    );
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let count = {
                let mut subscribers = self.subscribers.write();
                for id in &failed {
                    if subscribers.remove(id).is_some() {
                        outcome.evicted += 1;
                    }
                }
                subscribers.len()
            };
            metrics::set_subscribers(self.pool, count);
            metrics::record_evictions(self.pool, outcome.evicted as u64);
            self.evictions
                .fetch_add(outcome.evicted as u64, Ordering::Relaxed);
        }

        self.updates_broadcast.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        metrics::record_broadcast(self.pool, outcome.delivered as u64);

        let external = self.external_sink.read().clone();
        if let Some(sink) = external {
            sink(update);
        }

        outcome
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let (subscribers, filtered_subscribers) = {
            let subscribers = self.subscribers.read();
            let filtered = subscribers.values().filter(|s| s.filter.is_some()).count();
            (subscribers.len(), filtered)
        };

        RegistryStats {
            pool: self.pool,
            subscribers,
            filtered_subscribers,
            updates_broadcast: self.updates_broadcast.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            has_external_sink: self.external_sink.read().is_some(),
        }
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("pool", &self.pool)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Channel Sink
// =============================================================================

/// Subscriber backed by a bounded queue drained by a connection writer.
///
/// Delivery never waits: a full queue is reported as
/// [`DeliveryError::QueueFull`], and the registry evicts the subscriber.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<VesselUpdate>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its consumer drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<VesselUpdate>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl VesselSink for ChannelSink {
    async fn deliver(&self, update: Arc<VesselUpdate>) -> Result<(), DeliveryError> {
        self.tx.try_send(update).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

// =============================================================================
// Pool Bridge
// =============================================================================

/// Build an external sink that forwards every update into `target`.
///
/// Updates cross a bounded channel of `capacity` and are broadcast by a
/// forwarding task, so the source pass never waits on the target pool.
/// When the channel is full the update is dropped for the target pool only.
/// The task ends once the returned sink is dropped.
///
/// Must be called from within a Tokio runtime.
pub fn bridge_sink(target: SharedRegistry, capacity: usize) -> (ExternalSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Arc<VesselUpdate>>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            target.broadcast(update).await;
        }
        tracing::debug!(pool = target.pool().as_str(), "Bridge closed");
    });

    let sink: ExternalSink = Arc::new(move |update| {
        if let Err(TrySendError::Full(update)) = tx.try_send(update) {
            tracing::warn!(mmsi = %update.mmsi, "Bridge queue full, dropping update");
        }
    });

    (sink, handle)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;

    use super::*;
    use crate::application::ports::MockVesselSink;
    use crate::domain::vessel::{Mmsi, ShipCategory};

    fn update_at(lat: f64, lon: f64) -> Arc<VesselUpdate> {
        Arc::new(VesselUpdate {
            mmsi: Mmsi::new("244660000").unwrap(),
            name: "NORDIC SPIRIT".to_string(),
            latitude: lat,
            longitude: lon,
            speed: 12.0,
            course: 90.0,
            heading: 90.0,
            ship_type: Some("Tanker (84)".to_string()),
            ship_category: ShipCategory::Tanker,
            destination: None,
            status: "Under way using engine".to_string(),
            timestamp: Utc::now(),
            is_ballast: false,
            is_anchored: false,
            is_stationary: false,
            draught: Some(12.0),
        })
    }

    fn accepting(times: usize) -> Arc<dyn VesselSink> {
        let mut mock = MockVesselSink::new();
        mock.expect_deliver().times(times).returning(|_| Ok(()));
        Arc::new(mock)
    }

    fn failing() -> Arc<dyn VesselSink> {
        let mut mock = MockVesselSink::new();
        mock.expect_deliver()
            .times(1)
            .returning(|_| Err(DeliveryError::Disconnected));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn delivers_to_every_unfiltered_subscriber() {
        let registry = SubscriptionRegistry::new(Pool::AisStream);
        registry.add_subscriber(accepting(1));
        registry.add_subscriber(accepting(1));

        let outcome = registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(
            outcome,
            BroadcastOutcome {
                delivered: 2,
                filtered: 0,
                evicted: 0
            }
        );
    }

    #[tokio::test]
    async fn region_filter_skips_outside_points() {
        let registry = SubscriptionRegistry::new(Pool::AisStream);
        let inside = registry.add_subscriber(accepting(1));
        let outside = registry.add_subscriber(accepting(0));

        assert!(registry.set_filter(inside, Some(BoundingBox::new(40.0, 27.0, 42.0, 30.0).unwrap())));
        assert!(registry.set_filter(outside, Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap())));

        let outcome = registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.filtered, 1);
        assert_eq!(registry.stats().filtered_subscribers, 2);
    }

    #[tokio::test]
    async fn filtered_registration_never_sees_outside_points() {
        let registry = SubscriptionRegistry::new(Pool::Vessels);
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let id = registry.add_subscriber_with_filter(accepting(0), Some(bbox));

        assert_eq!(registry.filter(id), Some(bbox));
        let outcome = registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.filtered, 1);
    }

    #[tokio::test]
    async fn failing_subscriber_is_evicted_after_pass() {
        let registry = SubscriptionRegistry::new(Pool::AisStream);
        registry.add_subscriber(accepting(2));
        let bad = registry.add_subscriber(failing());
        registry.add_subscriber(accepting(2));

        let outcome = registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.evicted, 1);
        assert!(!registry.contains(bad));
        assert_eq!(registry.subscriber_count(), 2);

        let outcome = registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.evicted, 0);
        assert_eq!(registry.stats().evictions, 1);
    }

    #[tokio::test]
    async fn external_sink_sees_every_update() {
        let registry = SubscriptionRegistry::new(Pool::AisStream);
        let outside = registry.add_subscriber(accepting(0));
        registry.set_filter(outside, Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        registry.set_external_sink(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.broadcast(update_at(41.0, 29.0)).await;
        registry.broadcast(update_at(-10.0, 100.0)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        registry.clear_external_sink();
        registry.broadcast(update_at(41.0, 29.0)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!registry.stats().has_external_sink);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriptionRegistry::new(Pool::Vessels);
        let id = registry.add_subscriber(accepting(0));

        assert!(registry.remove_subscriber(id));
        assert!(!registry.remove_subscriber(id));
        assert!(!registry.set_filter(id, None));
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn clearing_filter_restores_full_feed() {
        let registry = SubscriptionRegistry::new(Pool::AisStream);
        let id = registry.add_subscriber(accepting(0));
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();

        registry.set_filter(id, Some(bbox));
        assert_eq!(registry.filter(id), Some(bbox));

        registry.set_filter(id, None);
        assert_eq!(registry.filter(id), None);
    }

    #[tokio::test]
    async fn channel_sink_reports_full_and_closed() {
        let (sink, rx) = ChannelSink::new(1);
        assert!(sink.deliver(update_at(0.0, 0.0)).await.is_ok());
        assert_eq!(
            sink.deliver(update_at(0.0, 0.0)).await,
            Err(DeliveryError::QueueFull)
        );

        drop(rx);
        assert_eq!(
            sink.deliver(update_at(0.0, 0.0)).await,
            Err(DeliveryError::Disconnected)
        );
    }

    #[tokio::test]
    async fn bridge_forwards_into_target_pool() {
        let primary = SubscriptionRegistry::new(Pool::AisStream);
        let secondary = Arc::new(SubscriptionRegistry::new(Pool::Vessels));

        let (sink, mut rx) = ChannelSink::new(8);
        secondary.add_subscriber(Arc::new(sink));

        let (bridge, handle) = bridge_sink(Arc::clone(&secondary), 8);
        primary.set_external_sink(bridge);

        primary.broadcast(update_at(41.0, 29.0)).await;

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.latitude, 41.0);

        primary.clear_external_sink();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
