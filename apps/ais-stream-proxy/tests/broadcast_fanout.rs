//! Fan-out Integration Tests
//!
//! Exercises the registry through its public API with real sinks: region
//! filtering, eviction of failing subscribers, the external sink, and the
//! bridge into the second pool.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::timeout;

use ais_stream_proxy::{
    BoundingBox, ChannelSink, DeliveryError, MetricsPool, Mmsi, ShipCategory,
    SubscriptionRegistry, VesselSink, VesselUpdate, bridge_sink,
};

fn update_at(mmsi: u64, latitude: f64, longitude: f64) -> Arc<VesselUpdate> {
    Arc::new(VesselUpdate {
        mmsi: Mmsi::from(mmsi),
        name: format!("Vessel {mmsi}"),
        latitude,
        longitude,
        speed: 11.0,
        course: 45.0,
        heading: 44.0,
        ship_type: Some("Cargo (70)".to_string()),
        ship_category: ShipCategory::Cargo,
        destination: Some("ISTANBUL".to_string()),
        status: "Under way using engine".to_string(),
        timestamp: Utc::now(),
        is_ballast: false,
        is_anchored: false,
        is_stationary: false,
        draught: Some(9.0),
    })
}

/// Records every delivery in order, tagged with its own label.
struct RecordingSink {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl VesselSink for RecordingSink {
    async fn deliver(&self, update: Arc<VesselUpdate>) -> Result<(), DeliveryError> {
        self.log.lock().push(format!("{}:{}", self.label, update.mmsi));
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl VesselSink for BrokenSink {
    async fn deliver(&self, _update: Arc<VesselUpdate>) -> Result<(), DeliveryError> {
        Err(DeliveryError::Transport("connection reset".to_string()))
    }
}

#[tokio::test]
async fn region_filter_selects_subscribers() {
    let registry = SubscriptionRegistry::new(MetricsPool::AisStream);
    let (bosphorus_sink, mut bosphorus) = ChannelSink::new(8);
    let (gulf_sink, mut gulf) = ChannelSink::new(8);

    let bosphorus_id = registry.add_subscriber(Arc::new(bosphorus_sink));
    let gulf_id = registry.add_subscriber(Arc::new(gulf_sink));
    registry.set_filter(bosphorus_id, Some("40,27,42,30".parse().unwrap()));
    registry.set_filter(gulf_id, Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()));

    let outcome = registry.broadcast(update_at(1, 41.0, 29.0)).await;

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.filtered, 1);
    assert_eq!(bosphorus.try_recv().unwrap().mmsi.as_str(), "1");
    assert!(gulf.try_recv().is_err());
}

#[tokio::test]
async fn failing_subscriber_is_evicted_without_affecting_others() {
    let registry = SubscriptionRegistry::new(MetricsPool::AisStream);
    let log = Arc::new(Mutex::new(Vec::new()));

    registry.add_subscriber(Arc::new(RecordingSink {
        label: "a",
        log: Arc::clone(&log),
    }));
    let broken = registry.add_subscriber(Arc::new(BrokenSink));
    registry.add_subscriber(Arc::new(RecordingSink {
        label: "c",
        log: Arc::clone(&log),
    }));

    let outcome = registry.broadcast(update_at(7, 10.0, 10.0)).await;
    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.evicted, 1);
    assert!(!registry.contains(broken));
    assert_eq!(registry.subscriber_count(), 2);

    let outcome = registry.broadcast(update_at(8, 10.0, 10.0)).await;
    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.evicted, 0);
    assert_eq!(log.lock().len(), 4);

    let stats = registry.stats();
    assert_eq!(stats.updates_broadcast, 2);
    assert_eq!(stats.deliveries, 4);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn external_sink_runs_after_subscribers_and_ignores_filters() {
    let registry = SubscriptionRegistry::new(MetricsPool::AisStream);
    let log = Arc::new(Mutex::new(Vec::new()));

    let id = registry.add_subscriber(Arc::new(RecordingSink {
        label: "sub",
        log: Arc::clone(&log),
    }));
    registry.set_filter(id, Some("0,0,1,1".parse().unwrap()));

    let external_log = Arc::clone(&log);
    registry.set_external_sink(Arc::new(move |update: Arc<VesselUpdate>| {
        external_log.lock().push(format!("ext:{}", update.mmsi));
    }));

    registry.broadcast(update_at(1, 0.5, 0.5)).await;
    registry.broadcast(update_at(2, 50.0, 50.0)).await;

    assert_eq!(*log.lock(), vec!["sub:1", "ext:1", "ext:2"]);
}

#[tokio::test]
async fn updates_keep_upstream_order_per_subscriber() {
    let registry = SubscriptionRegistry::new(MetricsPool::AisStream);
    let (sink, mut rx) = ChannelSink::new(64);
    registry.add_subscriber(Arc::new(sink));

    for mmsi in 1..=20 {
        registry.broadcast(update_at(mmsi, 0.0, 0.0)).await;
    }

    let mut received = Vec::new();
    rx.recv_many(&mut received, 64).await;
    let order: Vec<String> = received.iter().map(|u| u.mmsi.to_string()).collect();
    let expected: Vec<String> = (1..=20).map(|n: u64| n.to_string()).collect();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn slow_consumer_is_evicted_when_queue_fills() {
    let registry = SubscriptionRegistry::new(MetricsPool::AisStream);
    let (slow_sink, _slow_rx) = ChannelSink::new(2);
    let (fast_sink, mut fast_rx) = ChannelSink::new(16);
    let slow = registry.add_subscriber(Arc::new(slow_sink));
    registry.add_subscriber(Arc::new(fast_sink));

    for mmsi in 1..=3 {
        registry.broadcast(update_at(mmsi, 0.0, 0.0)).await;
    }

    assert!(!registry.contains(slow));
    let mut received = Vec::new();
    fast_rx.recv_many(&mut received, 16).await;
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn bridge_feeds_second_pool_with_its_own_filters() {
    let primary = SubscriptionRegistry::new(MetricsPool::AisStream);
    let vessels = Arc::new(SubscriptionRegistry::new(MetricsPool::Vessels));

    let (inside_sink, mut inside) = ChannelSink::new(8);
    let (outside_sink, mut outside) = ChannelSink::new(8);
    let inside_id = vessels.add_subscriber(Arc::new(inside_sink));
    let outside_id = vessels.add_subscriber(Arc::new(outside_sink));
    vessels.set_filter(inside_id, Some("40,27,42,30".parse().unwrap()));
    vessels.set_filter(outside_id, Some("0,0,1,1".parse().unwrap()));

    let (sink, task) = bridge_sink(Arc::clone(&vessels), 16);
    primary.set_external_sink(sink);

    // No subscriber in the primary pool; the bridge still forwards.
    let outcome = primary.broadcast(update_at(42, 41.0, 29.0)).await;
    assert_eq!(outcome.delivered, 0);

    let forwarded = timeout(Duration::from_secs(2), inside.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forwarded.mmsi.as_str(), "42");
    assert!(outside.try_recv().is_err());

    primary.clear_external_sink();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_is_consistent_under_subscriber_churn() {
    const UPDATES: u64 = 500;

    let registry = Arc::new(SubscriptionRegistry::new(MetricsPool::AisStream));
    let (steady_sink, mut steady) = ChannelSink::new(UPDATES as usize);
    let steady_id = registry.add_subscriber(Arc::new(steady_sink));

    let churners: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let log = Arc::new(Mutex::new(Vec::new()));
                for round in 0..200 {
                    let id = registry.add_subscriber(Arc::new(RecordingSink {
                        label: "churn",
                        log: Arc::clone(&log),
                    }));
                    if round % 2 == 0 {
                        registry.set_filter(id, Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()));
                    }
                    tokio::task::yield_now().await;
                    assert!(registry.remove_subscriber(id));
                }
            })
        })
        .collect();

    let broadcaster = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for mmsi in 1..=UPDATES {
                registry.broadcast(update_at(mmsi, 41.0, 29.0)).await;
            }
        })
    };

    for churner in churners {
        churner.await.unwrap();
    }
    broadcaster.await.unwrap();

    let received: Vec<String> = std::iter::from_fn(|| steady.try_recv().ok())
        .map(|update| update.mmsi.as_str().to_string())
        .collect();
    let expected: Vec<String> = (1..=UPDATES).map(|mmsi| mmsi.to_string()).collect();
    assert_eq!(received, expected);

    let stats = registry.stats();
    assert_eq!(stats.subscribers, 1);
    assert!(registry.contains(steady_id));
    assert_eq!(stats.updates_broadcast, UPDATES);
    assert_eq!(stats.evictions, 0);
}
