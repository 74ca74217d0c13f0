//! Proxy Controller
//!
//! Top-level state holder tying the upstream client, the static cache and
//! the primary subscriber registry together behind a start/stop lifecycle.
//!
//! Constructed explicitly and shared as `Arc<ProxyController>`; there is no
//! global instance.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::aisstream::{AisStreamClient, AisStreamConfig, FeedState, MessageNormalizer};
use super::broadcast::{ExternalSink, SharedRegistry, SubscriptionRegistry};
use super::metrics::Pool;
use crate::domain::static_data::StaticDataCache;

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Lifecycle controller for the upstream feed.
pub struct ProxyController {
    client: Arc<AisStreamClient>,
    registry: SharedRegistry,
    cache: Arc<StaticDataCache>,
    state: Arc<FeedState>,
    task: Mutex<Option<RunningTask>>,
}

impl ProxyController {
    /// Build a controller with a fresh cache and primary registry.
    #[must_use]
    pub fn new(config: AisStreamConfig) -> Self {
        let cache = Arc::new(StaticDataCache::new());
        let registry = Arc::new(SubscriptionRegistry::new(Pool::AisStream));
        let state = Arc::new(FeedState::new());
        let client = Arc::new(AisStreamClient::new(
            config,
            MessageNormalizer::new(Arc::clone(&cache)),
            Arc::clone(&registry),
            Arc::clone(&state),
        ));

        Self {
            client,
            registry,
            cache,
            state,
            task: Mutex::new(None),
        }
    }

    /// Start the upstream loop on the current Tokio runtime.
    ///
    /// Returns `false` without side effects if already running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::warn!("Proxy already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.client).run(cancel.clone()));
        *task = Some(RunningTask { cancel, handle });

        tracing::info!("Proxy started");
        true
    }

    /// Stop the upstream loop and wait for it to finish.
    ///
    /// Subscribers stay registered and simply receive nothing until the
    /// next `start`.
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        let Some(RunningTask { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Proxy task ended abnormally");
        }
        tracing::info!("Proxy stopped");
    }

    /// Whether the upstream loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Attach the external sink to the primary registry.
    pub fn set_external_sink(&self, sink: ExternalSink) {
        self.registry.set_external_sink(sink);
    }

    /// Detach the external sink.
    pub fn clear_external_sink(&self) {
        self.registry.clear_external_sink();
    }

    /// Primary subscriber registry.
    #[must_use]
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Static-data cache.
    #[must_use]
    pub fn cache(&self) -> Arc<StaticDataCache> {
        Arc::clone(&self.cache)
    }

    /// Upstream feed state.
    #[must_use]
    pub fn feed_state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }
}

impl std::fmt::Debug for ProxyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyController")
            .field("running", &self.is_running())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
