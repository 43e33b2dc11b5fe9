//! Broadcast hub implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::config::{HubConfig, MAX_CAPACITY};
use super::subscription::ItemSubscription;
use crate::item::Item;
use crate::stats::{HubCounters, HubStats};

/// Multicast hub for persisted items
///
/// Construct once and share as `Arc<BroadcastHub>` between every ingestion
/// and monitor handler. All synchronization is internal to the underlying
/// broadcast channel, so `publish` and `subscribe` take `&self`.
pub struct BroadcastHub {
    /// Broadcast sender; every subscription holds a receiver cloned from it
    tx: broadcast::Sender<Item>,

    /// Configuration
    config: HubConfig,

    /// Counters shared with live subscriptions
    counters: Arc<HubCounters>,

    next_subscription_id: AtomicU64,
}

impl BroadcastHub {
    /// Create a new hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration
    ///
    /// The capacity is clamped to `1..=MAX_CAPACITY`.
    pub fn with_config(mut config: HubConfig) -> Self {
        config.capacity = config.capacity.clamp(1, MAX_CAPACITY);
        let (tx, _) = broadcast::channel(config.capacity);

        Self {
            tx,
            config,
            counters: Arc::new(HubCounters::default()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Publish an item to every current subscriber
    ///
    /// Never blocks and never fails. With no subscriber registered the item
    /// is dropped; it is not retained for later subscribers.
    pub fn publish(&self, item: Item) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let id = item.id().cloned();
        match self.tx.send(item) {
            Ok(receivers) => {
                self.counters
                    .delivered
                    .fetch_add(receivers as u64, Ordering::Relaxed);
                tracing::debug!(item_id = ?id, subscribers = receivers, "Item published");
            }
            Err(_) => {
                self.counters
                    .dropped_unobserved
                    .fetch_add(1, Ordering::Relaxed);
                tracing::trace!(item_id = ?id, "Item published with no subscribers");
            }
        }
    }

    /// Subscribe to items published from now on
    ///
    /// Dropping the returned subscription unregisters it.
    pub fn subscribe(&self) -> ItemSubscription {
        let rx = self.tx.subscribe();
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            subscription_id = id,
            subscribers = self.tx.receiver_count(),
            "Subscriber added"
        );

        ItemSubscription::new(id, rx, self.config.lag_policy, Arc::clone(&self.counters))
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Snapshot of hub statistics
    pub fn stats(&self) -> HubStats {
        self.counters.snapshot(self.subscriber_count())
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
