//! Statistics for the broadcast hub and the server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hub-level counters, shared between the hub and its subscriptions
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    pub published: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped_unobserved: AtomicU64,
    pub overflowed: AtomicU64,
}

impl HubCounters {
    pub fn snapshot(&self, subscribers: usize) -> HubStats {
        HubStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_unobserved: self.dropped_unobserved.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            subscribers,
        }
    }
}

/// Point-in-time hub statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Total `publish` calls
    pub published: u64,
    /// Sum of subscriber counts at each publish
    pub delivered: u64,
    /// Publishes that happened with no subscriber registered
    pub dropped_unobserved: u64,
    /// Lag events across all subscriptions
    pub overflowed: u64,
    /// Currently registered subscribers
    pub subscribers: usize,
}

/// Server-wide counters
#[derive(Debug)]
pub(crate) struct ServerCounters {
    pub started_at: Instant,
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub requests: AtomicU64,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Total requests dispatched
    pub requests: u64,
    /// Uptime
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_counters_snapshot() {
        let counters = HubCounters::default();
        counters.published.fetch_add(3, Ordering::Relaxed);
        counters.delivered.fetch_add(6, Ordering::Relaxed);
        counters.dropped_unobserved.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot(2);
        assert_eq!(stats.published, 3);
        assert_eq!(stats.delivered, 6);
        assert_eq!(stats.dropped_unobserved, 1);
        assert_eq!(stats.overflowed, 0);
        assert_eq!(stats.subscribers, 2);
    }

    #[test]
    fn test_server_counters_new() {
        let stats = ServerCounters::new().snapshot();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.requests, 0);
    }
}
