//! Hub configuration

/// Default ring buffer capacity (items)
pub const DEFAULT_CAPACITY: usize = 1024;

/// Upper bound accepted by `tokio::sync::broadcast`
pub const MAX_CAPACITY: usize = 1 << 20;

/// What a subscription does when it has fallen behind the ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LagPolicy {
    /// Yield one overflow error, then end the subscription
    #[default]
    Disconnect,
    /// Log the gap and continue from the oldest retained item
    Skip,
}

/// Broadcast hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Ring buffer capacity shared by all subscribers
    pub capacity: usize,

    /// Behaviour for subscribers that cannot keep up
    pub lag_policy: LagPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            lag_policy: LagPolicy::default(),
        }
    }
}

impl HubConfig {
    /// Set ring buffer capacity, clamped to `1..=MAX_CAPACITY`
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.clamp(1, MAX_CAPACITY);
        self
    }

    /// Set lag policy
    pub fn lag_policy(mut self, policy: LagPolicy) -> Self {
        self.lag_policy = policy;
        self
    }
}
