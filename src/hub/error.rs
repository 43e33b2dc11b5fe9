//! Subscription error types

use thiserror::Error;

/// Error yielded by a monitor subscription
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The subscriber fell behind the ring buffer and was disconnected
    #[error("subscriber overflow: {missed} items missed")]
    Overflow { missed: u64 },
}
