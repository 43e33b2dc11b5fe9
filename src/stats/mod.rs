//! Statistics and metrics

pub mod metrics;

pub(crate) use metrics::{HubCounters, ServerCounters};
pub use metrics::{HubStats, ServerStats};
