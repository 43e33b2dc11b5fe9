//! Live item broadcast hub
//!
//! The hub is the single fan-out point between the ingestion routes and the
//! monitors. It wraps a `tokio::sync::broadcast` channel: every publish is
//! appended once to a bounded ring buffer and every subscription reads it
//! through its own cursor.
//!
//! # Architecture
//!
//! ```text
//!    [request-response]  [fire-and-forget]  [request-stream]
//!            │                   │                  │
//!            └──── store.save ───┴── store.find_all ┘
//!                                │
//!                                ▼
//!                       Arc<BroadcastHub>
//!                  ┌──────────────────────────┐
//!                  │ tx: broadcast::Sender    │
//!                  │ ring buffer (capacity)   │
//!                  └────────────┬─────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         ▼                     ▼                     ▼
//!    [Monitor]             [Monitor]             [Monitor]
//!    sub.next()            sub.next()            sub.next()
//! ```
//!
//! # Backpressure
//!
//! `publish` never waits on subscribers. A subscriber that falls more than
//! `capacity` items behind has lost data; [`LagPolicy`] decides whether it is
//! disconnected with [`MonitorError::Overflow`] or skips ahead.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod subscription;

pub use broadcast::BroadcastHub;
pub use config::{HubConfig, LagPolicy};
pub use error::MonitorError;
pub use subscription::ItemSubscription;
