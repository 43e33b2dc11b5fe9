//! Monitor subscriptions
//!
//! [`ItemSubscription`] adapts a broadcast receiver into a
//! `Stream<Item = Result<Item, MonitorError>>`. It relies on
//! [`BroadcastStream`] for wakeups, so a pending subscription costs nothing
//! until the next publish.
//!
//! Dropping or cancelling the subscription drops the receiver, which removes
//! it from the hub's active set immediately.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast::Receiver;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::config::LagPolicy;
use super::error::MonitorError;
use crate::item::Item;
use crate::stats::HubCounters;

/// Live, non-restartable feed of items published after subscription
pub struct ItemSubscription {
    id: u64,
    /// `None` once cancelled or disconnected
    inner: Option<BroadcastStream<Item>>,
    lag_policy: LagPolicy,
    counters: Arc<HubCounters>,
}

impl ItemSubscription {
    pub(super) fn new(
        id: u64,
        rx: Receiver<Item>,
        lag_policy: LagPolicy,
        counters: Arc<HubCounters>,
    ) -> Self {
        Self {
            id,
            inner: Some(BroadcastStream::new(rx)),
            lag_policy,
            counters,
        }
    }

    /// Subscription ID, unique per hub
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the subscription has ended
    pub fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }

    /// Unregister from the hub; subsequent polls return `None`
    pub fn cancel(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(subscription_id = self.id, "Subscriber cancelled");
        }
    }
}

impl Stream for ItemSubscription {
    type Item = Result<Item, MonitorError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // All fields are Unpin
        let this = self.get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_next(cx) {
                Poll::Ready(Some(Ok(item))) => return Poll::Ready(Some(Ok(item))),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    this.counters.overflowed.fetch_add(1, Ordering::Relaxed);

                    match this.lag_policy {
                        LagPolicy::Skip => {
                            tracing::warn!(
                                subscription_id = this.id,
                                missed = missed,
                                "Subscriber lagged, skipping missed items"
                            );
                        }
                        LagPolicy::Disconnect => {
                            tracing::warn!(
                                subscription_id = this.id,
                                missed = missed,
                                "Subscriber overflowed, disconnecting"
                            );
                            this.inner = None;
                            return Poll::Ready(Some(Err(MonitorError::Overflow { missed })));
                        }
                    }
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for ItemSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemSubscription")
            .field("id", &self.id)
            .field("terminated", &self.is_terminated())
            .field("lag_policy", &self.lag_policy)
            .finish()
    }
}
