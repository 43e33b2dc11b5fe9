//! Ingestion and monitor handlers
//!
//! Each ingestion mode persists first and publishes second. Publishing only
//! ever happens on the success path of the store call, so a monitor can never
//! observe an item the store did not accept, and a call cancelled while the
//! store is still working publishes nothing.
//!
//! | Mode             | Store call  | Publish             | Caller receives        |
//! |------------------|-------------|---------------------|------------------------|
//! | request-response | `save`      | after save          | saved item             |
//! | fire-and-forget  | `save`      | after save          | completion only        |
//! | request-stream   | `find_all`  | per item, on pull   | every stored item      |
//! | monitor          | none        | none                | live feed from the hub |

use std::sync::Arc;

use futures::{future, StreamExt, TryStreamExt};

use crate::hub::{BroadcastHub, ItemSubscription};
use crate::item::Item;
use crate::store::{ItemStore, ItemStream, StoreError};

/// Item handlers bound to one store and one shared hub
pub struct ItemService<S: ItemStore> {
    store: Arc<S>,
    hub: Arc<BroadcastHub>,
}

impl<S: ItemStore> ItemService<S> {
    pub fn new(store: S, hub: Arc<BroadcastHub>) -> Self {
        Self {
            store: Arc::new(store),
            hub,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Save an item and return the stored instance
    pub async fn request_response(&self, item: Item) -> Result<Item, StoreError> {
        let saved = require_id(self.store.save(item).await?)?;
        tracing::debug!(item_id = ?saved.id(), "request-response item saved");

        self.hub.publish(saved.clone());
        Ok(saved)
    }

    /// Save an item without returning it
    pub async fn fire_and_forget(&self, item: Item) -> Result<(), StoreError> {
        let saved = require_id(self.store.save(item).await?)?;
        tracing::debug!(item_id = ?saved.id(), "fire-and-forget item saved");

        self.hub.publish(saved);
        Ok(())
    }

    /// Stream every stored item, republishing each one as it is pulled
    ///
    /// Items are published lazily: nothing reaches the hub until the caller
    /// polls. The first error from the store is yielded and ends the stream.
    pub fn request_stream(&self) -> ItemStream {
        let hub = Arc::clone(&self.hub);
        tracing::debug!("request-stream started");

        let mut failed = false;
        self.store
            .find_all()
            .map(|result| result.and_then(require_id))
            .take_while(move |result| {
                let keep = !failed;
                failed |= result.is_err();
                future::ready(keep)
            })
            .inspect_ok(move |item| hub.publish(item.clone()))
            .boxed()
    }

    /// Subscribe to the live feed
    pub fn monitor(&self) -> ItemSubscription {
        self.hub.subscribe()
    }
}

/// Items leaving the store must carry an identifier before they reach the hub
fn require_id(item: Item) -> Result<Item, StoreError> {
    if item.is_persisted() {
        Ok(item)
    } else {
        tracing::warn!("Store returned an item without an id");
        Err(StoreError::Backend("stored item has no id".into()))
    }
}

impl<S: ItemStore> Clone for ItemService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hub: Arc::clone(&self.hub),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{stream, FutureExt};

    use super::*;
    use crate::item::ItemId;
    use crate::store::MemoryStore;

    /// Store whose every operation fails
    struct FailingStore;

    impl ItemStore for FailingStore {
        async fn save(&self, _item: Item) -> Result<Item, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        fn find_all(&self) -> ItemStream {
            stream::once(async { Err::<Item, _>(StoreError::Unavailable("down".into())) }).boxed()
        }
    }

    /// Store that yields one item, then fails
    struct FlakyStore;

    impl ItemStore for FlakyStore {
        async fn save(&self, item: Item) -> Result<Item, StoreError> {
            Ok(item.with_id(ItemId::generate()))
        }

        fn find_all(&self) -> ItemStream {
            stream::iter(vec![
                Ok(Item::new().with_id(ItemId::new("first"))),
                Err(StoreError::Backend("cursor lost".into())),
                Ok(Item::new().with_id(ItemId::new("never"))),
            ])
            .boxed()
        }
    }

    /// Store whose save never completes
    struct StalledStore;

    impl ItemStore for StalledStore {
        async fn save(&self, _item: Item) -> Result<Item, StoreError> {
            std::future::pending().await
        }

        fn find_all(&self) -> ItemStream {
            stream::pending::<Result<Item, StoreError>>().boxed()
        }
    }

    /// Store that accepts writes but never assigns an identifier
    struct IdlessStore;

    impl ItemStore for IdlessStore {
        async fn save(&self, item: Item) -> Result<Item, StoreError> {
            Ok(item)
        }

        fn find_all(&self) -> ItemStream {
            stream::iter(vec![Ok(Item::new().with_field("n", 1))]).boxed()
        }
    }

    fn memory_service() -> ItemService<MemoryStore> {
        ItemService::new(MemoryStore::new(), Arc::new(BroadcastHub::new()))
    }

    #[tokio::test]
    async fn test_request_response_saves_and_publishes() {
        let service = memory_service();
        let mut monitor = service.monitor();

        let saved = service
            .request_response(Item::new().with_field("name", "lamp"))
            .await
            .unwrap();

        let id = saved.id().expect("saved item has an id");
        assert_eq!(service.store().get(id).await, Some(saved.clone()));

        let observed = monitor.next().await.unwrap().unwrap();
        assert_eq!(observed, saved);
        assert!(monitor.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_fire_and_forget_publishes_once() {
        let service = memory_service();
        let mut monitor = service.monitor();

        service
            .fire_and_forget(Item::new().with_field("name", "chair"))
            .await
            .unwrap();

        assert_eq!(service.store().len().await, 1);

        let observed = monitor.next().await.unwrap().unwrap();
        assert_eq!(observed.field("name"), Some(&"chair".into()));
        assert!(observed.is_persisted());
        assert!(monitor.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_request_stream_returns_and_republishes() {
        let service = memory_service();
        let x = service.store().save(Item::new().with_field("n", "x")).await.unwrap();
        let y = service.store().save(Item::new().with_field("n", "y")).await.unwrap();

        let mut monitor = service.monitor();
        let returned: Vec<Item> = service.request_stream().try_collect().await.unwrap();
        assert_eq!(returned, vec![x.clone(), y.clone()]);

        assert_eq!(monitor.next().await.unwrap().unwrap(), x);
        assert_eq!(monitor.next().await.unwrap().unwrap(), y);
        assert!(monitor.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_request_stream_publishes_only_when_polled() {
        let service = memory_service();
        service.store().save(Item::new()).await.unwrap();
        let _monitor = service.monitor();

        let stream = service.request_stream();
        drop(stream);

        assert_eq!(service.hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_publishes_nothing() {
        let service = ItemService::new(FailingStore, Arc::new(BroadcastHub::new()));
        let _monitor = service.monitor();

        let err = service.request_response(Item::new()).await.unwrap_err();
        assert_eq!(err, StoreError::Unavailable("down".into()));

        assert!(service.fire_and_forget(Item::new()).await.is_err());

        let results: Vec<_> = service.request_stream().collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());

        assert_eq!(service.hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_item_without_id_is_never_published() {
        let service = ItemService::new(IdlessStore, Arc::new(BroadcastHub::new()));
        let _monitor = service.monitor();

        let err = service
            .request_response(Item::new().with_field("name", "lamp"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        let err = service.fire_and_forget(Item::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        let results: Vec<_> = service.request_stream().collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(StoreError::Backend(_))));

        assert_eq!(service.hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_request_stream_error_ends_stream() {
        let service = ItemService::new(FlakyStore, Arc::new(BroadcastHub::new()));
        let mut monitor = service.monitor();

        let mut stream = service.request_stream();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.id(), Some(&ItemId::new("first")));
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());

        // Items fetched before the failure were already published
        assert_eq!(monitor.next().await.unwrap().unwrap(), first);
        assert_eq!(service.hub().stats().published, 1);
    }

    #[tokio::test]
    async fn test_cancelled_save_publishes_nothing() {
        let service = ItemService::new(StalledStore, Arc::new(BroadcastHub::new()));
        let _monitor = service.monitor();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            service.request_response(Item::new()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(service.hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_clones_share_hub() {
        let service = memory_service();
        let clone = service.clone();
        let mut monitor = service.monitor();

        clone.fire_and_forget(Item::new()).await.unwrap();
        assert!(monitor.next().await.unwrap().is_ok());
        assert_eq!(service.store().len().await, 1);
    }
}
