//! Route dispatcher

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};

use super::error::DispatchError;
use super::route::Route;
use crate::item::Item;
use crate::protocol::InteractionModel;
use crate::service::ItemService;
use crate::store::ItemStore;

/// Stream of items produced by a routed request
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<Item, DispatchError>> + Send>>;

/// Outcome of a routed request
pub enum Reply {
    /// Exactly one item
    Single(Item),
    /// Zero or more items, possibly unbounded
    Stream(ReplyStream),
    /// Completion without payload
    Empty,
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Single(item) => f.debug_tuple("Single").field(item).finish(),
            Reply::Stream(_) => f.write_str("Stream(..)"),
            Reply::Empty => f.write_str("Empty"),
        }
    }
}

/// Maps route names onto the item handlers
pub struct Router<S: ItemStore> {
    service: ItemService<S>,
}

impl<S: ItemStore> Router<S> {
    pub fn new(service: ItemService<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ItemService<S> {
        &self.service
    }

    /// Resolve `route` and run its handler
    ///
    /// Ingestion payloads are validated before the store is touched; a
    /// malformed item never reaches storage or the hub. Stream routes ignore
    /// their payload.
    pub async fn dispatch(
        &self,
        interaction: InteractionModel,
        route: &str,
        payload: Bytes,
    ) -> Result<Reply, DispatchError> {
        let route: Route = route.parse()?;
        if route.interaction() != interaction {
            return Err(DispatchError::InteractionMismatch {
                route,
                expected: route.interaction(),
                actual: interaction,
            });
        }

        tracing::debug!(route = %route, payload_len = payload.len(), "Dispatching request");

        match route {
            Route::RequestResponse => {
                let item = Item::from_slice(&payload)?;
                let saved = self.service.request_response(item).await?;
                Ok(Reply::Single(saved))
            }
            Route::FireAndForget => {
                let item = Item::from_slice(&payload)?;
                self.service.fire_and_forget(item).await?;
                Ok(Reply::Empty)
            }
            Route::RequestStream => Ok(Reply::Stream(
                self.service
                    .request_stream()
                    .map_err(DispatchError::from)
                    .boxed(),
            )),
            Route::Monitor => Ok(Reply::Stream(
                self.service
                    .monitor()
                    .map_err(DispatchError::from)
                    .boxed(),
            )),
        }
    }
}

impl<S: ItemStore> Clone for Router<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;
    use crate::hub::BroadcastHub;
    use crate::protocol::ErrorCode;
    use crate::store::{ItemStream, MemoryStore, StoreError};

    /// Store that rejects every operation
    struct RejectingStore;

    impl ItemStore for RejectingStore {
        async fn save(&self, _item: Item) -> Result<Item, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }

        fn find_all(&self) -> ItemStream {
            futures::stream::iter(vec![Err(StoreError::Unavailable("disk full".into()))]).boxed()
        }
    }

    fn router() -> Router<MemoryStore> {
        Router::new(ItemService::new(
            MemoryStore::new(),
            Arc::new(BroadcastHub::new()),
        ))
    }

    #[tokio::test]
    async fn test_request_response_route() {
        let router = router();
        let reply = router
            .dispatch(
                InteractionModel::RequestResponse,
                "newItems.request-response",
                Bytes::from_static(br#"{"name":"lamp"}"#),
            )
            .await
            .unwrap();

        match reply {
            Reply::Single(item) => {
                assert!(item.is_persisted());
                assert_eq!(item.field("name"), Some(&"lamp".into()));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fire_and_forget_route() {
        let router = router();
        let reply = router
            .dispatch(
                InteractionModel::FireAndForget,
                "newItems.fire-and-forget",
                Bytes::from_static(br#"{"name":"chair"}"#),
            )
            .await
            .unwrap();

        assert!(matches!(reply, Reply::Empty));
        assert_eq!(router.service().store().len().await, 1);
    }

    #[tokio::test]
    async fn test_monitor_route_sees_later_saves() {
        let router = router();
        let reply = router
            .dispatch(InteractionModel::RequestStream, "newItems.monitor", Bytes::new())
            .await
            .unwrap();
        let Reply::Stream(mut feed) = reply else {
            panic!("monitor must reply with a stream");
        };

        assert!(feed.next().now_or_never().is_none());

        router
            .dispatch(
                InteractionModel::FireAndForget,
                "newItems.fire-and-forget",
                Bytes::from_static(br#"{"n":1}"#),
            )
            .await
            .unwrap();

        let item = feed.next().await.unwrap().unwrap();
        assert_eq!(item.field("n"), Some(&1.into()));
    }

    #[tokio::test]
    async fn test_request_stream_route() {
        let router = router();
        router
            .service()
            .store()
            .save(Item::new().with_field("n", "x"))
            .await
            .unwrap();

        let reply = router
            .dispatch(
                InteractionModel::RequestStream,
                "newItems.request-stream",
                Bytes::new(),
            )
            .await
            .unwrap();
        let Reply::Stream(stream) = reply else {
            panic!("request-stream must reply with a stream");
        };

        let items: Vec<Item> = stream.try_collect().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_store() {
        let router = router();
        let _monitor = router.service().monitor();

        let err = router
            .dispatch(
                InteractionModel::RequestResponse,
                "newItems.request-response",
                Bytes::from_static(b"not json"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Malformed(_)));
        assert!(router.service().store().is_empty().await);
        assert_eq!(router.service().hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_reaches_caller_unpublished() {
        let router = Router::new(ItemService::new(
            RejectingStore,
            Arc::new(BroadcastHub::new()),
        ));
        let _monitor = router.service().monitor();

        let err = router
            .dispatch(
                InteractionModel::RequestResponse,
                "newItems.request-response",
                Bytes::from_static(br#"{"name":"lamp"}"#),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Storage(_)));
        assert_eq!(err.error_code(), ErrorCode::ApplicationError);

        let err = router
            .dispatch(
                InteractionModel::FireAndForget,
                "newItems.fire-and-forget",
                Bytes::from_static(br#"{"name":"lamp"}"#),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ApplicationError);

        let Reply::Stream(mut stream) = router
            .dispatch(
                InteractionModel::RequestStream,
                "newItems.request-stream",
                Bytes::new(),
            )
            .await
            .unwrap()
        else {
            panic!("request-stream must reply with a stream");
        };
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ApplicationError);
        assert!(stream.next().await.is_none());

        assert_eq!(router.service().hub().stats().published, 0);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let err = router()
            .dispatch(InteractionModel::RequestStream, "items.monitor", Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::UnknownRoute(route) if route == "items.monitor"));
    }

    #[tokio::test]
    async fn test_interaction_mismatch() {
        let router = router();
        let err = router
            .dispatch(
                InteractionModel::RequestResponse,
                "newItems.monitor",
                Bytes::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::InteractionMismatch {
                route: Route::Monitor,
                ..
            }
        ));
        assert_eq!(router.service().hub().subscriber_count(), 0);
    }
}
