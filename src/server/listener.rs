//! Item server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::hub::{BroadcastHub, HubConfig};
use crate::router::Router;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::service::ItemService;
use crate::stats::{ServerCounters, ServerStats};
use crate::store::ItemStore;

/// Item server
pub struct ItemServer<S: ItemStore> {
    config: ServerConfig,
    router: Router<S>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<ServerCounters>,
}

impl<S: ItemStore> ItemServer<S> {
    /// Create a new server with the given configuration and store
    pub fn new(config: ServerConfig, store: S) -> Self {
        Self::with_hub_config(config, store, HubConfig::default())
    }

    /// Create a new server with custom hub configuration
    pub fn with_hub_config(config: ServerConfig, store: S, hub_config: HubConfig) -> Self {
        let hub = Arc::new(BroadcastHub::with_config(hub_config));
        Self::with_service(config, ItemService::new(store, hub))
    }

    /// Create a server around an existing service, sharing its hub
    pub fn with_service(config: ServerConfig, service: ItemService<S>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            router: Router::new(service),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            counters: Arc::new(ServerCounters::new()),
        }
    }

    /// Get the item service backing this server
    pub fn service(&self) -> &ItemService<S> {
        self.router.service()
    }

    /// Get a reference to the broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        self.router.service().hub()
    }

    /// Snapshot of server statistics
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), "Item server listening");
        self.accept_loop(&listener).await
    }

    /// Serve connections from an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), "Item server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        // Generate session ID
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let router = self.router.clone();
        let counters = Arc::clone(&self.counters);

        counters.total_connections.fetch_add(1, Ordering::Relaxed);
        counters.active_connections.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(
                session_id,
                socket,
                peer_addr,
                config,
                router,
                Arc::clone(&counters),
            );

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            counters.active_connections.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::client::{ClientConfig, ItemClient};
    use crate::error::Error;
    use crate::item::Item;
    use crate::store::MemoryStore;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_run_until_returns_on_shutdown() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let server = ItemServer::new(config, MemoryStore::new());

        let result = tokio::time::timeout(Duration::from_secs(5), server.run_until(async {})).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ItemServer::new(
            ServerConfig::with_addr(addr).max_connections(1),
            MemoryStore::new(),
        ));

        let serving = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = serving.serve(listener).await;
        });

        let first = ItemClient::connect(ClientConfig::new(addr)).await.unwrap();
        wait_until(|| server.stats().active_connections == 1).await;

        let second = ItemClient::connect(ClientConfig::new(addr)).await.unwrap();
        let err = second
            .request_response(&Item::new().with_field("n", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        let saved = first
            .request_response(&Item::new().with_field("n", 1))
            .await
            .unwrap();
        assert!(saved.is_persisted());
        assert_eq!(server.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_shared_service_sees_network_items() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ItemServer::new(
            ServerConfig::with_addr(addr),
            MemoryStore::new(),
        ));
        let mut local_monitor = server.service().monitor();

        let serving = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = serving.serve(listener).await;
        });

        let client = ItemClient::connect(ClientConfig::new(addr)).await.unwrap();
        client
            .fire_and_forget(&Item::new().with_field("name", "desk"))
            .await
            .unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), local_monitor.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(seen.field("name"), Some(&"desk".into()));
        assert!(server.stats().requests >= 1);
    }
}
