//! Persist-then-broadcast item service
//!
//! Items arrive over three ingestion routes, are saved to an [`ItemStore`],
//! and are then published once to a [`BroadcastHub`]. Any number of monitors
//! subscribe to the hub and receive every item published after they joined,
//! in publish order.
//!
//! | Route                       | Interaction      | Reply                 |
//! |-----------------------------|------------------|-----------------------|
//! | `newItems.request-response` | request-response | stored item           |
//! | `newItems.fire-and-forget`  | fire-and-forget  | none                  |
//! | `newItems.request-stream`   | request-stream   | every stored item     |
//! | `newItems.monitor`          | request-stream   | live feed, unbounded  |
//!
//! # Example
//!
//! ```no_run
//! use itemcast::{ItemServer, MemoryStore, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> itemcast::Result<()> {
//!     let server = ItemServer::new(ServerConfig::default(), MemoryStore::new());
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod error;
pub mod hub;
pub mod item;
pub mod protocol;
pub mod router;
pub mod server;
pub mod service;
pub mod stats;
pub mod store;

pub use client::{ClientConfig, ItemClient};
pub use error::{Error, Result};
pub use hub::{BroadcastHub, HubConfig, LagPolicy};
pub use item::{Item, ItemId};
pub use router::Route;
pub use server::{ItemServer, ServerConfig};
pub use service::ItemService;
pub use store::{ItemStore, MemoryStore};
