//! Item server
//!
//! Accepts TCP connections and serves the item routes over the framed
//! protocol in [`crate::protocol`].

pub mod config;
pub(crate) mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::ItemServer;
