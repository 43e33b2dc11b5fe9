//! Item client implementation
//!
//! Connects to an [`ItemServer`](crate::server::ItemServer) and exposes the
//! four item routes as async methods and streams.

pub mod config;
pub mod connector;

pub use config::ClientConfig;
pub use connector::{ItemClient, ResponseStream};
