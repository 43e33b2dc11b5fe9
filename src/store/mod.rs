//! Storage gateway
//!
//! The service never persists anything itself; it talks to an [`ItemStore`].
//! Implementations may be backed by anything asynchronous. Retry policy, if
//! any, belongs to the implementation.
//!
//! [`MemoryStore`] is the in-process implementation used by the demo server
//! and the tests.

pub mod memory;

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use thiserror::Error;

use crate::item::Item;

pub use memory::MemoryStore;

/// Sequence of stored items, possibly terminated by an error
pub type ItemStream = Pin<Box<dyn Stream<Item = Result<Item, StoreError>> + Send>>;

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed the operation
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Asynchronous item store
pub trait ItemStore: Send + Sync + 'static {
    /// Persist an item, returning the stored instance with its identifier
    fn save(&self, item: Item) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Lazily read every stored item in the store's iteration order
    fn find_all(&self) -> ItemStream;
}
