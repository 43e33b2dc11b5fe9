//! In-memory item store

use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::sync::RwLock;

use super::{ItemStore, ItemStream, StoreError};
use crate::item::{Item, ItemId};

#[derive(Debug, Default)]
struct Records {
    /// Items in insertion order
    items: Vec<Item>,
    /// Position of each id in `items`
    index: HashMap<ItemId, usize>,
}

/// Insertion-ordered store kept in process memory
///
/// Cheap to clone; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored item by id
    pub async fn get(&self, id: &ItemId) -> Option<Item> {
        let records = self.records.read().await;
        records.index.get(id).map(|&pos| records.items[pos].clone())
    }

    /// Number of stored items
    pub async fn len(&self) -> usize {
        self.records.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ItemStore for MemoryStore {
    async fn save(&self, item: Item) -> Result<Item, StoreError> {
        let id = item.id().cloned().unwrap_or_else(ItemId::generate);
        let item = item.with_id(id.clone());

        let mut records = self.records.write().await;
        match records.index.get(&id).copied() {
            Some(pos) => {
                records.items[pos] = item.clone();
                tracing::trace!(item_id = %id, "Item replaced");
            }
            None => {
                let pos = records.items.len();
                records.items.push(item.clone());
                records.index.insert(id.clone(), pos);
                tracing::trace!(item_id = %id, "Item inserted");
            }
        }

        Ok(item)
    }

    fn find_all(&self) -> ItemStream {
        let records = Arc::clone(&self.records);

        stream::once(async move { records.read().await.items.clone() })
            .flat_map(|items| stream::iter(items.into_iter().map(Ok)))
            .boxed()
    }
}
