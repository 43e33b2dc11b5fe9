//! Item record
//!
//! The domain record accepted by the ingestion routes, persisted by the
//! store, and fanned out to monitors. Apart from its identifier the record is
//! an opaque set of JSON fields.
//!
//! Wire form is a flat JSON object:
//!
//! ```text
//! {"id": "4f0c...", "name": "lamp", "price": 12.5}
//! ```
//!
//! `id` is omitted until the item has been persisted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ItemError;

/// Identifier assigned by the store on first save
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored or to-be-stored item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Present once the item has been persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<ItemId>,

    /// Domain fields, opaque to the broadcaster
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Item {
    /// Create an empty, unsaved item
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder-style id setter, used by stores when assigning identity
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<&ItemId> {
        self.id.as_ref()
    }

    /// Whether the item carries a store-assigned identifier
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Decode and validate an item from a wire payload
    ///
    /// The payload must be a JSON object. An `id` key, when present and not
    /// null, must be a non-empty string.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ItemError> {
        let value: Value = serde_json::from_slice(payload)?;
        let object = match value {
            Value::Object(object) => object,
            _ => return Err(ItemError::NotAnObject),
        };

        match object.get("id") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(_) => return Err(ItemError::InvalidId),
        }

        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Encode the item as a wire payload
    pub fn to_bytes(&self) -> Result<Bytes, ItemError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unsaved_item_omits_id() {
        let item = Item::new().with_field("name", "lamp");
        let encoded = item.to_bytes().unwrap();

        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!({"name": "lamp"}));
        assert!(!item.is_persisted());
    }

    #[test]
    fn test_decode_with_id() {
        let item = Item::from_slice(br#"{"id":"abc","price":3}"#).unwrap();

        assert_eq!(item.id(), Some(&ItemId::new("abc")));
        assert_eq!(item.field("price"), Some(&json!(3)));
        assert!(item.fields().get("id").is_none());
    }

    #[test]
    fn test_decode_null_id_is_unsaved() {
        let item = Item::from_slice(br#"{"id":null,"name":"x"}"#).unwrap();
        assert!(item.id().is_none());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            Item::from_slice(b"[1,2,3]"),
            Err(ItemError::NotAnObject)
        ));
        assert!(matches!(
            Item::from_slice(b"\"lamp\""),
            Err(ItemError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(matches!(Item::from_slice(b"{"), Err(ItemError::Json(_))));
        assert!(matches!(Item::from_slice(b""), Err(ItemError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_bad_id() {
        assert!(matches!(
            Item::from_slice(br#"{"id":""}"#),
            Err(ItemError::InvalidId)
        ));
        assert!(matches!(
            Item::from_slice(br#"{"id":42}"#),
            Err(ItemError::InvalidId)
        ));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(ItemId::generate(), ItemId::generate());
    }
}
