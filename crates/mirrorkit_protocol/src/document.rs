//! Collection documents returned by channel endpoints.

use crate::error::{ProtocolError, ProtocolResult};
use crate::item::RemoteItem;
use serde_json::Value;

/// One decoded page of a channel collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionDocument {
    /// Remote items on this page, in document order.
    pub items: Vec<RemoteItem>,
    /// Pagination link to the next page, if more pages remain.
    pub next: Option<String>,
    /// Total item count for the collection, if the remote reports one.
    pub count: Option<u64>,
}

impl CollectionDocument {
    /// Decodes a collection document from a JSON value.
    ///
    /// The `data` member may be a single resource object or an array of
    /// them; both shapes are accepted. `links.next` and `meta.count` are
    /// optional.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let items = match value.get("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(raw)) => raw
                .iter()
                .map(RemoteItem::from_value)
                .collect::<ProtocolResult<Vec<_>>>()?,
            Some(single) => vec![RemoteItem::from_value(single)?],
        };

        Ok(Self {
            items,
            next: link(value, "next"),
            count: count(value),
        })
    }

    /// Parses a collection document from a JSON body.
    pub fn parse(body: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(ProtocolError::malformed("document is not an object"));
        }
        Self::from_value(&value)
    }

    /// Returns true if this page carries no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reads a pagination link that may be a bare string or `{"href": ..}`.
fn link(value: &Value, name: &str) -> Option<String> {
    let raw = value.pointer(&format!("/links/{name}"))?;
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("href").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Reads `meta.count`, tolerating the number-as-string form some remotes
/// emit.
fn count(value: &Value) -> Option<u64> {
    match value.pointer("/meta/count") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}
