//! Remote content items and their references.

use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A parsed `<entity-type>--<bundle>` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityTypeId {
    /// Entity type, e.g. `node`.
    pub entity_type: String,
    /// Bundle (subtype), e.g. `article`.
    pub bundle: String,
}

impl EntityTypeId {
    /// Creates a new entity type id.
    pub fn new(entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
        }
    }
}

impl FromStr for EntityTypeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity_type, bundle) = s
            .split_once("--")
            .ok_or_else(|| ProtocolError::InvalidTypeId(s.to_string()))?;
        if entity_type.is_empty() || bundle.is_empty() {
            return Err(ProtocolError::InvalidTypeId(s.to_string()));
        }
        Ok(Self::new(entity_type, bundle))
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}--{}", self.entity_type, self.bundle)
    }
}

/// A reference to another remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// Raw `<entity-type>--<bundle>` of the target.
    pub item_type: String,
    /// Global identifier of the target.
    pub id: Uuid,
    /// Optional `related` fetch link for the target.
    pub related: Option<String>,
}

impl ItemRef {
    /// Creates a new item reference.
    pub fn new(item_type: impl Into<String>, id: Uuid) -> Self {
        Self {
            item_type: item_type.into(),
            id,
            related: None,
        }
    }

    /// Sets the `related` fetch link.
    pub fn with_related(mut self, link: impl Into<String>) -> Self {
        self.related = Some(link.into());
        self
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("reference is not an object"))?;
        let item_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("reference has no type"))?;
        let raw_id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("reference has no id"))?;
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| ProtocolError::InvalidIdentifier(raw_id.to_string()))?;
        Ok(Self::new(item_type, id))
    }
}

/// A relationship field on a remote item: nothing, one reference, or an
/// ordered list of references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Relationship {
    /// No related item (`"data": null`).
    #[default]
    Empty,
    /// A single related item.
    One(ItemRef),
    /// An ordered list of related items.
    Many(Vec<ItemRef>),
}

impl Relationship {
    /// Returns the references in document order.
    pub fn refs(&self) -> Vec<&ItemRef> {
        match self {
            Relationship::Empty => Vec::new(),
            Relationship::One(r) => vec![r],
            Relationship::Many(rs) => rs.iter().collect(),
        }
    }

    /// Returns true if the relationship holds no references.
    pub fn is_empty(&self) -> bool {
        match self {
            Relationship::Empty => true,
            Relationship::One(_) => false,
            Relationship::Many(rs) => rs.is_empty(),
        }
    }

    /// Decodes a relationship document: `{"data": null | {..} | [..],
    /// "links": {"related": {"href": ..}}}`.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let related = value
            .pointer("/links/related/href")
            .and_then(Value::as_str)
            .map(str::to_string);

        let attach = |mut r: ItemRef| {
            r.related = related.clone();
            r
        };

        match value.get("data") {
            None | Some(Value::Null) => Ok(Relationship::Empty),
            Some(Value::Array(items)) => {
                let refs = items
                    .iter()
                    .map(|v| ItemRef::from_value(v).map(&attach))
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Ok(Relationship::Many(refs))
            }
            Some(single) => Ok(Relationship::One(attach(ItemRef::from_value(single)?))),
        }
    }
}

/// One unit of remote content as returned by the remote API.
///
/// Immutable once fetched, except that pipeline processors may rewrite
/// attributes in place during the prepare stages.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    /// Raw `<entity-type>--<bundle>` string.
    pub item_type: String,
    /// Globally unique stable identifier.
    pub id: Uuid,
    /// Public attribute names to values.
    pub attributes: BTreeMap<String, Value>,
    /// Public relationship names to references.
    pub relationships: BTreeMap<String, Relationship>,
}

impl RemoteItem {
    /// Creates a new remote item with no attributes or relationships.
    pub fn new(item_type: impl Into<String>, id: Uuid) -> Self {
        Self {
            item_type: item_type.into(),
            id,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Parses the raw type string into an [`EntityTypeId`].
    pub fn type_id(&self) -> ProtocolResult<EntityTypeId> {
        self.item_type.parse()
    }

    /// Returns an attribute value by public name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns an attribute as a string, if present and a string.
    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Sets an attribute value by public name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Adds a relationship under a public name.
    pub fn set_relationship(&mut self, name: impl Into<String>, relationship: Relationship) {
        self.relationships.insert(name.into(), relationship);
    }

    /// Decodes one resource object: `{"type": .., "id": .., "attributes":
    /// {..}, "relationships": {..}}`.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("item is not an object"))?;

        let item_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("item has no type"))?;
        let raw_id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::malformed("item has no id"))?;
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| ProtocolError::InvalidIdentifier(raw_id.to_string()))?;

        let mut item = Self::new(item_type, id);

        if let Some(attributes) = obj.get("attributes").and_then(Value::as_object) {
            for (name, value) in attributes {
                item.attributes.insert(name.clone(), value.clone());
            }
        }

        if let Some(relationships) = obj.get("relationships").and_then(Value::as_object) {
            for (name, value) in relationships {
                item.relationships
                    .insert(name.clone(), Relationship::from_value(value)?);
            }
        }

        Ok(item)
    }
}
