//! Remote metadata: advertised channels and field mappings.

use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;
use std::collections::BTreeMap;

/// One advertised channel: a named feed of one entity-type/bundle/language
/// combination, exposed as a paginated resource collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    /// Human-readable channel label.
    pub label: String,
    /// Collection URL for the channel.
    pub url: String,
    /// Collection URL pre-arranged for filtering by global identifier.
    pub url_uuid: String,
    /// Entity type served by the channel.
    pub entity_type: String,
    /// Bundle served by the channel.
    pub bundle: String,
    /// Remote-defined search configuration, passed through untouched.
    pub search_configuration: Option<Value>,
}

impl ChannelInfo {
    fn from_value(id: &str, value: &Value) -> ProtocolResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::malformed(format!("channel {id:?} is not an object")))?;

        let text = |name: &str| -> ProtocolResult<String> {
            obj.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ProtocolError::malformed(format!("channel {id:?} has no {name}"))
                })
        };

        Ok(Self {
            label: text("label")?,
            url: text("url")?,
            url_uuid: text("url_uuid")?,
            entity_type: text("entity_type")?,
            bundle: text("bundle")?,
            search_configuration: obj.get("search_configuration").cloned(),
        })
    }
}

/// Per-remote field name mapping table.
///
/// Three-level lookup: entity-type → bundle → internal field name →
/// public field name. Lookups never fail; a missing entry is `None` and
/// callers are expected to log and skip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMappings {
    table: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

impl FieldMappings {
    /// Creates an empty mapping table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one internal → public mapping.
    pub fn insert(
        &mut self,
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        internal: impl Into<String>,
        public: impl Into<String>,
    ) {
        self.table
            .entry(entity_type.into())
            .or_default()
            .entry(bundle.into())
            .or_default()
            .insert(internal.into(), public.into());
    }

    /// Looks up the public name for an internal field name.
    pub fn public_name(&self, entity_type: &str, bundle: &str, internal: &str) -> Option<&str> {
        self.table
            .get(entity_type)?
            .get(bundle)?
            .get(internal)
            .map(String::as_str)
    }

    /// Reverse lookup: the internal name behind a public field name.
    pub fn internal_name(&self, entity_type: &str, bundle: &str, public: &str) -> Option<&str> {
        self.table
            .get(entity_type)?
            .get(bundle)?
            .iter()
            .find(|(_, p)| p.as_str() == public)
            .map(|(internal, _)| internal.as_str())
    }

    /// Returns true if no mappings are recorded for the given type/bundle.
    pub fn is_empty_for(&self, entity_type: &str, bundle: &str) -> bool {
        self.table
            .get(entity_type)
            .and_then(|bundles| bundles.get(bundle))
            .map(|fields| fields.is_empty())
            .unwrap_or(true)
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let mut mappings = Self::new();
        let Some(types) = value.as_object() else {
            return Err(ProtocolError::malformed("field_mappings is not an object"));
        };

        for (entity_type, bundles) in types {
            let Some(bundles) = bundles.as_object() else {
                continue;
            };
            for (bundle, fields) in bundles {
                let Some(fields) = fields.as_object() else {
                    continue;
                };
                for (internal, public) in fields {
                    if let Some(public) = public.as_str() {
                        mappings.insert(entity_type, bundle, internal, public);
                    }
                }
            }
        }

        Ok(mappings)
    }
}

/// The remote metadata endpoint payload: advertised channels plus the
/// field mapping table.
#[derive(Debug, Clone, Default)]
pub struct RemoteInfo {
    /// Channels keyed by channel id.
    pub channels: BTreeMap<String, ChannelInfo>,
    /// Field mapping table.
    pub field_mappings: FieldMappings,
}

impl RemoteInfo {
    /// Decodes the metadata payload from a JSON value.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let mut channels = BTreeMap::new();
        if let Some(raw) = value.get("channels").and_then(Value::as_object) {
            for (id, channel) in raw {
                channels.insert(id.clone(), ChannelInfo::from_value(id, channel)?);
            }
        }

        let field_mappings = match value.get("field_mappings") {
            Some(raw) => FieldMappings::from_value(raw)?,
            None => FieldMappings::new(),
        };

        Ok(Self {
            channels,
            field_mappings,
        })
    }

    /// Parses the metadata payload from a JSON body.
    pub fn parse(body: &str) -> ProtocolResult<Self> {
        Self::from_value(&serde_json::from_str(body)?)
    }

    /// Returns a channel by id.
    pub fn channel(&self, id: &str) -> Option<&ChannelInfo> {
        self.channels.get(id)
    }
}
