//! Local resolution and translation merge.
//!
//! Turns a prepared remote item into a local item: brand-new items are
//! denormalized and persisted immediately so that other items in the same
//! batch can reference them by local identifier; existing items get their
//! translations merged field by field.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::store::{ContentStore, DenormalizedItem, FieldWrite, LocalHandle};
use mirrorkit_protocol::{EntityTypeId, FieldMappings, RemoteItem};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The local item behind one remote item, plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocal {
    /// Handle to the local item.
    pub handle: LocalHandle,
    /// Resolved language of the incoming data.
    pub language: String,
    /// True if the item was created by this resolution.
    pub created: bool,
}

/// Determines the local language code of a remote item's data.
///
/// The designated language field's public name is looked up through the
/// mapping table; a missing or empty value falls back to the explicit
/// unspecified-language sentinel.
pub fn resolve_language(
    item: &RemoteItem,
    type_id: &EntityTypeId,
    mappings: &FieldMappings,
    config: &EngineConfig,
) -> String {
    let public = mappings
        .public_name(&type_id.entity_type, &type_id.bundle, &config.language_field)
        .unwrap_or(&config.language_field);

    match item.string_attribute(public) {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => config.unspecified_language.clone(),
    }
}

/// Denormalizes a remote item into local storage terms.
///
/// Public attribute names are translated back to internal field names
/// through the mapping table. A public name with no local counterpart is
/// logged and skipped, never an error. An empty mapping table degrades to
/// the identity mapping.
pub fn denormalize(
    item: &RemoteItem,
    type_id: &EntityTypeId,
    mappings: &FieldMappings,
    language: &str,
) -> DenormalizedItem {
    let identity = mappings.is_empty_for(&type_id.entity_type, &type_id.bundle);
    let mut fields = BTreeMap::new();

    for (public, value) in &item.attributes {
        let internal = if identity {
            Some(public.as_str())
        } else {
            mappings.internal_name(&type_id.entity_type, &type_id.bundle, public)
        };

        match internal {
            Some(internal) => {
                fields.insert(internal.to_string(), value.clone());
            }
            None => {
                debug!(
                    item = %item.id,
                    field = %public,
                    "no local field mapping, skipping attribute"
                );
            }
        }
    }

    DenormalizedItem {
        entity_type: type_id.entity_type.clone(),
        bundle: type_id.bundle.clone(),
        uuid: item.id,
        language: language.to_string(),
        fields,
    }
}

/// Determines or creates the local content item for a prepared remote item.
///
/// Returns `None` when the item's type cannot be handled locally; the
/// caller skips the item.
pub fn resolve_local(
    store: &dyn ContentStore,
    config: &EngineConfig,
    mappings: &FieldMappings,
    item: &RemoteItem,
) -> EngineResult<Option<ResolvedLocal>> {
    let type_id = match item.type_id() {
        Ok(type_id) if store.is_known_type(&type_id.entity_type) => type_id,
        _ => {
            warn!(item = %item.id, item_type = %item.item_type, "unknown entity type, skipping");
            return Ok(None);
        }
    };

    let language = resolve_language(item, &type_id, mappings, config);
    let denormalized = denormalize(item, &type_id, mappings, &language);

    let Some(handle) = store.find_by_uuid(&type_id.entity_type, item.id)? else {
        // Persist immediately: recursive reference resolution needs a
        // stable local identifier as early as possible (A↔B support).
        let handle = store.create(&denormalized)?;
        debug!(item = %item.id, language = %language, "created local item");
        return Ok(Some(ResolvedLocal {
            handle,
            language,
            created: true,
        }));
    };

    // An unspecified-language item becomes the first real translation.
    if store.language_of(handle)? == config.unspecified_language
        && language != config.unspecified_language
    {
        store.relabel_language(handle, &language)?;
    }

    if store.has_translation(handle, &language)? {
        merge_translation(store, handle, &language, &denormalized)?;
    } else {
        store.add_translation(handle, &denormalized)?;
        debug!(item = %item.id, language = %language, "added translation");
    }

    Ok(Some(ResolvedLocal {
        handle,
        language,
        created: false,
    }))
}

/// Updates only the fields present in the incoming data, taking values
/// from the freshly denormalized copy so format-specific decoding applied
/// at denormalization time is preserved.
fn merge_translation(
    store: &dyn ContentStore,
    handle: LocalHandle,
    language: &str,
    incoming: &DenormalizedItem,
) -> EngineResult<()> {
    for (field, value) in &incoming.fields {
        match store.set_field(handle, language, field, value)? {
            FieldWrite::Applied => {}
            FieldWrite::UnknownField => {
                warn!(
                    uuid = %incoming.uuid,
                    field = %field,
                    "local item has no such field, skipping"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn mappings() -> FieldMappings {
        let mut mappings = FieldMappings::new();
        mappings.insert("node", "article", "langcode", "langcode");
        mappings.insert("node", "article", "title", "title");
        mappings.insert("node", "article", "field_body", "body");
        mappings
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_known_type("node")
            .with_fields("node", ["langcode", "title", "field_body"])
    }

    fn remote_item(uuid: Uuid, language: &str, title: &str) -> RemoteItem {
        let mut item = RemoteItem::new("node--article", uuid);
        item.set_attribute("langcode", json!(language));
        item.set_attribute("title", json!(title));
        item
    }

    #[test]
    fn new_item_is_created_and_persisted() {
        let store = store();
        let config = EngineConfig::new();
        let uuid = Uuid::new_v4();

        let resolved = resolve_local(&store, &config, &mappings(), &remote_item(uuid, "en", "A"))
            .unwrap()
            .unwrap();
        assert!(resolved.created);
        assert_eq!(resolved.language, "en");
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn unknown_type_is_skipped() {
        let store = store();
        let config = EngineConfig::new();
        let item = RemoteItem::new("mystery--thing", Uuid::new_v4());

        assert!(resolve_local(&store, &config, &mappings(), &item)
            .unwrap()
            .is_none());
        assert_eq!(store.item_count(), 0);
    }

    #[test]
    fn missing_language_uses_sentinel_and_relabels_later() {
        let store = store();
        let config = EngineConfig::new();
        let uuid = Uuid::new_v4();

        let mut unlabeled = RemoteItem::new("node--article", uuid);
        unlabeled.set_attribute("title", json!("A"));
        let resolved = resolve_local(&store, &config, &mappings(), &unlabeled)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.language, "und");

        // The first real translation takes over the unspecified item.
        let resolved = resolve_local(&store, &config, &mappings(), &remote_item(uuid, "fr", "A"))
            .unwrap()
            .unwrap();
        assert!(!resolved.created);
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.translation_languages(resolved.handle), vec!["fr"]);
    }

    #[test]
    fn existing_translation_merges_fields() {
        let store = store();
        let config = EngineConfig::new();
        let uuid = Uuid::new_v4();

        let first = resolve_local(&store, &config, &mappings(), &remote_item(uuid, "en", "Old"))
            .unwrap()
            .unwrap();
        let second = resolve_local(&store, &config, &mappings(), &remote_item(uuid, "en", "New"))
            .unwrap()
            .unwrap();
        assert_eq!(first.handle, second.handle);
        assert_eq!(
            store.field_value(first.handle, "en", "title"),
            Some(json!("New"))
        );
    }

    #[test]
    fn new_language_adds_translation() {
        let store = store();
        let config = EngineConfig::new();
        let uuid = Uuid::new_v4();

        resolve_local(&store, &config, &mappings(), &remote_item(uuid, "en", "A")).unwrap();
        let resolved = resolve_local(&store, &config, &mappings(), &remote_item(uuid, "fr", "B"))
            .unwrap()
            .unwrap();

        assert_eq!(
            store.translation_languages(resolved.handle),
            vec!["en", "fr"]
        );
        assert_eq!(store.field_value(resolved.handle, "en", "title"), Some(json!("A")));
        assert_eq!(store.field_value(resolved.handle, "fr", "title"), Some(json!("B")));
    }

    #[test]
    fn denormalize_maps_public_to_internal() {
        let uuid = Uuid::new_v4();
        let mut item = remote_item(uuid, "en", "A");
        item.set_attribute("body", json!("text"));
        item.set_attribute("unmapped", json!("dropped"));

        let type_id = EntityTypeId::new("node", "article");
        let denormalized = denormalize(&item, &type_id, &mappings(), "en");

        assert_eq!(denormalized.fields.get("field_body"), Some(&json!("text")));
        assert!(!denormalized.fields.contains_key("unmapped"));
    }

    #[test]
    fn denormalize_empty_table_is_identity() {
        let uuid = Uuid::new_v4();
        let item = remote_item(uuid, "en", "A");
        let type_id = EntityTypeId::new("node", "article");

        let denormalized = denormalize(&item, &type_id, &FieldMappings::new(), "en");
        assert_eq!(denormalized.fields.get("title"), Some(&json!("A")));
    }
}
