//! Local storage abstraction.
//!
//! Durable storage of content items is an external collaborator. The
//! engine consumes it through [`ContentStore`] (find / create / update
//! field / add translation / save) and [`ImportRecordStore`] (last-import
//! bookkeeping). [`MemoryStore`] implements both and backs the test
//! fixtures.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Storage-assigned local identifier, distinct from the global identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u64);

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a local item held open during one pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalHandle(pub u64);

/// A remote item translated to local storage terms: internal field names
/// and a resolved language.
#[derive(Debug, Clone, PartialEq)]
pub struct DenormalizedItem {
    /// Local entity type.
    pub entity_type: String,
    /// Local bundle.
    pub bundle: String,
    /// Global identifier.
    pub uuid: Uuid,
    /// Resolved language code.
    pub language: String,
    /// Internal field names to values.
    pub fields: BTreeMap<String, Value>,
}

/// Outcome of a single-field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWrite {
    /// The field exists locally and was overwritten.
    Applied,
    /// The field has no local counterpart; the write was skipped.
    UnknownField,
}

/// Local storage of content items.
///
/// All methods degrade per-item: an `Err` here is contained by the engine
/// and never aborts the rest of a batch.
pub trait ContentStore: Send + Sync {
    /// Returns true if the entity type is locally known.
    fn is_known_type(&self, entity_type: &str) -> bool;

    /// Returns true if the entity type carries a changed-timestamp concept.
    fn has_changed_concept(&self, entity_type: &str) -> bool;

    /// Finds an existing local item by global identifier.
    fn find_by_uuid(&self, entity_type: &str, uuid: Uuid) -> EngineResult<Option<LocalHandle>>;

    /// Creates and immediately persists a new local item, so other items
    /// in the same batch can reference it by local identifier.
    fn create(&self, item: &DenormalizedItem) -> EngineResult<LocalHandle>;

    /// Returns the item's current default language.
    fn language_of(&self, handle: LocalHandle) -> EngineResult<String>;

    /// Reassigns the item's language, turning an unspecified-language item
    /// into its first real translation.
    fn relabel_language(&self, handle: LocalHandle, language: &str) -> EngineResult<()>;

    /// Returns true if the item already has a translation in the language.
    fn has_translation(&self, handle: LocalHandle, language: &str) -> EngineResult<bool>;

    /// Adds a new translation from a full denormalized representation.
    fn add_translation(&self, handle: LocalHandle, item: &DenormalizedItem) -> EngineResult<()>;

    /// Overwrites one field of one translation.
    fn set_field(
        &self,
        handle: LocalHandle,
        language: &str,
        field: &str,
        value: &Value,
    ) -> EngineResult<FieldWrite>;

    /// Returns the stored changed-time of a translation, if tracked.
    fn changed_time(
        &self,
        handle: LocalHandle,
        language: &str,
    ) -> EngineResult<Option<DateTime<Utc>>>;

    /// Returns the canonical local link, if the type defines one.
    fn canonical_link(&self, handle: LocalHandle) -> EngineResult<Option<String>>;

    /// Returns the current revision identifier, when applicable.
    fn revision_id(&self, handle: LocalHandle) -> EngineResult<Option<String>>;

    /// Returns the local identifier behind an already-persisted handle.
    fn local_id(&self, handle: LocalHandle) -> EngineResult<LocalId>;

    /// Saves the item and returns its local identifier.
    fn save(&self, handle: LocalHandle) -> EngineResult<LocalId>;
}

/// Persisted bookkeeping for one (identifier, language, entity-type)
/// triple: the last successful import time and the applied policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    /// Global identifier.
    pub uuid: Uuid,
    /// Language code.
    pub language: String,
    /// Entity type.
    pub entity_type: String,
    /// Timestamp of the last successful import.
    pub last_import: DateTime<Utc>,
    /// Update policy label applied at import time.
    pub policy: String,
}

/// Storage of import records.
pub trait ImportRecordStore: Send + Sync {
    /// Finds the record for a (identifier, language, entity-type) triple.
    fn find(
        &self,
        uuid: Uuid,
        language: &str,
        entity_type: &str,
    ) -> EngineResult<Option<ImportRecord>>;

    /// Creates or replaces a record.
    fn put(&self, record: ImportRecord) -> EngineResult<()>;
}

#[derive(Debug, Clone)]
struct StoredItem {
    local_id: u64,
    uuid: Uuid,
    entity_type: String,
    bundle: String,
    default_language: String,
    translations: BTreeMap<String, BTreeMap<String, Value>>,
    revision: u64,
}

#[derive(Default)]
struct MemoryStoreInner {
    next_id: u64,
    items: BTreeMap<u64, StoredItem>,
    records: BTreeMap<(Uuid, String, String), ImportRecord>,
}

/// An in-memory content store for testing.
///
/// Known entity types and their field sets are declared up front; a type
/// with no declared field set accepts any field.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    known_types: BTreeSet<String>,
    fields: BTreeMap<String, BTreeSet<String>>,
    changed_field: String,
    link_base: Option<String>,
}

impl MemoryStore {
    /// Creates a new memory store with no known types.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            known_types: BTreeSet::new(),
            fields: BTreeMap::new(),
            changed_field: "changed".into(),
            link_base: None,
        }
    }

    /// Declares a locally known entity type.
    pub fn with_known_type(mut self, entity_type: impl Into<String>) -> Self {
        self.known_types.insert(entity_type.into());
        self
    }

    /// Declares the set of fields an entity type accepts.
    pub fn with_fields<I, S>(mut self, entity_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(
            entity_type.into(),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Enables canonical links under a base URL.
    pub fn with_link_base(mut self, base: impl Into<String>) -> Self {
        self.link_base = Some(base.into());
        self
    }

    /// Returns the number of stored items.
    pub fn item_count(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Returns the languages of an item's translations, for assertions.
    pub fn translation_languages(&self, handle: LocalHandle) -> Vec<String> {
        self.inner
            .read()
            .items
            .get(&handle.0)
            .map(|item| item.translations.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns one stored field value, for assertions.
    pub fn field_value(&self, handle: LocalHandle, language: &str, field: &str) -> Option<Value> {
        self.inner
            .read()
            .items
            .get(&handle.0)
            .and_then(|item| item.translations.get(language))
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    fn accepts_field(&self, entity_type: &str, field: &str) -> bool {
        match self.fields.get(entity_type) {
            Some(declared) => declared.contains(field),
            None => true,
        }
    }

    fn with_item<T>(
        &self,
        handle: LocalHandle,
        f: impl FnOnce(&mut StoredItem) -> T,
    ) -> EngineResult<T> {
        let mut inner = self.inner.write();
        let item = inner
            .items
            .get_mut(&handle.0)
            .ok_or_else(|| EngineError::store(format!("no local item for handle {}", handle.0)))?;
        Ok(f(item))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for MemoryStore {
    fn is_known_type(&self, entity_type: &str) -> bool {
        self.known_types.contains(entity_type)
    }

    fn has_changed_concept(&self, entity_type: &str) -> bool {
        self.accepts_field(entity_type, &self.changed_field)
    }

    fn find_by_uuid(&self, entity_type: &str, uuid: Uuid) -> EngineResult<Option<LocalHandle>> {
        Ok(self
            .inner
            .read()
            .items
            .values()
            .find(|item| item.entity_type == entity_type && item.uuid == uuid)
            .map(|item| LocalHandle(item.local_id)))
    }

    fn create(&self, item: &DenormalizedItem) -> EngineResult<LocalHandle> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let local_id = inner.next_id;

        let fields = item
            .fields
            .iter()
            .filter(|(name, _)| self.accepts_field(&item.entity_type, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut translations = BTreeMap::new();
        translations.insert(item.language.clone(), fields);

        inner.items.insert(
            local_id,
            StoredItem {
                local_id,
                uuid: item.uuid,
                entity_type: item.entity_type.clone(),
                bundle: item.bundle.clone(),
                default_language: item.language.clone(),
                translations,
                revision: 1,
            },
        );

        Ok(LocalHandle(local_id))
    }

    fn language_of(&self, handle: LocalHandle) -> EngineResult<String> {
        self.with_item(handle, |item| item.default_language.clone())
    }

    fn relabel_language(&self, handle: LocalHandle, language: &str) -> EngineResult<()> {
        self.with_item(handle, |item| {
            if let Some(fields) = item.translations.remove(&item.default_language) {
                item.translations.insert(language.to_string(), fields);
            }
            item.default_language = language.to_string();
        })
    }

    fn has_translation(&self, handle: LocalHandle, language: &str) -> EngineResult<bool> {
        self.with_item(handle, |item| item.translations.contains_key(language))
    }

    fn add_translation(&self, handle: LocalHandle, item: &DenormalizedItem) -> EngineResult<()> {
        let accepted: BTreeMap<String, Value> = item
            .fields
            .iter()
            .filter(|(name, _)| self.accepts_field(&item.entity_type, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        self.with_item(handle, |stored| {
            stored.translations.insert(item.language.clone(), accepted);
        })
    }

    fn set_field(
        &self,
        handle: LocalHandle,
        language: &str,
        field: &str,
        value: &Value,
    ) -> EngineResult<FieldWrite> {
        let entity_type = self.with_item(handle, |item| item.entity_type.clone())?;
        if !self.accepts_field(&entity_type, field) {
            return Ok(FieldWrite::UnknownField);
        }

        self.with_item(handle, |item| {
            item.translations
                .entry(language.to_string())
                .or_default()
                .insert(field.to_string(), value.clone());
            FieldWrite::Applied
        })
    }

    fn changed_time(
        &self,
        handle: LocalHandle,
        language: &str,
    ) -> EngineResult<Option<DateTime<Utc>>> {
        let changed_field = self.changed_field.clone();
        self.with_item(handle, |item| {
            item.translations
                .get(language)
                .and_then(|fields| fields.get(&changed_field))
                .and_then(crate::classifier::changed_timestamp)
        })
    }

    fn canonical_link(&self, handle: LocalHandle) -> EngineResult<Option<String>> {
        let base = match &self.link_base {
            Some(base) => base.clone(),
            None => return Ok(None),
        };
        self.with_item(handle, |item| {
            Some(format!("{base}/{}/{}", item.entity_type, item.local_id))
        })
    }

    fn revision_id(&self, handle: LocalHandle) -> EngineResult<Option<String>> {
        self.with_item(handle, |item| Some(item.revision.to_string()))
    }

    fn local_id(&self, handle: LocalHandle) -> EngineResult<LocalId> {
        self.with_item(handle, |item| LocalId(item.local_id))
    }

    fn save(&self, handle: LocalHandle) -> EngineResult<LocalId> {
        self.with_item(handle, |item| {
            item.revision += 1;
            LocalId(item.local_id)
        })
    }
}

impl ImportRecordStore for MemoryStore {
    fn find(
        &self,
        uuid: Uuid,
        language: &str,
        entity_type: &str,
    ) -> EngineResult<Option<ImportRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .get(&(uuid, language.to_string(), entity_type.to_string()))
            .cloned())
    }

    fn put(&self, record: ImportRecord) -> EngineResult<()> {
        self.inner.write().records.insert(
            (
                record.uuid,
                record.language.clone(),
                record.entity_type.clone(),
            ),
            record,
        );
        Ok(())
    }
}
