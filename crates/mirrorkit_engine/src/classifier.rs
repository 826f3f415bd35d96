//! Change-state classification of remote items against local storage.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::resolve::resolve_language;
use crate::store::{ContentStore, ImportRecordStore};
use chrono::{DateTime, TimeZone, Utc};
use mirrorkit_protocol::{FieldMappings, RemoteItem};
use serde_json::Value;
use std::fmt;

/// Synchronization status of one remote item relative to local storage.
///
/// Computed on demand, reported, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The item's entity type is not locally known.
    UnknownType,
    /// No local item exists for the global identifier.
    New,
    /// A local item exists but has no translation in the incoming language.
    NewTranslation,
    /// The remote item changed since the last import.
    Changed,
    /// The local translation is up to date.
    Synchronized,
    /// No changed-timestamp concept applies; nothing to compare.
    Undefined,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::UnknownType => "unknown-type",
            SyncStatus::New => "new",
            SyncStatus::NewTranslation => "new-translation",
            SyncStatus::Changed => "changed",
            SyncStatus::Synchronized => "synchronized",
            SyncStatus::Undefined => "undefined",
        };
        f.write_str(label)
    }
}

/// A classification result with presentational metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The computed status.
    pub status: SyncStatus,
    /// Canonical local link, when the local type defines one.
    pub local_link: Option<String>,
    /// Local revision identifier, when applicable.
    pub revision: Option<String>,
    /// Update-policy label from the import record, if one exists.
    pub policy: Option<String>,
}

impl Classification {
    fn bare(status: SyncStatus) -> Self {
        Self {
            status,
            local_link: None,
            revision: None,
            policy: None,
        }
    }
}

/// Reads a changed timestamp from an attribute value.
///
/// Remotes emit either an epoch number or an RFC 3339 string.
pub fn changed_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
        _ => None,
    }
}

/// Classifies one remote item's data against current local state.
///
/// The staleness rule is two-tier: the dedicated import record is
/// preferred; when none exists the local item's own stored changed-time is
/// compared directly against the remote one (equal means synchronized,
/// anything else means changed). The record may legitimately not exist,
/// so classification must function either way.
pub fn classify(
    store: &dyn ContentStore,
    records: &dyn ImportRecordStore,
    config: &EngineConfig,
    mappings: &FieldMappings,
    item: &RemoteItem,
) -> EngineResult<Classification> {
    let type_id = match item.type_id() {
        Ok(type_id) if store.is_known_type(&type_id.entity_type) => type_id,
        _ => return Ok(Classification::bare(SyncStatus::UnknownType)),
    };

    let handle = match store.find_by_uuid(&type_id.entity_type, item.id)? {
        Some(handle) => handle,
        None => return Ok(Classification::bare(SyncStatus::New)),
    };

    let language = resolve_language(item, &type_id, mappings, config);

    let changed_public = mappings
        .public_name(&type_id.entity_type, &type_id.bundle, &config.changed_field)
        .unwrap_or(&config.changed_field);
    let remote_changed = if store.has_changed_concept(&type_id.entity_type) {
        item.attribute(changed_public).and_then(changed_timestamp)
    } else {
        None
    };

    let record = records.find(item.id, &language, &type_id.entity_type)?;

    let status = match remote_changed {
        None => SyncStatus::Undefined,
        Some(remote_changed) => {
            if !store.has_translation(handle, &language)? {
                SyncStatus::NewTranslation
            } else if let Some(record) = &record {
                if record.last_import < remote_changed {
                    SyncStatus::Changed
                } else {
                    SyncStatus::Synchronized
                }
            } else {
                // No import record kept; compare stored changed-times directly.
                match store.changed_time(handle, &language)? {
                    Some(local_changed) if local_changed == remote_changed => {
                        SyncStatus::Synchronized
                    }
                    _ => SyncStatus::Changed,
                }
            }
        }
    };

    Ok(Classification {
        status,
        local_link: store.canonical_link(handle)?,
        revision: store.revision_id(handle)?,
        policy: record.map(|r| r.policy),
    })
}
