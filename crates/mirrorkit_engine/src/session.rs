//! Per-run import session state.

use crate::config::{PipelineConfig, ProcessorSettings};
use mirrorkit_protocol::{ChannelInfo, FieldMappings};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Mutable state owned by one synchronization run.
///
/// Created by `prepare_run`, threaded through the pipeline, discarded at
/// run end. The imported-registry is the in-memory set of
/// (language, global-identifier) pairs already fully processed in this
/// run; it is what terminates reference cycles and diamond-shaped
/// reference graphs. Cancellation is per run: a cancelled session never
/// affects other sessions on the same engine.
#[derive(Debug)]
pub struct ImportSession {
    /// Active remote id.
    pub remote_id: String,
    /// Active channel id.
    pub channel_id: String,
    /// Resolved channel metadata.
    pub channel: ChannelInfo,
    /// Field mapping table fetched from the remote.
    pub field_mappings: FieldMappings,
    /// Page size for channel windows.
    pub page_limit: u64,
    /// Maximum identifiers per uuid-filter request.
    pub uuid_batch_limit: usize,
    /// The pipeline configuration driving this run.
    pub pipeline: PipelineConfig,
    /// Ad-hoc per-run processor overrides; never written back to the
    /// stored pipeline configuration.
    pub overrides: BTreeMap<String, ProcessorSettings>,
    imported: Mutex<BTreeSet<(String, Uuid)>>,
    cancelled: AtomicBool,
}

impl ImportSession {
    /// Creates a session for a resolved remote/channel pair.
    pub fn new(
        remote_id: impl Into<String>,
        channel_id: impl Into<String>,
        channel: ChannelInfo,
        field_mappings: FieldMappings,
        page_limit: u64,
        uuid_batch_limit: usize,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            channel_id: channel_id.into(),
            channel,
            field_mappings,
            page_limit,
            uuid_batch_limit,
            pipeline,
            overrides: BTreeMap::new(),
            imported: Mutex::new(BTreeSet::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Requests cancellation of this run at the next between-pages check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation of this run was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sets ad-hoc processor overrides for this run.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, ProcessorSettings>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Registers a (language, identifier) pair as imported.
    ///
    /// Returns true if the pair was newly registered, false if it was
    /// already present (the caller skips the item).
    pub fn register(&self, language: &str, id: Uuid) -> bool {
        self.imported.lock().insert((language.to_string(), id))
    }

    /// Returns true if the pair was already processed in this run.
    pub fn contains(&self, language: &str, id: Uuid) -> bool {
        self.imported.lock().contains(&(language.to_string(), id))
    }

    /// Returns true if the identifier was processed in any language.
    pub fn contains_id(&self, id: Uuid) -> bool {
        self.imported.lock().iter().any(|(_, i)| *i == id)
    }

    /// Clears the imported-registry.
    ///
    /// A deliberate escape hatch: callers re-entering the same items in a
    /// later, logically distinct pass within the same process lifetime
    /// clear the registry between passes.
    pub fn clear_imported(&self) {
        self.imported.lock().clear();
    }

    /// Number of registered (language, identifier) pairs.
    pub fn imported_count(&self) -> usize {
        self.imported.lock().len()
    }
}
