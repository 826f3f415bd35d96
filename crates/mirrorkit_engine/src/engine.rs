//! The synchronization engine.
//!
//! Orchestrates a full pull: resolves remote and channel metadata into a
//! session, paginates the channel, and walks every item through the
//! staged pipeline culminating in a local write. Per-item problems are
//! contained and logged; only run-preparation problems surface as errors.

use crate::classifier::{classify, Classification};
use crate::client::RemoteClient;
use crate::config::{EngineConfig, PipelineConfig, RemoteConfig};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{ImportContext, ProcessorRegistry, ReferenceImporter, Stage, StageOutcome};
use crate::resolve::resolve_local;
use crate::session::ImportSession;
use crate::store::{ContentStore, ImportRecordStore, LocalId};
use mirrorkit_protocol::{
    page_windows, uuid_filter_url, window_url, CollectionDocument, ItemRef, PageWindow, RemoteItem,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Aggregate result of one channel import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Items written locally.
    pub imported: usize,
    /// Pages attempted.
    pub pages: usize,
    /// Pages that failed to fetch or decode.
    pub failed_pages: usize,
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pages == 0 {
            f.write_str("nothing to import")
        } else {
            write!(
                f,
                "imported {} items in {} of {} pages",
                self.imported,
                self.pages - self.failed_pages,
                self.pages
            )
        }
    }
}

/// The pull-based content synchronization engine.
///
/// Generic over its collaborators: the remote client, the content store
/// and the import-record store. One engine serves many runs; all per-run
/// state lives in the [`ImportSession`].
pub struct ImportEngine<C, S, R> {
    client: C,
    store: Arc<S>,
    records: Arc<R>,
    registry: ProcessorRegistry,
    config: EngineConfig,
    remotes: BTreeMap<String, RemoteConfig>,
    pipelines: BTreeMap<String, PipelineConfig>,
}

impl<C, S, R> ImportEngine<C, S, R>
where
    C: RemoteClient,
    S: ContentStore,
    R: ImportRecordStore,
{
    /// Creates a new engine.
    pub fn new(
        client: C,
        store: Arc<S>,
        records: Arc<R>,
        registry: ProcessorRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            store,
            records,
            registry,
            config,
            remotes: BTreeMap::new(),
            pipelines: BTreeMap::new(),
        }
    }

    /// Registers a remote.
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remotes.insert(remote.id.clone(), remote);
        self
    }

    /// Registers a pipeline configuration.
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipelines.insert(pipeline.id.clone(), pipeline);
        self
    }

    fn check_cancelled(session: &ImportSession) -> EngineResult<()> {
        if session.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves pipeline, remote and channel metadata into a session.
    ///
    /// Every failure here is fatal to the run, logged once and returned;
    /// nothing has been imported yet.
    pub fn prepare_run(
        &self,
        remote_id: &str,
        channel_id: &str,
        pipeline_id: &str,
    ) -> EngineResult<ImportSession> {
        if pipeline_id.is_empty() {
            error!("no pipeline configuration id given");
            return Err(EngineError::MissingConfig("pipeline configuration id".into()));
        }

        let pipeline = self.pipelines.get(pipeline_id).ok_or_else(|| {
            error!(pipeline = %pipeline_id, "pipeline configuration not found");
            EngineError::UnknownPipeline(pipeline_id.to_string())
        })?;

        let remote = self.remotes.get(remote_id).ok_or_else(|| {
            error!(remote = %remote_id, "remote not found");
            EngineError::UnknownRemote(remote_id.to_string())
        })?;

        let metadata = self.client.get(&remote.metadata_url).map_err(|err| {
            error!(remote = %remote_id, error = %err, "remote metadata unreachable");
            err
        })?;
        let info = mirrorkit_protocol::RemoteInfo::from_value(&metadata)?;

        let channel = info.channel(channel_id).cloned().ok_or_else(|| {
            error!(remote = %remote_id, channel = %channel_id, "channel not advertised by remote");
            EngineError::UnknownChannel {
                remote: remote_id.to_string(),
                channel: channel_id.to_string(),
            }
        })?;

        let page_limit = channel
            .search_configuration
            .as_ref()
            .and_then(|v| v.pointer("/page_limit"))
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_page_limit);

        info!(
            remote = %remote_id,
            channel = %channel_id,
            pipeline = %pipeline_id,
            page_limit,
            "prepared synchronization run"
        );

        Ok(ImportSession::new(
            remote_id,
            channel_id,
            channel,
            info.field_mappings,
            page_limit,
            remote.uuid_batch_limit,
            pipeline.clone(),
        ))
    }

    /// Computes the deterministic page-window plan for a channel.
    ///
    /// Probes the collection once for its total count. Returns `None`
    /// when the remote reports no count; `import_channel` then follows
    /// `next` links instead.
    pub fn plan_channel(&self, session: &ImportSession) -> EngineResult<Option<Vec<PageWindow>>> {
        let probe = window_url(&session.channel.url, PageWindow::new(0, 1));
        let document = self.fetch_document(&probe)?;

        match document.count {
            Some(count) => Ok(Some(page_windows(count, session.page_limit))),
            None => {
                debug!(channel = %session.channel_id, "remote reports no count, falling back to next links");
                Ok(None)
            }
        }
    }

    /// Imports a whole channel, page by page.
    ///
    /// Windows execute sequentially with a cancellation point between
    /// pages; cancellation is owned by the session, so cancelling one run
    /// never touches another. A failed page is logged and counted; later
    /// pages still run.
    pub fn import_channel(&self, session: &ImportSession) -> EngineResult<ImportSummary> {
        Self::check_cancelled(session)?;
        let mut summary = ImportSummary::default();

        match self.plan_channel(session)? {
            Some(plan) if plan.is_empty() => {
                info!(channel = %session.channel_id, "nothing to import");
            }
            Some(plan) => {
                for window in plan {
                    Self::check_cancelled(session)?;
                    let url = window_url(&session.channel.url, window);
                    summary.pages += 1;
                    match self.import_from_url(session, &url) {
                        Ok(results) => summary.imported += results.len(),
                        Err(err) => {
                            error!(page = %url, error = %err, "page import failed");
                            summary.failed_pages += 1;
                        }
                    }
                }
            }
            None => {
                let mut url = window_url(
                    &session.channel.url,
                    PageWindow::new(0, session.page_limit),
                );
                loop {
                    Self::check_cancelled(session)?;
                    summary.pages += 1;
                    match self.fetch_document(&url) {
                        Ok(document) => {
                            let results =
                                self.import_entity_list_data(session, document.items)?;
                            summary.imported += results.len();
                            match document.next {
                                Some(next) => url = next,
                                None => break,
                            }
                        }
                        Err(err) => {
                            error!(page = %url, error = %err, "page import failed");
                            summary.failed_pages += 1;
                            break;
                        }
                    }
                }
            }
        }

        info!(channel = %session.channel_id, %summary, "channel import finished");
        Ok(summary)
    }

    /// Fetches one page and imports its items.
    pub fn import_from_url(
        &self,
        session: &ImportSession,
        url: &str,
    ) -> EngineResult<BTreeMap<Uuid, LocalId>> {
        let document = self.fetch_document(url)?;
        self.import_entity_list_data(session, document.items)
    }

    /// Selectively imports an explicit list of identifiers through the
    /// channel's identifier-filter URL, bypassing full pagination.
    pub fn import_uuids(
        &self,
        session: &ImportSession,
        ids: &[Uuid],
    ) -> EngineResult<BTreeMap<Uuid, LocalId>> {
        if ids.len() > session.uuid_batch_limit {
            warn!(
                requested = ids.len(),
                limit = session.uuid_batch_limit,
                "identifier batch exceeds limit, extra identifiers omitted"
            );
        }
        let url = uuid_filter_url(&session.channel.url_uuid, ids, session.uuid_batch_limit);
        self.import_from_url(session, &url)
    }

    /// Runs the staged pipeline over a list of remote items.
    ///
    /// A failure in one item never aborts the remaining items; the
    /// returned map covers only items that reached a local write in this
    /// call.
    pub fn import_entity_list_data(
        &self,
        session: &ImportSession,
        items: Vec<RemoteItem>,
    ) -> EngineResult<BTreeMap<Uuid, LocalId>> {
        self.import_items(session, items, 0)
    }

    /// Classifies one remote item against local state, using the
    /// session's field mappings.
    pub fn classify_item(
        &self,
        session: &ImportSession,
        item: &RemoteItem,
    ) -> EngineResult<Classification> {
        classify(
            &*self.store,
            &*self.records,
            &self.config,
            &session.field_mappings,
            item,
        )
    }

    /// Session-scoped request passthrough for processors.
    pub fn request(&self, url: &str) -> EngineResult<Value> {
        self.client.get(url)
    }

    fn fetch_document(&self, url: &str) -> EngineResult<CollectionDocument> {
        let body = self.client.get(url)?;
        Ok(CollectionDocument::from_value(&body)?)
    }

    fn import_items(
        &self,
        session: &ImportSession,
        items: Vec<RemoteItem>,
        depth: u32,
    ) -> EngineResult<BTreeMap<Uuid, LocalId>> {
        let mut results = BTreeMap::new();

        for mut item in items {
            let id = item.id;
            match self.import_one(session, &mut item, depth) {
                Ok(Some(local_id)) => {
                    results.insert(id, local_id);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(item = %id, error = %err, "item import failed");
                }
            }
        }

        Ok(results)
    }

    /// The staged walk for one item. `Ok(None)` means the item was
    /// skipped (veto, unknown type); errors are contained by the caller.
    fn import_one(
        &self,
        session: &ImportSession,
        item: &mut RemoteItem,
        depth: u32,
    ) -> EngineResult<Option<LocalId>> {
        let ctx = ImportContext {
            session,
            store: &*self.store,
            records: &*self.records,
            config: &self.config,
            importer: self,
            depth,
        };

        // Stage 1: prepare raw data.
        for processor in
            self.registry
                .resolve_for_stage(&session.pipeline, Stage::PrepareEntityData, &session.overrides)
        {
            match processor.prepare_entity_data(item, &ctx)? {
                StageOutcome::Proceed => {}
                StageOutcome::Skip(reason) => {
                    debug!(item = %item.id, processor = processor.id(), %reason, "item skipped");
                    return Ok(None);
                }
                StageOutcome::Fail(message) => {
                    return Err(EngineError::ProcessorFailed {
                        processor: processor.id().to_string(),
                        message,
                    })
                }
            }
        }

        // Stage 2: importability; first veto short-circuits.
        for processor in self.registry.resolve_for_stage(
            &session.pipeline,
            Stage::IsEntityImportable,
            &session.overrides,
        ) {
            match processor.is_entity_importable(item, &ctx)? {
                StageOutcome::Proceed => {}
                StageOutcome::Skip(reason) => {
                    debug!(item = %item.id, processor = processor.id(), %reason, "import vetoed");
                    return Ok(None);
                }
                StageOutcome::Fail(message) => {
                    return Err(EngineError::ProcessorFailed {
                        processor: processor.id().to_string(),
                        message,
                    })
                }
            }
        }

        // Stage 3: final mutation of confirmed-importable data.
        for processor in self.registry.resolve_for_stage(
            &session.pipeline,
            Stage::PrepareImportableEntityData,
            &session.overrides,
        ) {
            match processor.prepare_importable_entity_data(item, &ctx)? {
                StageOutcome::Proceed => {}
                StageOutcome::Skip(reason) => {
                    debug!(item = %item.id, processor = processor.id(), %reason, "item skipped");
                    return Ok(None);
                }
                StageOutcome::Fail(message) => {
                    return Err(EngineError::ProcessorFailed {
                        processor: processor.id().to_string(),
                        message,
                    })
                }
            }
        }

        // Stage 4: resolution.
        let Some(local) =
            resolve_local(&*self.store, &self.config, &session.field_mappings, item)?
        else {
            return Ok(None);
        };

        // Stage 5: cycle guard. Register before process-entity so a
        // recursive re-entrant call sees the registration and stops.
        if !session.register(&local.language, item.id) {
            debug!(item = %item.id, language = %local.language, "already processed in this run");
            return Ok(Some(self.store.local_id(local.handle)?));
        }

        // Stage 6: process against the resolved local item.
        for processor in
            self.registry
                .resolve_for_stage(&session.pipeline, Stage::ProcessEntity, &session.overrides)
        {
            match processor.process_entity(item, &local, &ctx)? {
                StageOutcome::Proceed => {}
                StageOutcome::Skip(reason) => {
                    debug!(item = %item.id, processor = processor.id(), %reason, "processing stopped");
                    return Ok(Some(self.store.local_id(local.handle)?));
                }
                StageOutcome::Fail(message) => {
                    return Err(EngineError::ProcessorFailed {
                        processor: processor.id().to_string(),
                        message,
                    })
                }
            }
        }

        // Stage 7: persist.
        let local_id = self.store.save(local.handle)?;

        // Stage 8: follow-ups that need the saved identifier.
        for processor in
            self.registry
                .resolve_for_stage(&session.pipeline, Stage::PostEntitySave, &session.overrides)
        {
            match processor.post_entity_save(item, &local, local_id, &ctx)? {
                StageOutcome::Proceed => {}
                StageOutcome::Skip(reason) => {
                    debug!(item = %item.id, processor = processor.id(), %reason, "post-save stopped");
                    break;
                }
                StageOutcome::Fail(message) => {
                    return Err(EngineError::ProcessorFailed {
                        processor: processor.id().to_string(),
                        message,
                    })
                }
            }
        }

        Ok(Some(local_id))
    }

    fn resolved_reference(&self, reference: &ItemRef) -> EngineResult<Option<LocalId>> {
        let Ok(type_id) = reference
            .item_type
            .parse::<mirrorkit_protocol::EntityTypeId>()
        else {
            return Ok(None);
        };
        match self.store.find_by_uuid(&type_id.entity_type, reference.id)? {
            Some(handle) => Ok(Some(self.store.local_id(handle)?)),
            None => Ok(None),
        }
    }
}

impl<C, S, R> ReferenceImporter for ImportEngine<C, S, R>
where
    C: RemoteClient,
    S: ContentStore,
    R: ImportRecordStore,
{
    fn resolve_or_import(
        &self,
        session: &ImportSession,
        reference: &ItemRef,
        depth: u32,
    ) -> EngineResult<Option<LocalId>> {
        // Already processed in this run: resolve without refetching.
        if session.contains_id(reference.id) {
            if let Some(local_id) = self.resolved_reference(reference)? {
                return Ok(Some(local_id));
            }
        }

        let url = match &reference.related {
            Some(related) => related.clone(),
            None => uuid_filter_url(
                &session.channel.url_uuid,
                &[reference.id],
                session.uuid_batch_limit,
            ),
        };

        let document = self.fetch_document(&url)?;
        let results = self.import_items(session, document.items, depth + 1)?;

        if let Some(local_id) = results.get(&reference.id) {
            return Ok(Some(*local_id));
        }
        // The target may have been skipped this time but exist locally.
        self.resolved_reference(reference)
    }

    fn request(&self, url: &str) -> EngineResult<Value> {
        self.client.get(url)
    }
}
