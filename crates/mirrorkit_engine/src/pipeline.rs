//! Processor pipeline: stages, the processor contract, and the registry
//! that resolves the active, ordered processor list per stage.

use crate::config::{PipelineConfig, ProcessorSettings};
use crate::error::EngineResult;
use crate::resolve::ResolvedLocal;
use crate::session::ImportSession;
use crate::store::{ContentStore, ImportRecordStore, LocalId};
use mirrorkit_protocol::{ItemRef, RemoteItem};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// The processor-visible stages of the per-item walk.
///
/// Resolution, the cycle guard and the persist step sit between these but
/// are engine-internal and cannot be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Mutate raw remote data before any importability decision.
    PrepareEntityData,
    /// Veto import of a specific item; first veto short-circuits.
    IsEntityImportable,
    /// Final data mutation once the item is confirmed importable.
    PrepareImportableEntityData,
    /// Apply logic against the locally-resolved item.
    ProcessEntity,
    /// Follow-up actions that require a saved identifier.
    PostEntitySave,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::PrepareEntityData,
        Stage::IsEntityImportable,
        Stage::PrepareImportableEntityData,
        Stage::ProcessEntity,
        Stage::PostEntitySave,
    ];
}

/// Explicit three-state result of one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Continue with the next processor/stage.
    Proceed,
    /// Stop processing this item; not an error.
    Skip(String),
    /// This item failed; contained to the item, logged by the engine.
    Fail(String),
}

/// The injected "resolve a reference by importing it if not already
/// present" capability, backed by the session-scoped imported-registry.
pub trait ReferenceImporter: Send + Sync {
    /// Resolves a reference to a local identifier, importing the target
    /// through the same machinery when necessary. `depth` is the hop
    /// distance from the originating item, starting at 0.
    fn resolve_or_import(
        &self,
        session: &ImportSession,
        reference: &ItemRef,
        depth: u32,
    ) -> EngineResult<Option<LocalId>>;

    /// Session-scoped request passthrough, bound to the active remote.
    fn request(&self, url: &str) -> EngineResult<Value>;
}

/// Everything a processor may touch during one stage invocation.
pub struct ImportContext<'a> {
    /// The active session.
    pub session: &'a ImportSession,
    /// Local content storage.
    pub store: &'a dyn ContentStore,
    /// Import-record bookkeeping.
    pub records: &'a dyn ImportRecordStore,
    /// Engine field conventions.
    pub config: &'a crate::config::EngineConfig,
    /// Recursive import capability.
    pub importer: &'a dyn ReferenceImporter,
    /// Current reference-resolution depth (0 for top-level items).
    pub depth: u32,
}

/// A content processor participating in one or more pipeline stages.
///
/// Per-stage handlers default to `Proceed`; a processor implements only
/// the stages it declares.
pub trait Processor: Send + Sync {
    /// Stable processor id.
    fn id(&self) -> &str;

    /// The stages this processor participates in.
    fn stages(&self) -> &[Stage];

    /// Ordering weight for a stage; lower runs first.
    fn weight(&self, _stage: Stage) -> i32 {
        0
    }

    /// Locked processors are always active regardless of explicit
    /// enablement in the pipeline configuration.
    fn locked(&self) -> bool {
        false
    }

    /// Stage 1: mutate remote data in place before the importability
    /// decision.
    fn prepare_entity_data(
        &self,
        _item: &mut RemoteItem,
        _ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        Ok(StageOutcome::Proceed)
    }

    /// Stage 2: veto import of this specific item.
    fn is_entity_importable(
        &self,
        _item: &RemoteItem,
        _ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        Ok(StageOutcome::Proceed)
    }

    /// Stage 3: final data mutation once the item is confirmed importable.
    fn prepare_importable_entity_data(
        &self,
        _item: &mut RemoteItem,
        _ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        Ok(StageOutcome::Proceed)
    }

    /// Stage 6: apply logic against the locally-resolved item.
    fn process_entity(
        &self,
        _item: &RemoteItem,
        _local: &ResolvedLocal,
        _ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        Ok(StageOutcome::Proceed)
    }

    /// Stage 8: follow-up actions that require a saved identifier.
    fn post_entity_save(
        &self,
        _item: &RemoteItem,
        _local: &ResolvedLocal,
        _local_id: LocalId,
        _ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        Ok(StageOutcome::Proceed)
    }
}

type Factory = Box<dyn Fn(&ProcessorSettings) -> Box<dyn Processor> + Send + Sync>;

/// Registry of known processor types, resolved once at startup.
///
/// Registration order is preserved and breaks weight ties.
#[derive(Default)]
pub struct ProcessorRegistry {
    factories: Vec<(String, Factory)>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor constructor under its id.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&ProcessorSettings) -> Box<dyn Processor> + Send + Sync + 'static,
    {
        self.factories.push((id.into(), Box::new(factory)));
    }

    fn instantiate(&self, id: &str, settings: &ProcessorSettings) -> Option<Arc<dyn Processor>> {
        self.factories
            .iter()
            .find(|(registered, _)| registered == id)
            .map(|(_, factory)| Arc::from(factory(settings)))
    }

    /// Resolves the active processor set for a pipeline configuration:
    /// every registered processor that is explicitly configured or locked,
    /// instantiated with its stored settings (or empty settings).
    pub fn resolve_active(
        &self,
        config: &PipelineConfig,
    ) -> Vec<(String, Arc<dyn Processor>)> {
        let empty = ProcessorSettings::new();
        let mut active = Vec::new();

        for (id, factory) in &self.factories {
            let configured = config.settings(id);
            let instance: Arc<dyn Processor> =
                Arc::from(factory(configured.unwrap_or(&empty)));
            if configured.is_some() || instance.locked() {
                active.push((id.clone(), instance));
            }
        }

        active
    }

    /// Resolves the ordered processor list for one stage, applying ad-hoc
    /// per-call overrides.
    ///
    /// An override instantiates a fresh instance for its key: if that
    /// instance supports the stage it replaces or augments the active
    /// set; if it does not, the processor is dropped from this stage even
    /// when the base configuration had it active. Overrides never touch
    /// the stored configuration.
    pub fn resolve_for_stage(
        &self,
        config: &PipelineConfig,
        stage: Stage,
        overrides: &BTreeMap<String, ProcessorSettings>,
    ) -> Vec<Arc<dyn Processor>> {
        // id → (instance, weight), insertion in registration order.
        let mut staged: Vec<(String, Arc<dyn Processor>, i32)> = self
            .resolve_active(config)
            .into_iter()
            .filter(|(_, p)| p.stages().contains(&stage))
            .map(|(id, p)| {
                let weight = p.weight(stage);
                (id, p, weight)
            })
            .collect();

        for (id, settings) in overrides {
            let Some(instance) = self.instantiate(id, settings) else {
                warn!(processor = %id, "override names an unregistered processor");
                continue;
            };

            staged.retain(|(existing, _, _)| existing != id);
            if instance.stages().contains(&stage) {
                let weight = instance.weight(stage);
                staged.push((id.clone(), instance, weight));
            }
        }

        // Stable: equal weights preserve registration/insertion order.
        staged.sort_by_key(|(_, _, weight)| *weight);
        staged.into_iter().map(|(_, p, _)| p).collect()
    }
}
