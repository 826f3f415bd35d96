//! Recursive resolution of entity references.

use crate::config::{ProcessorSettings, RecursionDepth};
use crate::error::EngineResult;
use crate::pipeline::{ImportContext, Processor, Stage, StageOutcome};
use crate::resolve::ResolvedLocal;
use mirrorkit_protocol::{Relationship, RemoteItem};
use tracing::{debug, warn};

/// Imports the targets of an item's relationships through the injected
/// resolve-or-import capability, bounded by `max_recursion_depth`.
///
/// In the prepare stage, references whose target type cannot be handled
/// locally are dropped so the process stage only sees resolvable ones.
pub struct EntityReferenceProcessor {
    depth: RecursionDepth,
    weight: i32,
}

impl EntityReferenceProcessor {
    /// Processor id.
    pub const ID: &'static str = "entity_reference";

    const STAGES: [Stage; 2] = [Stage::PrepareImportableEntityData, Stage::ProcessEntity];

    /// Creates the processor from pipeline settings.
    ///
    /// `max_recursion_depth` follows the engine-wide convention: negative
    /// means unlimited, zero disables resolution, positive N resolves N
    /// hops.
    pub fn new(settings: &ProcessorSettings) -> Self {
        Self {
            depth: settings
                .integer("max_recursion_depth")
                .map(RecursionDepth::from_setting)
                .unwrap_or_default(),
            weight: settings.integer("weight").unwrap_or(0) as i32,
        }
    }
}

impl Processor for EntityReferenceProcessor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn stages(&self) -> &[Stage] {
        &Self::STAGES
    }

    fn weight(&self, _stage: Stage) -> i32 {
        self.weight
    }

    fn prepare_importable_entity_data(
        &self,
        item: &mut RemoteItem,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        for (name, relationship) in item.relationships.iter_mut() {
            let resolvable = |r: &mirrorkit_protocol::ItemRef| match r.item_type.parse::<mirrorkit_protocol::EntityTypeId>() {
                Ok(type_id) => ctx.store.is_known_type(&type_id.entity_type),
                Err(_) => false,
            };

            let dropped = match relationship {
                Relationship::Empty => 0,
                Relationship::One(r) => {
                    if resolvable(r) {
                        0
                    } else {
                        *relationship = Relationship::Empty;
                        1
                    }
                }
                Relationship::Many(rs) => {
                    let before = rs.len();
                    rs.retain(|r| resolvable(r));
                    before - rs.len()
                }
            };

            if dropped > 0 {
                warn!(
                    item = %item.id,
                    relationship = %name,
                    dropped,
                    "dropped references with no locally known target type"
                );
            }
        }

        Ok(StageOutcome::Proceed)
    }

    fn process_entity(
        &self,
        item: &RemoteItem,
        _local: &ResolvedLocal,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        if !self.depth.allows(ctx.depth) {
            debug!(item = %item.id, depth = ctx.depth, "recursion depth reached, not resolving references");
            return Ok(StageOutcome::Proceed);
        }

        for (name, relationship) in &item.relationships {
            for reference in relationship.refs() {
                match ctx
                    .importer
                    .resolve_or_import(ctx.session, reference, ctx.depth)
                {
                    Ok(Some(local_id)) => {
                        debug!(
                            item = %item.id,
                            relationship = %name,
                            target = %reference.id,
                            %local_id,
                            "resolved reference"
                        );
                    }
                    Ok(None) => {
                        debug!(
                            item = %item.id,
                            relationship = %name,
                            target = %reference.id,
                            "reference target not imported"
                        );
                    }
                    Err(err) => {
                        // Contained per reference; the item itself still imports.
                        warn!(
                            item = %item.id,
                            relationship = %name,
                            target = %reference.id,
                            error = %err,
                            "failed to resolve reference"
                        );
                    }
                }
            }
        }

        Ok(StageOutcome::Proceed)
    }
}
