//! Vetoes items the classifier reports as already synchronized.

use crate::classifier::{classify, SyncStatus};
use crate::config::ProcessorSettings;
use crate::error::EngineResult;
use crate::pipeline::{ImportContext, Processor, Stage, StageOutcome};
use mirrorkit_protocol::RemoteItem;
use tracing::debug;

/// Short-circuits the pipeline for items whose remote data has not changed
/// since the last import. The first veto wins; later processors never see
/// the item.
pub struct SkipSynchronizedProcessor {
    weight: i32,
}

impl SkipSynchronizedProcessor {
    /// Processor id.
    pub const ID: &'static str = "skip_synchronized";

    const STAGES: [Stage; 1] = [Stage::IsEntityImportable];

    /// Creates the processor from pipeline settings.
    pub fn new(settings: &ProcessorSettings) -> Self {
        Self {
            weight: settings.integer("weight").unwrap_or(0) as i32,
        }
    }
}

impl Processor for SkipSynchronizedProcessor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn stages(&self) -> &[Stage] {
        &Self::STAGES
    }

    fn weight(&self, _stage: Stage) -> i32 {
        self.weight
    }

    fn is_entity_importable(
        &self,
        item: &RemoteItem,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        let classification = classify(
            ctx.store,
            ctx.records,
            ctx.config,
            &ctx.session.field_mappings,
            item,
        )?;

        if classification.status == SyncStatus::Synchronized {
            debug!(item = %item.id, "already synchronized, vetoing import");
            return Ok(StageOutcome::Skip("already synchronized".into()));
        }

        Ok(StageOutcome::Proceed)
    }
}
