//! Replication-state bookkeeping after save.

use crate::config::ProcessorSettings;
use crate::error::EngineResult;
use crate::pipeline::{ImportContext, Processor, Stage, StageOutcome};
use crate::resolve::ResolvedLocal;
use crate::store::{ImportRecord, LocalId};
use chrono::Utc;
use mirrorkit_protocol::RemoteItem;
use tracing::debug;

/// Writes the Local Import Record for each saved item, recording the
/// import time and the applied update policy. Locked: the classifier's
/// preferred staleness source depends on it.
pub struct ImportRecordProcessor {
    policy: String,
    weight: i32,
}

impl ImportRecordProcessor {
    /// Processor id.
    pub const ID: &'static str = "import_record";

    const STAGES: [Stage; 1] = [Stage::PostEntitySave];

    /// Creates the processor from pipeline settings.
    pub fn new(settings: &ProcessorSettings) -> Self {
        Self {
            policy: settings.string("policy").unwrap_or("default").to_string(),
            weight: settings.integer("weight").unwrap_or(100) as i32,
        }
    }
}

impl Processor for ImportRecordProcessor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn stages(&self) -> &[Stage] {
        &Self::STAGES
    }

    fn weight(&self, _stage: Stage) -> i32 {
        self.weight
    }

    fn locked(&self) -> bool {
        true
    }

    fn post_entity_save(
        &self,
        item: &RemoteItem,
        local: &ResolvedLocal,
        _local_id: LocalId,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        let entity_type = match item.type_id() {
            Ok(type_id) => type_id.entity_type,
            Err(_) => return Ok(StageOutcome::Proceed),
        };

        ctx.records.put(ImportRecord {
            uuid: item.id,
            language: local.language.clone(),
            entity_type,
            last_import: Utc::now(),
            policy: self.policy.clone(),
        })?;

        debug!(item = %item.id, language = %local.language, "wrote import record");
        Ok(StageOutcome::Proceed)
    }
}
