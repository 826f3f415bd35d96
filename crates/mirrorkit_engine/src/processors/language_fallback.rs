//! Normalizes the language attribute before the importability decision.

use crate::config::ProcessorSettings;
use crate::error::EngineResult;
use crate::pipeline::{ImportContext, Processor, Stage, StageOutcome};
use mirrorkit_protocol::RemoteItem;
use serde_json::{json, Value};
use tracing::debug;

/// Fills a missing, null or empty language attribute with the
/// unspecified-language sentinel, so every later stage sees a usable
/// language code. Locked: runs in every pipeline.
pub struct LanguageFallbackProcessor {
    weight: i32,
}

impl LanguageFallbackProcessor {
    /// Processor id.
    pub const ID: &'static str = "language_fallback";

    const STAGES: [Stage; 1] = [Stage::PrepareEntityData];

    /// Creates the processor from pipeline settings.
    pub fn new(settings: &ProcessorSettings) -> Self {
        Self {
            weight: settings.integer("weight").unwrap_or(-10) as i32,
        }
    }
}

impl Processor for LanguageFallbackProcessor {
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

    fn prepare_entity_data(
        &self,
        item: &mut RemoteItem,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        let public = match item.type_id() {
            Ok(type_id) => ctx
                .session
                .field_mappings
                .public_name(&type_id.entity_type, &type_id.bundle, &ctx.config.language_field)
                .unwrap_or(&ctx.config.language_field)
                .to_string(),
            Err(_) => ctx.config.language_field.clone(),
        };

        let usable = matches!(item.attribute(&public), Some(Value::String(code)) if !code.is_empty());
        if !usable {
            debug!(item = %item.id, "no usable language, applying sentinel");
            item.set_attribute(public, json!(ctx.config.unspecified_language.clone()));
        }

        Ok(StageOutcome::Proceed)
    }
}
