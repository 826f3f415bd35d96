//! Built-in content processors.
//!
//! These cover the stock behaviors every synchronization setup needs:
//! language normalization, skip-if-synchronized vetoes, recursive
//! entity-reference resolution, and import-record bookkeeping. Site
//! specific processors (file transfer, alias generation, rich-text
//! rewriting, ...) implement the same [`Processor`](crate::Processor)
//! contract and register alongside them.

mod entity_reference;
mod import_record;
mod language_fallback;
mod skip_synchronized;

pub use entity_reference::EntityReferenceProcessor;
pub use import_record::ImportRecordProcessor;
pub use language_fallback::LanguageFallbackProcessor;
pub use skip_synchronized::SkipSynchronizedProcessor;

use crate::pipeline::ProcessorRegistry;

/// Builds a registry holding every built-in processor.
pub fn builtin_registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register(LanguageFallbackProcessor::ID, |s| {
        Box::new(LanguageFallbackProcessor::new(s))
    });
    registry.register(SkipSynchronizedProcessor::ID, |s| {
        Box::new(SkipSynchronizedProcessor::new(s))
    });
    registry.register(EntityReferenceProcessor::ID, |s| {
        Box::new(EntityReferenceProcessor::new(s))
    });
    registry.register(ImportRecordProcessor::ID, |s| {
        Box::new(ImportRecordProcessor::new(s))
    });
    registry
}
