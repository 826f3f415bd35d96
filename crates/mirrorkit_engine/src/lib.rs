//! # MirrorKit Engine
//!
//! Pull-based content replication: fetches paginated resource collections
//! from a remote content system, classifies each item against local state,
//! and walks it through a weight-ordered processor pipeline down to a
//! local write, resolving cross-item references recursively along the way.
//!
//! The engine is generic over three collaborators: a [`RemoteClient`] that
//! fetches JSON documents, a [`ContentStore`] that owns local content, and
//! an [`ImportRecordStore`] that tracks replication state. In-memory
//! implementations ([`MockRemote`], [`MemoryStore`]) ship with the crate
//! for testing and embedding.
//!
//! ```no_run
//! use mirrorkit_engine::{
//!     builtin_registry, EngineConfig, ImportEngine, MemoryStore, MockRemote, PipelineConfig,
//!     RemoteConfig,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new().with_known_type("node"));
//! let engine = ImportEngine::new(
//!     MockRemote::new(),
//!     Arc::clone(&store),
//!     store,
//!     builtin_registry(),
//!     EngineConfig::new(),
//! )
//! .with_remote(RemoteConfig::new("site_a", "https://remote.example/meta"))
//! .with_pipeline(PipelineConfig::new("default"));
//!
//! let session = engine.prepare_run("site_a", "articles", "default")?;
//! let summary = engine.import_channel(&session)?;
//! println!("{summary}");
//! # Ok::<(), mirrorkit_engine::EngineError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod client;
mod config;
mod engine;
mod error;
mod pipeline;
mod processors;
mod resolve;
mod session;
mod store;

pub use classifier::{changed_timestamp, classify, Classification, SyncStatus};
pub use client::{MockRemote, RemoteClient};
pub use config::{
    EngineConfig, PipelineConfig, ProcessorSettings, RecursionDepth, RemoteConfig,
};
pub use engine::{ImportEngine, ImportSummary};
pub use error::{EngineError, EngineResult};
pub use pipeline::{
    ImportContext, Processor, ProcessorRegistry, ReferenceImporter, Stage, StageOutcome,
};
pub use processors::{
    builtin_registry, EntityReferenceProcessor, ImportRecordProcessor, LanguageFallbackProcessor,
    SkipSynchronizedProcessor,
};
pub use resolve::{denormalize, resolve_language, resolve_local, ResolvedLocal};
pub use session::ImportSession;
pub use store::{
    ContentStore, DenormalizedItem, FieldWrite, ImportRecord, ImportRecordStore, LocalHandle,
    LocalId, MemoryStore,
};
