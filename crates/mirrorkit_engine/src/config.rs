//! Configuration for synchronization runs.
//!
//! Every type here derives `Deserialize` so pipeline and remote
//! definitions can be loaded straight from configuration files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-processor settings taken from a pipeline configuration.
///
/// Settings are a free-form JSON object; processors read the keys they
/// understand through the typed getters and fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorSettings {
    values: Map<String, Value>,
}

impl ProcessorSettings {
    /// Creates empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates settings from a JSON object value; anything else is empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Sets one setting value.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Reads an integer setting.
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    /// Reads a string setting.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Reads a boolean setting.
    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }
}

/// A named pipeline configuration: the set of enabled processors and their
/// per-processor settings for one synchronization setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Configuration id.
    pub id: String,
    /// Enabled processors keyed by processor id.
    #[serde(default)]
    pub processors: BTreeMap<String, ProcessorSettings>,
}

impl PipelineConfig {
    /// Creates an empty pipeline configuration.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            processors: BTreeMap::new(),
        }
    }

    /// Enables a processor with the given settings.
    pub fn with_processor(mut self, id: impl Into<String>, settings: ProcessorSettings) -> Self {
        self.processors.insert(id.into(), settings);
        self
    }

    /// Returns the stored settings for a processor, if it is enabled.
    pub fn settings(&self, processor_id: &str) -> Option<&ProcessorSettings> {
        self.processors.get(processor_id)
    }
}

/// Maximum depth for recursive reference resolution.
///
/// The one authoritative convention: a negative configured value means
/// unlimited, zero means do not resolve references at all, and a positive
/// `N` means resolve `N` hops from the originating item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionDepth {
    /// Follow references without bound (cycle guard still terminates).
    Unlimited,
    /// Do not resolve references at all.
    None,
    /// Resolve up to this many hops.
    Hops(u32),
}

impl RecursionDepth {
    /// Decodes the signed-integer setting convention.
    pub fn from_setting(value: i64) -> Self {
        match value {
            v if v < 0 => RecursionDepth::Unlimited,
            0 => RecursionDepth::None,
            v => RecursionDepth::Hops(v as u32),
        }
    }

    /// Returns true if resolution may proceed at the given hop depth
    /// (zero-based: the first hop away from the originating item is 0).
    pub fn allows(&self, depth: u32) -> bool {
        match self {
            RecursionDepth::Unlimited => true,
            RecursionDepth::None => false,
            RecursionDepth::Hops(max) => depth < *max,
        }
    }
}

impl Default for RecursionDepth {
    fn default() -> Self {
        RecursionDepth::Hops(1)
    }
}

/// One configured remote content system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote id.
    pub id: String,
    /// URL of the remote metadata endpoint.
    pub metadata_url: String,
    /// Maximum number of identifiers per uuid-filter request.
    #[serde(default = "default_uuid_batch_limit")]
    pub uuid_batch_limit: usize,
}

fn default_uuid_batch_limit() -> usize {
    50
}

impl RemoteConfig {
    /// Creates a new remote configuration.
    pub fn new(id: impl Into<String>, metadata_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata_url: metadata_url.into(),
            uuid_batch_limit: default_uuid_batch_limit(),
        }
    }

    /// Sets the uuid batch limit.
    pub fn with_uuid_batch_limit(mut self, limit: usize) -> Self {
        self.uuid_batch_limit = limit;
        self
    }
}

/// Field-convention knobs shared by all runs of one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Internal name of the language field.
    pub language_field: String,
    /// Sentinel language code for items without a usable language.
    pub unspecified_language: String,
    /// Internal name of the changed-timestamp field.
    pub changed_field: String,
    /// Page limit used when a channel does not dictate one.
    pub default_page_limit: u64,
}

impl EngineConfig {
    /// Creates a configuration with conventional defaults.
    pub fn new() -> Self {
        Self {
            language_field: "langcode".into(),
            unspecified_language: "und".into(),
            changed_field: "changed".into(),
            default_page_limit: 50,
        }
    }

    /// Sets the internal language field name.
    pub fn with_language_field(mut self, name: impl Into<String>) -> Self {
        self.language_field = name.into();
        self
    }

    /// Sets the unspecified-language sentinel.
    pub fn with_unspecified_language(mut self, code: impl Into<String>) -> Self {
        self.unspecified_language = code.into();
        self
    }

    /// Sets the internal changed-timestamp field name.
    pub fn with_changed_field(mut self, name: impl Into<String>) -> Self {
        self.changed_field = name.into();
        self
    }

    /// Sets the default page limit.
    pub fn with_default_page_limit(mut self, limit: u64) -> Self {
        self.default_page_limit = limit;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
