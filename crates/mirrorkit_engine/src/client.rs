//! Remote access abstraction.
//!
//! The engine treats the remote as a "perform request, get
//! response-or-failure" capability. Implement [`RemoteClient`] over the
//! HTTP library of your choice (reqwest, ureq, ...); authentication and
//! token refresh live behind that implementation, not here.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

/// A client able to fetch JSON documents from a remote content system.
pub trait RemoteClient: Send + Sync {
    /// Performs a GET request and returns the decoded JSON body.
    fn get(&self, url: &str) -> EngineResult<Value>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

impl<T: RemoteClient + ?Sized> RemoteClient for std::sync::Arc<T> {
    fn get(&self, url: &str) -> EngineResult<Value> {
        (**self).get(url)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

/// A mock remote for testing: canned JSON responses keyed by URL.
#[derive(Default)]
pub struct MockRemote {
    responses: Mutex<BTreeMap<String, Value>>,
    failures: Mutex<BTreeMap<String, String>>,
    requested: Mutex<Vec<String>>,
}

impl MockRemote {
    /// Creates a new mock remote with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response body for a URL.
    pub fn set_response(&self, url: impl Into<String>, body: Value) {
        self.responses.lock().insert(url.into(), body);
    }

    /// Makes a URL fail with a retryable transport error.
    pub fn set_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        self.failures.lock().insert(url.into(), message.into());
    }

    /// Returns every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl RemoteClient for MockRemote {
    fn get(&self, url: &str) -> EngineResult<Value> {
        self.requested.lock().push(url.to_string());

        if let Some(message) = self.failures.lock().get(url) {
            return Err(EngineError::transport_retryable(message.clone()));
        }

        self.responses
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| EngineError::transport_fatal(format!("no mock response for {url}")))
    }
}
