//! Per-test cache of configured clients.
//!
//! Terraform configures the provider many times over a single test. Each
//! reconfiguration would build a new client and lose the interactions already
//! captured, so intercepted clients are built once per test and cassette and
//! reused until the test finishes.

use super::recorder::Recorder;
use crate::client::OktaClient;
use crate::errors::OktaResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies the client of one test playing or recording one cassette.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CassetteKey {
    /// Test name.
    pub test: String,
    /// Cassette name.
    pub cassette: String,
}

impl CassetteKey {
    /// Creates a key.
    pub fn new(test: impl Into<String>, cassette: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            cassette: cassette.into(),
        }
    }
}

impl fmt::Display for CassetteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.test, self.cassette)
    }
}

/// A configured client and, when recording, its recorder.
#[derive(Debug, Clone)]
pub struct CachedClient {
    /// The intercepted client.
    pub client: Arc<OktaClient>,
    /// Recorder installed as the client's transport.
    pub recorder: Option<Arc<Recorder>>,
}

/// Clients keyed by [`CassetteKey`].
#[derive(Debug, Default)]
pub struct ClientCache {
    entries: RwLock<HashMap<CassetteKey, CachedClient>>,
}

impl ClientCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for `key`.
    pub fn get(&self, key: &CassetteKey) -> Option<CachedClient> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the cached entry, building and inserting it first if absent.
    /// If another caller inserts concurrently, its entry wins.
    pub fn get_or_try_insert_with<F>(
        &self,
        key: &CassetteKey,
        build: F,
    ) -> OktaResult<CachedClient>
    where
        F: FnOnce() -> OktaResult<CachedClient>,
    {
        if let Some(entry) = self.get(key) {
            return Ok(entry);
        }

        let built = build()?;
        let mut entries = self.entries.write();
        Ok(entries.entry(key.clone()).or_insert(built).clone())
    }

    /// Removes and returns the entry for `key`.
    pub fn evict(&self, key: &CassetteKey) -> Option<CachedClient> {
        self.entries.write().remove(key)
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
