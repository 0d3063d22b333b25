use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use storyreel_core::hash::{hash_source, ContentHash};
use storyreel_core::RenderResult;

use crate::bundle::Bundle;

/// Compiled bundles keyed by the hash of their source.
///
/// A template whose file changes hashes differently, so stale entries are
/// never served; they are simply never hit again.
#[derive(Debug)]
pub struct BundleCache {
    enabled: bool,
    entries: Mutex<HashMap<ContentHash, Arc<Bundle>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BundleCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached bundle for `source`, compiling it on a miss.
    /// Compile errors are not cached.
    pub fn get_or_compile(&self, label: &str, source: &str) -> RenderResult<Arc<Bundle>> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Bundle::compile(label, source).map(Arc::new);
        }

        let key = hash_source(source);
        if let Some(bundle) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(template = label, hash = %key, "bundle cache hit");
            return Ok(bundle.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let bundle = Arc::new(Bundle::compile(label, source)?);
        self.entries.lock().insert(key, bundle.clone());
        tracing::debug!(template = label, hash = %key, "bundle compiled and cached");
        Ok(bundle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
