use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::compiler::{self, Artifact};
use crate::error::BulkError;
use crate::mapping::BulkRecord;

/// Process-wide registry of compiled artifacts, keyed by record type.
///
/// Compilation runs under the map lock, so concurrent first-time callers for
/// one type trigger exactly one compile and all share the same `Arc`.
/// Failed compilations are not cached: every call against a type that has
/// never compiled successfully re-attempts and re-reports the error.
/// Entries are never evicted — the key space is the set of mapped types the
/// process uses, fixed for its lifetime.
pub struct ArtifactCache {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ArtifactCache {
    pub fn new() -> Self {
        ArtifactCache {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The default process-wide instance used by the loaders.
    pub fn global() -> &'static ArtifactCache {
        static GLOBAL: OnceLock<ArtifactCache> = OnceLock::new();
        GLOBAL.get_or_init(ArtifactCache::new)
    }

    /// Look up the artifact for `T`, compiling it on first use.
    pub fn get_or_compile<T>(&self) -> Result<Arc<Artifact<T>>, BulkError>
    where
        T: BulkRecord + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(&TypeId::of::<T>()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(record = T::type_name(), "artifact cache hit");
            if let Ok(artifact) = Arc::clone(entry).downcast::<Artifact<T>>() {
                return Ok(artifact);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(record = T::type_name(), "artifact cache miss, compiling");
        let artifact = Arc::new(compiler::compile::<T>()?);
        entries.insert(
            TypeId::of::<T>(),
            Arc::clone(&artifact) as Arc<dyn Any + Send + Sync>,
        );
        Ok(artifact)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new()
    }
}
