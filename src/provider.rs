//! In-memory materialized view over the coverage store.
//!
//! The provider is the sole mutator of its cache, and the whole
//! read-merge-write composite for an upload runs inside one mutex
//! acquisition. Concurrent uploads for the same (repository, revision)
//! therefore linearize, which is what prevents a lost update; the merge
//! itself is order-independent (see `merge`).

use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::Result;
use crate::merge::merge_coverage;
use crate::model::Coverage;
use crate::store::CoverageStore;

const LOCK_MSG: &str = "coverage cache lock poisoned";

pub struct CoverageProvider<S: CoverageStore> {
    store: S,
    cache: Mutex<Vec<Coverage>>,
}

impl<S: CoverageStore> CoverageProvider<S> {
    /// Build a provider over `store`, loading its full contents into the
    /// cache.
    pub fn new(store: S) -> Result<Self> {
        let cache = store.list_all()?;
        info!(count = cache.len(), "loaded coverages from store");
        Ok(Self {
            store,
            cache: Mutex::new(cache),
        })
    }

    /// Read-only snapshot of every cached coverage.
    pub fn coverages(&self) -> Vec<Coverage> {
        self.cache.lock().expect(LOCK_MSG).clone()
    }

    /// Cached coverages for one repository.
    pub fn list(&self, repo_id: i64) -> Vec<Coverage> {
        self.cache
            .lock()
            .expect(LOCK_MSG)
            .iter()
            .filter(|c| c.repo_id == repo_id)
            .cloned()
            .collect()
    }

    /// Fetch one coverage by id: cache first, store on a miss.
    pub fn find(&self, id: i64) -> Result<Option<Coverage>> {
        {
            let cache = self.cache.lock().expect(LOCK_MSG);
            if let Some(cov) = cache.iter().find(|c| c.id == id) {
                return Ok(Some(cov.clone()));
            }
        }
        self.store.find(id)
    }

    /// Add a new upload: find any stored coverage for the same
    /// (repository, revision), merge into it if present, persist, and
    /// replace the cache entry atomically. Returns the stored result.
    pub fn add_coverage(&self, cov: Coverage) -> Result<Coverage> {
        let mut cache = self.cache.lock().expect(LOCK_MSG);

        let mut merged = match self.store.find_revision(cov.repo_id, &cov.revision)? {
            Some(found) => {
                debug!(
                    id = found.id,
                    revision = %found.revision,
                    "merging upload into existing coverage"
                );
                merge_coverage(&found, &cov)?
            }
            None => cov,
        };

        self.store.put(&mut merged)?;

        // Cache entries are keyed by identity, not index.
        match cache
            .iter_mut()
            .find(|c| c.repo_id == merged.repo_id && c.revision == merged.revision)
        {
            Some(slot) => *slot = merged.clone(),
            None => cache.push(merged.clone()),
        }

        Ok(merged)
    }
}
