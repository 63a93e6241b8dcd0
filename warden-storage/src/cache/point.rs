//! Read-through point cache keyed by locator digest.

use super::config::CacheConfig;
use super::read::CacheRead;
use super::registry::{CacheRegistry, Registration};
use super::sweep::TtlSweep;
use super::traits::{CacheProvider, CacheStats, StatCounters};
use crate::{Locator, RecordReader};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::debug;
use warden_core::{Clock, IndexEntry, Record, SystemClock, WardenResult};

#[derive(Debug, Clone)]
struct CachedRecord {
    record: Record,
    cached_at: DateTime<Utc>,
}

/// Read-through cache in front of a [`RecordReader`].
///
/// Callers always receive copies; the cached instance is never handed out.
pub struct CachedReader {
    inner: Arc<dyn RecordReader>,
    entries: DashMap<String, CachedRecord>,
    config: CacheConfig,
    sweep: TtlSweep,
    clock: Arc<dyn Clock>,
    counters: StatCounters,
    registration: Registration,
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CachedReader {
    pub fn new(
        inner: Arc<dyn RecordReader>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Self::with_clock(inner, registry, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn RecordReader>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let provider: Weak<dyn CacheProvider> = me.clone();
            Self {
                inner,
                entries: DashMap::new(),
                sweep: TtlSweep::new(config.max_age, Arc::clone(&clock)),
                config,
                clock,
                counters: StatCounters::default(),
                registration: Registration::new(registry, provider),
            }
        })
    }

    /// Read with hit/miss metadata.
    pub fn read_with_meta(&self, locator: &Locator) -> WardenResult<Option<CacheRead<Record>>> {
        self.sweep_if_due();
        let key = locator.digest();

        if let Some(entry) = self.entries.get(&key) {
            self.counters.hit();
            return Ok(Some(CacheRead::from_cache(
                entry.record.clone(),
                entry.cached_at,
            )));
        }

        self.counters.miss();
        let Some(record) = self.inner.read(locator)? else {
            return Ok(None);
        };
        let now = self.clock.now();
        self.admit(
            key,
            CachedRecord {
                record: record.clone(),
                cached_at: now,
            },
        );
        Ok(Some(CacheRead::from_storage(record, now)))
    }

    /// Deregister from the provider registry and drop all entries.
    pub fn close(&self) {
        self.registration.release();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn admit(&self, key: String, entry: CachedRecord) {
        if self.entries.len() >= self.config.max_entries {
            debug!(
                cache = self.name(),
                max_entries = self.config.max_entries,
                "Point cache full; clearing"
            );
            self.clear_all();
        }
        self.entries.insert(key, entry);
    }

    fn sweep_if_due(&self) {
        if self.sweep.due() {
            debug!(cache = self.name(), "Point cache expired; clearing");
            self.clear_entries();
        }
    }

    fn clear_entries(&self) {
        let n = self.entries.len();
        self.entries.clear();
        self.counters.evicted(n);
    }

    fn retain(&self, keep: impl Fn(&Record) -> bool) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| keep(&entry.record));
        self.counters
            .evicted(before.saturating_sub(self.entries.len()));
    }
}

impl RecordReader for CachedReader {
    fn read(&self, locator: &Locator) -> WardenResult<Option<Record>> {
        Ok(self.read_with_meta(locator)?.map(CacheRead::into_value))
    }
}

impl CacheProvider for CachedReader {
    fn name(&self) -> &str {
        "point"
    }

    fn clear_all(&self) {
        self.clear_entries();
        self.sweep.reset();
    }

    fn clear_key(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.counters.evicted(1);
        }
    }

    fn clear_model(&self, model: &str) {
        self.retain(|r| r.model() != model);
    }

    fn clear_record(&self, record: &Record) {
        self.retain(|r| !r.identity_matches(record));
    }

    fn clear_index(&self, entry: &IndexEntry) {
        self.retain(|r| !entry.matches(r));
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
