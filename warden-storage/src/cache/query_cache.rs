//! Two-level read-through query cache: model bucket, then query hash.
//!
//! A hit is only trusted if the cached result was produced for the same
//! model as the incoming query. Anything else is treated as corruption:
//! both the lookup hash and the hash recorded on the stale result are
//! evicted and the query runs live.
//!
//! Check, live fetch, and store are individually synchronized but not atomic
//! as a sequence. Two concurrent misses on one hash both query the backend and
//! both store; results for an identical hash are interchangeable, so the last
//! store wins without harm.

use super::config::CacheConfig;
use super::registry::{CacheRegistry, Registration};
use super::sweep::TtlSweep;
use super::traits::{CacheProvider, CacheStats, StatCounters};
use crate::RecordSearch;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use warden_core::{
    CacheError, Clock, IndexEntry, Query, QueryResult, Record, SystemClock, WardenResult,
};

/// Query cache in front of a [`RecordSearch`].
pub struct CachedSearch {
    inner: Arc<dyn RecordSearch>,
    buckets: DashMap<String, HashMap<String, QueryResult>>,
    config: CacheConfig,
    sweep: TtlSweep,
    counters: StatCounters,
    registration: Registration,
}

impl std::fmt::Debug for CachedSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSearch")
            .field("models", &self.buckets.len())
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CachedSearch {
    pub fn new(
        inner: Arc<dyn RecordSearch>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Self::with_clock(inner, registry, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn RecordSearch>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let provider: Weak<dyn CacheProvider> = me.clone();
            Self {
                inner,
                buckets: DashMap::new(),
                sweep: TtlSweep::new(config.max_age, clock),
                config,
                counters: StatCounters::default(),
                registration: Registration::new(registry, provider),
            }
        })
    }

    /// Total cached results across all models.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deregister from the provider registry and drop all entries.
    pub fn close(&self) {
        self.registration.release();
        self.buckets.clear();
    }

    /// Admit `result` under `query`'s model bucket at `hash`.
    ///
    /// Empty results and queries that did not opt in are skipped. A result
    /// whose model differs from the query's is refused with an error.
    pub fn admit(&self, query: &Query, hash: &str, result: &QueryResult) -> Result<(), CacheError> {
        if result.model != query.model {
            return Err(CacheError::AdmissionRejected {
                query_model: query.model.clone(),
                result_model: result.model.clone(),
            });
        }
        if !query.cache_enabled || result.is_empty() {
            return Ok(());
        }
        if self.len() >= self.config.max_entries {
            debug!(
                cache = self.name(),
                max_entries = self.config.max_entries,
                "Query cache full; clearing"
            );
            self.clear_all();
        }
        self.buckets
            .entry(query.model.clone())
            .or_default()
            .insert(hash.to_string(), result.clone());
        Ok(())
    }

    fn lookup(&self, model: &str, hash: &str) -> Option<QueryResult> {
        self.buckets
            .get(model)
            .and_then(|bucket| bucket.get(hash).cloned())
    }

    fn evict(&self, model: &str, hash: &str) -> bool {
        let removed = self
            .buckets
            .get_mut(model)
            .is_some_and(|mut bucket| bucket.remove(hash).is_some());
        if removed {
            self.counters.evicted(1);
        }
        removed
    }

    fn retain(&self, models: &[String], keep: impl Fn(&QueryResult) -> bool) {
        let mut evicted = 0;
        for model in models {
            if let Some(mut bucket) = self.buckets.get_mut(model) {
                let before = bucket.len();
                bucket.retain(|_, result| keep(result));
                evicted += before - bucket.len();
            }
        }
        self.counters.evicted(evicted);
    }

    fn sweep_if_due(&self) {
        if self.sweep.due() {
            debug!(cache = self.name(), "Query cache expired; clearing");
            self.clear_buckets();
        }
    }

    fn clear_buckets(&self) {
        let n = self.len();
        self.buckets.clear();
        self.counters.evicted(n);
    }
}

impl RecordSearch for CachedSearch {
    fn find(&self, query: &Query) -> WardenResult<QueryResult> {
        self.sweep_if_due();
        if !query.cache_enabled {
            return self.inner.find(query);
        }

        let hash = query.hash();
        if let Some(hit) = self.lookup(&query.model, &hash) {
            if hit.model == query.model {
                self.counters.hit();
                return Ok(hit);
            }
            self.counters.collision();
            warn!(
                query_model = %query.model,
                cached_model = %hit.model,
                hash = %hash,
                stale_hash = %hit.query_hash,
                "Query cache collision; evicting and querying live"
            );
            self.evict(&query.model, &hash);
            self.evict(&query.model, &hit.query_hash);
            self.evict(&hit.model, &hit.query_hash);
        }

        self.counters.miss();
        let live = self.inner.find(query)?;
        self.admit(query, &hash, &live)?;
        Ok(live)
    }

    fn count(&self, query: &Query) -> WardenResult<u64> {
        self.inner.count(query)
    }
}

impl CacheProvider for CachedSearch {
    fn name(&self) -> &str {
        "query"
    }

    fn clear_all(&self) {
        self.clear_buckets();
        self.sweep.reset();
    }

    fn clear_key(&self, key: &str) {
        let mut evicted = 0;
        for mut bucket in self.buckets.iter_mut() {
            if bucket.value_mut().remove(key).is_some() {
                evicted += 1;
            }
        }
        self.counters.evicted(evicted);
    }

    fn clear_model(&self, model: &str) {
        if let Some((_, bucket)) = self.buckets.remove(model) {
            self.counters.evicted(bucket.len());
        }
    }

    /// Linear scan of the record's model and ancestor buckets.
    fn clear_record(&self, record: &Record) {
        let models = record.schema().ancestors().to_vec();
        self.retain(&models, |result| {
            !may_contain(result, |r| r.identity_matches(record))
        });
    }

    fn clear_index(&self, entry: &IndexEntry) {
        self.retain(std::slice::from_ref(&entry.model), |result| {
            !may_contain(result, |r| entry.matches(r))
        });
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}

/// Whether a write to a row matching `hit` can change `result`.
///
/// A page depends on rows outside it, and a row without populated identity
/// cannot be ruled out, so both count as affected.
fn may_contain(result: &QueryResult, hit: impl Fn(&Record) -> bool) -> bool {
    result.query.range.is_some()
        || result
            .results
            .iter()
            .any(|r| !r.is_identity_record() || hit(r))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryStore, InvalidatingWriter, RecordWriter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use warden_core::{
        FieldDef, ManualClock, ModelDefinition, SchemaRegistry, ValueKind, WardenError,
    };

    struct CountingSearch {
        store: Arc<InMemoryStore>,
        finds: AtomicUsize,
    }

    impl RecordSearch for CountingSearch {
        fn find(&self, query: &Query) -> WardenResult<QueryResult> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.store.find(query)
        }
    }

    /// Backend that labels every result with a fixed model.
    struct MislabelingSearch(String);

    impl RecordSearch for MislabelingSearch {
        fn find(&self, query: &Query) -> WardenResult<QueryResult> {
            let mut result = QueryResult::new(query.clone(), Vec::new());
            result.model = self.0.clone();
            Ok(result)
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        SchemaRegistry::builder()
            .model(
                ModelDefinition::new("common")
                    .field(FieldDef::new("id", ValueKind::Long).identity())
                    .field(FieldDef::new("name", ValueKind::String))
                    .field(FieldDef::new("status", ValueKind::String)),
            )
            .model(ModelDefinition::new("user").inherits("common"))
            .model(ModelDefinition::new("document").inherits("common"))
            .build()
            .unwrap()
    }

    fn backend(reg: &Arc<SchemaRegistry>) -> Arc<CountingSearch> {
        let store = Arc::new(InMemoryStore::new());
        for (model, name) in [("user", "alice"), ("user", "bob"), ("document", "alice")] {
            let mut r = reg.new_record(model).unwrap();
            r.set("name", name).unwrap();
            r.set("status", "old").unwrap();
            store.create(&mut r).unwrap();
        }
        Arc::new(CountingSearch {
            store,
            finds: AtomicUsize::new(0),
        })
    }

    fn alice_query() -> Query {
        Query::new("user").field("name", "alice")
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());

        let first = cache.find(&alice_query()).unwrap();
        let second = cache.find(&alice_query()).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.finds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_uncached_query_bypasses() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());
        let query = alice_query().cached(false);
        cache.find(&query).unwrap();
        cache.find(&query).unwrap();
        assert_eq!(backend.finds.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_results_not_admitted() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());
        let query = Query::new("user").field("name", "nobody");
        cache.find(&query).unwrap();
        cache.find(&query).unwrap();
        assert_eq!(backend.finds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_admission_rejects_wrong_model() {
        let cache = CachedSearch::new(
            Arc::new(MislabelingSearch("document".to_string())),
            CacheRegistry::new(),
            CacheConfig::default(),
        );
        let err = cache.find(&alice_query()).unwrap_err();
        assert!(matches!(
            err,
            WardenError::Cache(CacheError::AdmissionRejected { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_model_hit_is_evicted_and_requeried() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());

        let doc_query = Query::new("document").field("name", "alice");
        let doc_result = backend.store.find(&doc_query).unwrap();
        let user_hash = alice_query().hash();

        // Plant a document result in the user bucket at the user query's hash.
        cache
            .buckets
            .entry("user".to_string())
            .or_default()
            .insert(user_hash.clone(), doc_result.clone());
        cache
            .buckets
            .entry("user".to_string())
            .or_default()
            .insert(doc_result.query_hash.clone(), doc_result.clone());

        let live = cache.find(&alice_query()).unwrap();
        assert_eq!(live.model, "user");
        assert_eq!(live.first().unwrap().model(), "user");
        assert_eq!(backend.finds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().collisions, 1);

        let user_bucket = cache.buckets.get("user").unwrap();
        assert!(!user_bucket.contains_key(&doc_result.query_hash));
        assert_eq!(user_bucket.get(&user_hash).unwrap().model, "user");
    }

    #[test]
    fn test_same_hash_different_models_do_not_mix() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());

        let user = cache.find(&alice_query()).unwrap();
        let doc_query = Query::new("document").field("name", "alice");
        let doc = cache.find(&doc_query).unwrap();

        // Force both into one slot name in their own buckets.
        cache
            .buckets
            .entry("document".to_string())
            .or_default()
            .insert(user.query_hash.clone(), doc.clone());

        let again = cache.find(&alice_query()).unwrap();
        assert_eq!(again.model, "user");
        assert!(again.results.iter().all(|r| r.model() == "user"));
    }

    #[test]
    fn test_clear_record_evicts_results_containing_it() {
        let reg = registry();
        let backend = backend(&reg);
        let registry = CacheRegistry::new();
        let cache = CachedSearch::new(backend.clone(), registry.clone(), CacheConfig::default());

        let alice = cache.find(&alice_query()).unwrap();
        cache.find(&Query::new("user").field("name", "bob")).unwrap();
        assert_eq!(cache.len(), 2);

        registry.clear_by_record(alice.first().unwrap());
        assert_eq!(cache.len(), 1);

        cache.find(&alice_query()).unwrap();
        assert_eq!(backend.finds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_projected_result_evicted_on_update() {
        let reg = registry();
        let backend = backend(&reg);
        let registry = CacheRegistry::new();
        let cache = CachedSearch::new(backend.clone(), registry.clone(), CacheConfig::default());
        let writer = InvalidatingWriter::new(backend.store.clone(), registry);
        let projected = alice_query().select(["status"]);

        let first = cache.find(&projected).unwrap();
        assert_eq!(first.first().unwrap().get::<String>("status").unwrap(), "old");

        let mut alice = backend.store.find(&alice_query()).unwrap().into_first().unwrap();
        alice.set("status", "new").unwrap();
        assert!(writer.update(&alice).unwrap());

        let after = cache.find(&projected).unwrap();
        assert_eq!(after.first().unwrap().get::<String>("status").unwrap(), "new");
        assert_eq!(backend.finds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rows_without_identity_are_evicted_by_record() {
        let reg = registry();
        let backend = backend(&reg);
        let registry = CacheRegistry::new();
        let cache = CachedSearch::new(backend.clone(), registry.clone(), CacheConfig::default());

        let live = backend.store.find(&alice_query()).unwrap();
        let alice = live.first().unwrap().clone();
        let stripped = QueryResult::new(alice_query(), vec![alice.copy_fields(&["status"])]);
        cache.admit(&alice_query(), &alice_query().hash(), &stripped).unwrap();
        cache.find(&Query::new("user").field("name", "bob")).unwrap();
        assert_eq!(cache.len(), 2);

        registry.clear_by_record(&alice);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cached_page_evicted_when_other_row_deleted() {
        let reg = registry();
        let backend = backend(&reg);
        let registry = CacheRegistry::new();
        let cache = CachedSearch::new(backend.clone(), registry.clone(), CacheConfig::default());
        let writer = InvalidatingWriter::new(backend.store.clone(), registry);
        let second_page = Query::new("user").range(1, 1);

        let page = cache.find(&second_page).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.total_count, 2);
        assert_eq!(page.first().unwrap().get::<String>("name").unwrap(), "bob");

        let alice = backend.store.find(&alice_query()).unwrap().into_first().unwrap();
        assert!(writer.delete(&alice).unwrap());

        let page = cache.find(&second_page).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_count, 1);
        assert_eq!(backend.finds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_index_and_model() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());
        let bob = cache.find(&Query::new("user").field("name", "bob")).unwrap();
        cache.find(&alice_query()).unwrap();

        let bob_id = bob.first().unwrap().get::<i64>("id").unwrap();
        cache.clear_index(&IndexEntry::new("user").with("id", bob_id));
        assert_eq!(cache.len(), 1);

        cache.clear_model("user");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_sweep_clears_all_models() {
        let reg = registry();
        let backend = backend(&reg);
        let clock = Arc::new(ManualClock::fixed());
        let cache = CachedSearch::with_clock(
            backend.clone(),
            CacheRegistry::new(),
            CacheConfig::default().with_max_age(Duration::from_secs(10)),
            clock.clone(),
        );
        cache.find(&alice_query()).unwrap();
        cache.find(&Query::new("document").field("name", "alice")).unwrap();
        assert_eq!(cache.len(), 2);

        clock.advance(Duration::from_secs(11));
        cache.find(&alice_query()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(backend.finds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_concurrent_misses_are_idempotent() {
        let reg = registry();
        let backend = backend(&reg);
        let cache = CachedSearch::new(backend.clone(), CacheRegistry::new(), CacheConfig::default());
        let threads = 8;
        let barrier = Barrier::new(threads);

        let results: Vec<QueryResult> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.find(&alice_query()).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Every racer got an equal answer, and exactly one entry survived.
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
        let finds = backend.finds.load(Ordering::SeqCst);
        assert!((1..=threads).contains(&finds));

        cache.find(&alice_query()).unwrap();
        assert_eq!(backend.finds.load(Ordering::SeqCst), finds);
    }
}
