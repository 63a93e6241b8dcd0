//! Decision cache in front of an authorization provider.
//!
//! Record-level decisions are cached under a digest of
//! `(action, actor, resource)`. Two side indexes map actor and resource
//! reference keys to the digests they appear in, so a write to either
//! record evicts every decision it took part in. Field-level decisions are
//! never cached.

use crate::authorization::{AuthorizationProvider, PolicySubject};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use warden_core::{
    compute_digest, ActionType, Clock, IndexEntry, PolicyResponse, Record, SystemClock,
};
use warden_storage::{CacheConfig, CacheProvider, CacheRegistry, CacheStats, Registration, TtlSweep};

pub struct CachingAuthorizer {
    inner: Arc<dyn AuthorizationProvider>,
    responses: DashMap<String, PolicyResponse>,
    actors: DashMap<String, Vec<String>>,
    resources: DashMap<String, Vec<String>>,
    models: DashMap<String, Vec<String>>,
    config: CacheConfig,
    sweep: TtlSweep,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    registration: Registration,
}

impl std::fmt::Debug for CachingAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingAuthorizer")
            .field("responses", &self.responses.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CachingAuthorizer {
    pub fn new(
        inner: Arc<dyn AuthorizationProvider>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Self::with_clock(inner, registry, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn AuthorizationProvider>,
        registry: Arc<CacheRegistry>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let provider: Weak<dyn CacheProvider> = me.clone();
            Self {
                inner,
                responses: DashMap::new(),
                actors: DashMap::new(),
                resources: DashMap::new(),
                models: DashMap::new(),
                sweep: TtlSweep::new(config.max_age, Arc::clone(&clock)),
                config,
                clock,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                registration: Registration::new(registry, provider),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Deregister from the provider registry and drop all entries.
    pub fn close(&self) {
        self.registration.release();
        self.clear_maps();
    }

    fn check_limits(&self) {
        let max = self.config.max_entries;
        let over = self.responses.len() > max
            || self.actors.len() > max
            || self.resources.len() > max;
        if self.sweep.due() || over {
            info!(entries = self.responses.len(), "Clearing policy decision cache");
            self.clear_maps();
            self.sweep.reset();
        }
    }

    fn cached(&self, key: &str) -> Option<PolicyResponse> {
        let response = self.responses.get(key)?.value().clone();
        match response.expires_at {
            Some(at) if at <= self.clock.now() => {
                debug!(key, "Cached decision expired");
                self.responses.remove(key);
                None
            }
            _ => Some(response),
        }
    }

    fn store(&self, key: String, response: PolicyResponse, actor: String, resource: &Record) {
        self.check_limits();
        if self.responses.contains_key(&key) {
            return;
        }
        self.responses.insert(key.clone(), response);
        self.actors.entry(actor).or_default().push(key.clone());
        self.resources
            .entry(resource.reference_key())
            .or_default()
            .push(key.clone());
        self.models
            .entry(resource.model().to_string())
            .or_default()
            .push(key);
    }

    fn evict_reference(&self, reference: &str) {
        let mut keys = Vec::new();
        if let Some((_, k)) = self.actors.remove(reference) {
            keys.extend(k);
        }
        if let Some((_, k)) = self.resources.remove(reference) {
            keys.extend(k);
        }
        for key in keys {
            self.responses.remove(&key);
        }
    }

    fn clear_maps(&self) {
        self.responses.clear();
        self.actors.clear();
        self.resources.clear();
        self.models.clear();
    }
}

fn decision_key(action: ActionType, actor: &str, resource: &str) -> String {
    compute_digest(&format!("{}-{}-{}", action, actor, resource))
}

impl AuthorizationProvider for CachingAuthorizer {
    fn decide(
        &self,
        actor: &Record,
        action: ActionType,
        subject: PolicySubject<'_>,
    ) -> PolicyResponse {
        let PolicySubject::Record(resource) = subject else {
            return self.inner.decide(actor, action, subject);
        };

        let actor_ref = actor.reference_key();
        let key = decision_key(action, &actor_ref, &resource.reference_key());
        if let Some(response) = self.cached(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return response;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.inner.decide(actor, action, subject);
        self.store(key, response.clone(), actor_ref, resource);
        response
    }
}

impl CacheProvider for CachingAuthorizer {
    fn name(&self) -> &str {
        "policy"
    }

    fn clear_all(&self) {
        self.clear_maps();
        self.sweep.reset();
    }

    fn clear_key(&self, key: &str) {
        self.responses.remove(key);
    }

    fn clear_model(&self, model: &str) {
        if let Some((_, keys)) = self.models.remove(model) {
            for key in keys {
                self.responses.remove(&key);
            }
        }
    }

    fn clear_record(&self, record: &Record) {
        self.evict_reference(&record.reference_key());
    }

    fn clear_index(&self, entry: &IndexEntry) {
        if let Some(reference) = entry.reference_key() {
            self.evict_reference(&reference);
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.responses.len() as u64,
            ..Default::default()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use warden_core::{
        FieldDef, ManualClock, ModelDefinition, QueryField, SchemaRegistry, Value, ValueKind,
    };

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        expiry: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl AuthorizationProvider for Counting {
        fn decide(&self, _: &Record, _: ActionType, _: PolicySubject<'_>) -> PolicyResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = PolicyResponse::permit();
            match self.expiry {
                Some(at) => response.with_expiry(at),
                None => response,
            }
        }
    }

    fn records() -> (Record, Record) {
        let reg = SchemaRegistry::builder()
            .model(
                ModelDefinition::new("user")
                    .field(FieldDef::new("id", ValueKind::Long).identity())
                    .field(FieldDef::new("urn", ValueKind::String).identity()),
            )
            .build()
            .unwrap();
        let mut actor = reg.new_record("user").unwrap();
        actor.set("urn", "urn:user:actor").unwrap();
        let mut target = reg.new_record("user").unwrap();
        target.set("urn", "urn:user:target").unwrap();
        (actor, target)
    }

    fn authorizer(inner: Arc<Counting>, clock: Arc<ManualClock>) -> (Arc<CachingAuthorizer>, Arc<CacheRegistry>) {
        let registry = CacheRegistry::new();
        let cache = CachingAuthorizer::with_clock(
            inner,
            registry.clone(),
            CacheConfig::default().with_max_age(Duration::from_secs(60)),
            clock,
        );
        (cache, registry)
    }

    #[test]
    fn test_repeat_decision_served_from_cache() {
        let inner = Arc::new(Counting::default());
        let (cache, _) = authorizer(inner.clone(), Arc::new(ManualClock::fixed()));
        let (actor, target) = records();

        assert!(cache.can_read(&actor, &target).is_permit());
        assert!(cache.can_read(&actor, &target).is_permit());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cache.can_update(&actor, &target);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_field_decisions_not_cached() {
        let inner = Arc::new(Counting::default());
        let (cache, _) = authorizer(inner.clone(), Arc::new(ManualClock::fixed()));
        let (actor, _) = records();
        let field = QueryField {
            name: "name".to_string(),
            value: Value::from("alice"),
        };
        cache.can_read_field(&actor, "user", &field);
        cache.can_read_field(&actor, "user", &field);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_write_evicts_decisions() {
        let inner = Arc::new(Counting::default());
        let (cache, registry) = authorizer(inner.clone(), Arc::new(ManualClock::fixed()));
        let (actor, target) = records();

        cache.can_read(&actor, &target);
        registry.clear_by_record(&target);
        assert!(cache.is_empty());

        cache.can_read(&actor, &target);
        registry.clear_by_index(&IndexEntry::from_record(&actor));
        assert!(cache.is_empty());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_response_reevaluated() {
        let clock = Arc::new(ManualClock::fixed());
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            expiry: Some(clock.now() + chrono::Duration::seconds(5)),
        });
        let (cache, _) = authorizer(inner.clone(), clock.clone());
        let (actor, target) = records();

        cache.can_read(&actor, &target);
        clock.advance(Duration::from_secs(6));
        cache.can_read(&actor, &target);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_max_age_clears_cache() {
        let clock = Arc::new(ManualClock::fixed());
        let inner = Arc::new(Counting::default());
        let (cache, _) = authorizer(inner.clone(), clock.clone());
        let (actor, target) = records();

        cache.can_read(&actor, &target);
        clock.advance(Duration::from_secs(61));
        cache.can_delete(&actor, &target);
        assert_eq!(cache.len(), 1);
        cache.can_read(&actor, &target);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_close_deregisters() {
        let inner = Arc::new(Counting::default());
        let (cache, registry) = authorizer(inner, Arc::new(ManualClock::fixed()));
        assert_eq!(registry.len(), 1);
        cache.close();
        assert!(registry.is_empty());
    }
}
