//! Process-wide registry of active cache providers.
//!
//! Constructed once by the embedding application and shared by `Arc`.
//! Providers are held weakly: a dropped cache silently falls out of the
//! broadcast set even if it never deregistered.

use super::traits::{CacheProvider, CacheStats};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use warden_core::{IndexEntry, Record};

/// Opaque handle returned by [`CacheRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

#[derive(Default)]
pub struct CacheRegistry {
    providers: DashMap<ProviderId, Weak<dyn CacheProvider>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl CacheRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, provider: Weak<dyn CacheProvider>) -> ProviderId {
        let id = ProviderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.providers.insert(id, provider);
        debug!(provider_id = id.0, "Registered cache provider");
        id
    }

    /// Returns false if `id` was not registered.
    pub fn deregister(&self, id: ProviderId) -> bool {
        let removed = self.providers.remove(&id).is_some();
        if removed {
            debug!(provider_id = id.0, "Deregistered cache provider");
        }
        removed
    }

    /// Number of registered providers that are still alive.
    pub fn len(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| p.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_all(&self) {
        for provider in self.live() {
            provider.clear_all();
        }
    }

    pub fn clear_by_key(&self, key: &str) {
        for provider in self.live() {
            provider.clear_key(key);
        }
    }

    pub fn clear_by_model(&self, model: &str) {
        for provider in self.live() {
            provider.clear_model(model);
        }
    }

    pub fn clear_by_record(&self, record: &Record) {
        for provider in self.live() {
            provider.clear_record(record);
        }
    }

    pub fn clear_by_index(&self, entry: &IndexEntry) {
        for provider in self.live() {
            provider.clear_index(entry);
        }
    }

    /// Stats for every live provider, by name.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        self.live()
            .into_iter()
            .map(|p| (p.name().to_string(), p.stats()))
            .collect()
    }

    /// Snapshot of live providers, taken so that no map shard lock is held
    /// while a provider runs. Dead entries are pruned.
    fn live(&self) -> Vec<Arc<dyn CacheProvider>> {
        let mut live = Vec::with_capacity(self.providers.len());
        let mut dead = Vec::new();
        for entry in self.providers.iter() {
            match entry.value().upgrade() {
                Some(provider) => live.push(provider),
                None => dead.push(*entry.key()),
            }
        }
        for id in dead {
            self.providers.remove(&id);
        }
        live
    }
}

/// Ties a provider's registry membership to its lifetime.
///
/// Deregisters on [`Registration::release`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct Registration {
    id: ProviderId,
    registry: Arc<CacheRegistry>,
    released: AtomicBool,
}

impl Registration {
    pub fn new(registry: Arc<CacheRegistry>, provider: Weak<dyn CacheProvider>) -> Self {
        let id = registry.register(provider);
        Self {
            id,
            registry,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Deregister. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.registry.deregister(self.id);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Default)]
    struct Tally {
        clears: AtomicUsize,
        keys: AtomicUsize,
        models: AtomicUsize,
    }

    impl CacheProvider for Tally {
        fn name(&self) -> &str {
            "tally"
        }

        fn clear_all(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }

        fn clear_key(&self, _key: &str) {
            self.keys.fetch_add(1, Ordering::SeqCst);
        }

        fn clear_model(&self, _model: &str) {
            self.models.fetch_add(1, Ordering::SeqCst);
        }

        fn clear_record(&self, _record: &Record) {}

        fn clear_index(&self, _entry: &IndexEntry) {}

        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }

    fn weak(tally: &Arc<Tally>) -> Weak<dyn CacheProvider> {
        let provider: Arc<dyn CacheProvider> = tally.clone();
        Arc::downgrade(&provider)
    }

    #[test]
    fn test_broadcast_reaches_every_provider() {
        let registry = CacheRegistry::new();
        let a = Arc::new(Tally::default());
        let b = Arc::new(Tally::default());
        registry.register(weak(&a));
        registry.register(weak(&b));

        registry.clear_all();
        registry.clear_by_key("k");
        registry.clear_by_model("user");

        for p in [&a, &b] {
            assert_eq!(p.clears.load(Ordering::SeqCst), 1);
            assert_eq!(p.keys.load(Ordering::SeqCst), 1);
            assert_eq!(p.models.load(Ordering::SeqCst), 1);
        }
        assert_eq!(registry.stats().len(), 2);
    }

    #[test]
    fn test_deregister_stops_broadcast() {
        let registry = CacheRegistry::new();
        let a = Arc::new(Tally::default());
        let id = registry.register(weak(&a));
        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        registry.clear_all();
        assert_eq!(a.clears.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_provider_is_pruned() {
        let registry = CacheRegistry::new();
        {
            let a = Arc::new(Tally::default());
            registry.register(weak(&a));
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        registry.clear_all();
    }

    #[test]
    fn test_registration_releases_on_drop() {
        let registry = CacheRegistry::new();
        let a = Arc::new(Tally::default());
        {
            let reg = Registration::new(Arc::clone(&registry), weak(&a));
            assert_eq!(registry.len(), 1);
            reg.release();
            reg.release();
            assert!(reg.is_released());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_and_broadcast() {
        let registry = CacheRegistry::new();
        let tallies: Vec<Arc<Tally>> = (0..8).map(|_| Arc::new(Tally::default())).collect();

        thread::scope(|s| {
            for tally in &tallies {
                let registry = &registry;
                s.spawn(move || {
                    let id = registry.register(weak(tally));
                    registry.clear_by_key("k");
                    registry.deregister(id);
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    registry.clear_all();
                }
            });
        });

        assert!(registry.is_empty());
        for tally in &tallies {
            assert!(tally.keys.load(Ordering::SeqCst) >= 1);
        }
    }
}
