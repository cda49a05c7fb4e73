//! Shared registries keyed by configuration.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::registry::FormatRegistry;
use crate::config::DiscoveryConfig;
use crate::core::ConfigError;

/// Weakly held registries, one per key.
///
/// A registry lives as long as some caller holds its `Arc`; the next request
/// after the last handle drops builds a fresh one.
#[derive(Debug, Default)]
pub struct RegistryCache {
    entries: Mutex<HashMap<String, Weak<FormatRegistry>>>,
}

impl RegistryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live registry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<FormatRegistry>> {
        self.entries.lock().get(key).and_then(Weak::upgrade)
    }

    /// Live registry for `key`, building it with `build` if absent.
    ///
    /// The lock is held across `build`, so concurrent first callers share
    /// one registry.
    pub fn get_or_build<E>(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<FormatRegistry, E>,
    ) -> Result<Arc<FormatRegistry>, E> {
        let mut entries = self.entries.lock();
        if let Some(registry) = entries.get(key).and_then(Weak::upgrade) {
            return Ok(registry);
        }

        let registry = Arc::new(build()?);
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(key.to_string(), Arc::downgrade(&registry));
        debug!(key, "built format registry");
        Ok(registry)
    }

    /// Registry for the formats enabled in `config`.
    pub fn for_config(&self, config: &DiscoveryConfig) -> Result<Arc<FormatRegistry>, ConfigError> {
        let key = config.formats.join(",");
        self.get_or_build(&key, || FormatRegistry::from_config(config))
    }

    /// Number of keys whose registry is still alive.
    pub fn live_entries(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_shared_while_alive() {
        let cache = RegistryCache::new();
        let a = cache
            .get_or_build("k", || Ok::<_, Infallible>(FormatRegistry::with_plaintext()))
            .unwrap();
        let b = cache
            .get_or_build("k", || Ok::<_, Infallible>(FormatRegistry::new()))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_entries(), 1);
    }

    #[test]
    fn test_rebuilt_after_drop() {
        let cache = RegistryCache::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(FormatRegistry::new())
        };

        drop(cache.get_or_build("k", build).unwrap());
        assert!(cache.get("k").is_none());
        assert_eq!(cache.live_entries(), 0);

        let _held = cache.get_or_build("k", build).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_first_callers_share() {
        let cache = Arc::new(RegistryCache::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                thread::spawn(move || {
                    cache
                        .get_or_build("shared", || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, Infallible>(FormatRegistry::with_plaintext())
                        })
                        .unwrap()
                })
            })
            .collect();
        let registries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(registries.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_build_error_not_cached() {
        let cache = RegistryCache::new();
        let result = cache.get_or_build("bad", || Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(cache.get("bad").is_none());
    }

    #[test]
    fn test_for_config() {
        let cache = RegistryCache::new();
        let config = DiscoveryConfig::default();
        let a = cache.for_config(&config).unwrap();
        let b = cache.for_config(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
