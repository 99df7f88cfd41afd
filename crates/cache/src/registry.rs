//! Named cache registry
//!
//! A process holds one registry, constructed explicitly at startup and passed
//! to the subsystems that need it. Caches are created lazily on first lookup,
//! sized from the registry's [`CacheConfig`].

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::{BoundedCache, CacheConfig, CacheError};

/// A named collection of [`BoundedCache`] instances, one per resource class.
///
/// Lookups are typed: the first `cache::<K, V>(name)` call constructs the
/// cache with the configured capacity; later calls return the same instance.
/// Looking a name up under a different key/value type is a programmer error
/// and fails immediately.
///
/// # Example
///
/// ```
/// use globestream_cache::{CacheConfig, CacheRegistry, TEXTURE_TILE_CACHE};
///
/// let registry = CacheRegistry::new(CacheConfig::default());
/// let tiles = registry.cache::<u64, String>(TEXTURE_TILE_CACHE).unwrap();
/// let _ = tiles.put(1, "tile".to_string(), 64);
///
/// // Same name, same instance
/// let again = registry.cache::<u64, String>(TEXTURE_TILE_CACHE).unwrap();
/// assert!(again.contains(&1));
/// ```
pub struct CacheRegistry {
    config: CacheConfig,
    caches: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl CacheRegistry {
    /// Create a registry backed by the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration caches are sized from
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a named cache, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::WrongType`] if `name` was previously created
    /// with different key or value types, or a construction error if the
    /// configured sizes are invalid.
    pub fn cache<K, V>(&self, name: &str) -> Result<Arc<BoundedCache<K, V>>, CacheError>
    where
        K: Eq + Hash + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let mut caches = self.caches.lock().unwrap();

        if let Some(existing) = caches.get(name) {
            return existing
                .clone()
                .downcast::<BoundedCache<K, V>>()
                .map_err(|_| CacheError::WrongType(name.to_string()));
        }

        let (capacity, low_water) = self.config.size_for(name);
        let cache = Arc::new(BoundedCache::<K, V>::new(capacity, low_water)?);
        caches.insert(name.to_string(), cache.clone());
        Ok(cache)
    }

    /// Check whether a named cache has been constructed yet
    pub fn contains(&self, name: &str) -> bool {
        self.caches.lock().unwrap().contains_key(name)
    }

    /// Names of every cache constructed so far
    pub fn names(&self) -> Vec<String> {
        self.caches.lock().unwrap().keys().cloned().collect()
    }
}
