//! Shared object caches backing the endpoints and endpointslices joins.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::objects::{Endpoints, EndpointSlice, Pod, Service};
use crate::types::Action;

/// Concurrent key→object map for one cached kind.
///
/// Readers take a shared lock and receive a cheap [`Arc`] clone of the stored
/// object; cached objects are never mutated after insertion. Writers are
/// serialized per map. Clones of the cache share the same underlying map.
#[derive(Debug)]
pub struct ObjectCache<T> {
    inner: Arc<RwLock<HashMap<String, Arc<T>>>>,
}

impl<T> ObjectCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the latest cached object for `key`, if any.
    pub async fn load(&self, key: &str) -> Option<Arc<T>> {
        let inner = self.inner.read().await;
        inner.get(key).cloned()
    }

    /// Stores `object` under `key`, replacing any previous version.
    pub async fn store(&self, key: String, object: T) {
        let mut inner = self.inner.write().await;
        inner.insert(key, Arc::new(object));
    }

    /// Removes the object stored under `key`.
    pub async fn remove(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.remove(key);
    }

    /// Applies a watch action to the cache: `ADDED`/`MODIFIED` store,
    /// `DELETED` removes, anything else is a no-op.
    pub async fn apply(&self, action: &Action, key: String, object: T) {
        match action {
            Action::Added | Action::Modified => self.store(key, object).await,
            Action::Deleted => self.remove(&key).await,
            _ => {}
        }
    }

    /// Returns the number of cached objects.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.len()
    }

    /// Returns whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T> Clone for ObjectCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ObjectCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The caches shared by all watchers of one discovery pipeline.
///
/// The endpoints and endpointslices roles join these caches when building
/// targets; the endpoints caches double as the join index for pod and service
/// modifications.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    pub pods: ObjectCache<Pod>,
    pub services: ObjectCache<Service>,
    pub endpoints: ObjectCache<Endpoints>,
    pub endpoint_slices: ObjectCache<EndpointSlice>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}
