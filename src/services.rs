//! String-keyed, typed service registry.
//!
//! Providers and setup code park shared services here under a name; the
//! rest of the application asks for them back with the expected type.
//! There is no implicit resolution: a missing key or a type mismatch is
//! simply `None`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

type Service = Arc<dyn Any + Send + Sync>;

/// The application's service handles.
///
/// Interior mutability lets providers fill it in during `boot`, which only
/// receives `&Application`.
#[derive(Default)]
pub struct Services {
    entries: RwLock<HashMap<String, Service>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.insert_arc(key, Arc::new(value));
    }

    pub fn insert_arc<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        self.entries.write().insert(key.into(), value);
    }

    /// Returns the service under `key` if it exists and is a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let service = self.entries.read().get(key).cloned()?;
        service.downcast::<T>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}
