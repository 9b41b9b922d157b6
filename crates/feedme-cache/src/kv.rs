//! Key-Value store wrapper with automatic serialization.

use crate::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type Entries = BTreeMap<String, serde_json::Value>;

enum Backend {
    Memory,
    File(PathBuf),
}

struct Inner {
    backend: Backend,
    entries: Mutex<Entries>,
}

/// Type-safe local store, the counterpart of browser `localStorage`.
///
/// Values are stored as JSON. A file-backed cache rewrites its file on
/// every change. Clones share the same entries.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Open an in-memory store.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory, Entries::new())
    }

    /// Open a store persisted to a JSON file, creating it on first write.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let cache = Cache::open(data_dir.join("local-storage.json"))?;
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Entries::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "local store opened");
        Ok(Self::with_backend(Backend::File(path), entries))
    }

    fn with_backend(backend: Backend, entries: Entries) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                entries: Mutex::new(entries),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, CacheError> {
        self.inner
            .entries
            .lock()
            .map_err(|e| CacheError::StoreError(e.to_string()))
    }

    fn flush(&self, entries: &Entries) -> Result<(), CacheError> {
        if let Backend::File(path) = &self.inner.backend {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(entries)?)?;
        }
        Ok(())
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key doesn't exist.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let entries = self.lock()?;
        match entries.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Set a value in the cache.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    /// Delete a value from the cache.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    /// Check if a key exists in the cache.
    pub fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock()?.contains_key(key))
    }

    /// Get all keys in the cache.
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Helper to build cache keys with namespacing.
///
/// # Example
///
/// ```rust,ignore
/// let key = cache_key!("feedme", "merged_user");
/// // Returns "feedme:merged_user"
/// ```
#[macro_export]
macro_rules! cache_key {
    ($prefix:expr, $($part:expr),+) => {{
        let mut key = String::from($prefix);
        $(
            key.push(':');
            key.push_str(&$part.to_string());
        )+
        key
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_delete() {
        let cache = Cache::in_memory();
        cache.set("k", &vec![1, 2, 3]).unwrap();

        let value: Option<Vec<i32>> = cache.get("k").unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(cache.exists("k").unwrap());

        cache.delete("k").unwrap();
        assert!(!cache.exists("k").unwrap());
        let value: Option<Vec<i32>> = cache.get("k").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_file_backed_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.json");

        let cache = Cache::open(&path).unwrap();
        cache.set("greeting", &"hello").unwrap();
        drop(cache);

        let reopened = Cache::open(&path).unwrap();
        let value: Option<String> = reopened.get("greeting").unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
        assert_eq!(reopened.keys().unwrap(), vec!["greeting".to_string()]);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let cache = Cache::in_memory();
        cache.set("k", &"text").unwrap();
        let result: Result<Option<i64>, _> = cache.get("k");
        assert!(matches!(result, Err(CacheError::SerializeError(_))));
    }

    #[test]
    fn test_cache_key_macro() {
        assert_eq!(cache_key!("cart", "user", 7), "cart:user:7");
    }
}
