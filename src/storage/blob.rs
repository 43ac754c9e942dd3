use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{RebanhoError, Result};

/// Named text blobs on the local device: one key per collection, absent key
/// means empty.
pub trait BlobStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read the current value, compute the replacement and store it, as one
    /// unit with respect to other writers of the same store. Nothing is
    /// written when `f` fails.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()>;
}

/// Process-local blob store used by tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.blobs
            .lock()
            .map_err(|_| RebanhoError::Storage("blob store lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()> {
        let mut blobs = self.lock()?;
        let next = f(blobs.get(key).cloned())?;
        blobs.insert(key.to_string(), next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key_reads_none() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.read("rebanho.avisos").unwrap(), None);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let store = MemoryBlobStore::new();
        store.write("k", "before").unwrap();

        let result = store.update("k", &mut |_| {
            Err(RebanhoError::Validation("nope".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.read("k").unwrap().as_deref(), Some("before"));
    }

    #[test]
    fn test_update_sees_current_value() {
        let store = MemoryBlobStore::new();
        store.write("k", "1").unwrap();
        store
            .update("k", &mut |current| Ok(format!("{}2", current.unwrap_or_default())))
            .unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("12"));

        store.remove("k").unwrap();
        assert_eq!(store.read("k").unwrap(), None);
    }
}
