use dashmap::DashMap;
use warden_core::{ByteStore, StorageError};

/// In-memory out-of-line byte store.
#[derive(Debug, Default)]
pub struct InMemoryByteStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ByteStore for InMemoryByteStore {
    fn put(&self, locator: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs.insert(locator.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, locator: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(locator).map(|b| b.value().clone()))
    }

    fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.remove(locator).is_some())
    }
}
