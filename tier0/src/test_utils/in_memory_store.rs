//! In-memory implementations of the read-only store protocols.

use crate::error::EngineError;
use crate::store::{KvStore, ObjectStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory [`KvStore`] backed by a `HashMap` behind a `RwLock`.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value (test setup).
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.write().await.insert(key.into(), value.into());
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.data.read().await.get(key).cloned())
    }
}

/// In-memory [`ObjectStore`] backed by a `HashMap` behind a `RwLock`.
#[derive(Default)]
pub struct InMemoryObjectStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object (test setup).
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.write().await.insert(key.into(), value.into());
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.data.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_store_round_trip() {
        let store = InMemoryKvStore::new();
        store.insert("k", b"v".to_vec()).await;
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn object_store_round_trip() {
        let store = InMemoryObjectStore::new();
        store.insert("a/b.wasm", vec![0, 97, 115, 109]).await;
        assert!(store.get("a/b.wasm").await.unwrap().is_some());
    }
}
