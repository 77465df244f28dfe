use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StorageResult;
use crate::storage::backend::{Collection, KvBackend, ValuePolicy};

/// Process-local store; the `local` scope.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<Collection>>,
    policy: ValuePolicy,
}

impl MemoryBackend {
    pub fn new(policy: ValuePolicy) -> Self {
        Self { inner: Arc::new(RwLock::new(Collection::new())), policy }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".into()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let map = self.inner.read().await;
        Ok(map.get(key).cloned())
    }

    async fn get_all(&self) -> StorageResult<Collection> {
        let map = self.inner.read().await;
        Ok(map.clone())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.policy.check(key, &value)?;
        let mut map = self.inner.write().await;
        map.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_all(&self, entries: Collection) -> StorageResult<()> {
        self.policy.check_all(&entries)?;
        let mut map = self.inner.write().await;
        *map = entries;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut map = self.inner.write().await;
        map.remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> StorageResult<()> {
        let mut map = self.inner.write().await;
        map.clear();
        Ok(())
    }
}
