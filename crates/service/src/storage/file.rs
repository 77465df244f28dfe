use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use crate::errors::StorageResult;
use crate::storage::backend::{Collection, KvBackend, ValuePolicy};
use crate::storage::json_map_store::JsonMapStore;

/// Durable store persisted as one JSON file. Used as an HA replica.
#[derive(Clone)]
pub struct FileBackend {
    store: Arc<JsonMapStore<String, String>>,
    policy: ValuePolicy,
}

impl FileBackend {
    /// Open (or create) the store file at `path`.
    pub async fn open<P: Into<PathBuf>>(path: P, policy: ValuePolicy) -> StorageResult<Self> {
        let store = JsonMapStore::<String, String>::new(path).await?;
        Ok(Self { store, policy })
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    fn describe(&self) -> String {
        format!("file:{}", self.store.path().display())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.store.get(&key.to_string()).await)
    }

    async fn get_all(&self) -> StorageResult<Collection> {
        Ok(self.store.snapshot().await)
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.policy.check(key, &value)?;
        self.store.insert(key.to_string(), value).await
    }

    async fn set_all(&self, entries: Collection) -> StorageResult<()> {
        self.policy.check_all(&entries)?;
        self.store.replace(entries).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.store.remove(&key.to_string()).await.map(|_| ())
    }

    async fn delete_all(&self) -> StorageResult<()> {
        self.store.replace(Collection::new()).await
    }
}
