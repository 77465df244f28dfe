//! High-availability storage: the same collection kept on several replicas.
//!
//! Writes go to every replica concurrently and succeed once `write_quorum`
//! in-sync replicas acknowledge. A replica that misses a write others applied
//! is marked stale: reads skip it until the next write copies the collection
//! of an in-sync replica over it. Reads are served by the first in-sync
//! replica that answers.
//!
//! A write runs on its own task, so it completes on every replica even when
//! the caller stops waiting.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{StorageError, StorageResult};
use crate::metrics::STORAGE_REPLICA_FAILURES_TOTAL;
use crate::storage::backend::{Collection, KvBackend};

struct Replica {
    backend: Arc<dyn KvBackend>,
    stale: AtomicBool,
}

impl Replica {
    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark(&self, stale: bool) {
        self.stale.store(stale, Ordering::Release);
    }
}

struct Replicas {
    members: Vec<Replica>,
    write_quorum: usize,
    // held by writes and resyncs so a copy never overwrites a newer write
    writes: Mutex<()>,
}

pub struct ReplicatedBackend {
    inner: Arc<Replicas>,
}

impl ReplicatedBackend {
    /// `write_quorum` is clamped to `1..=replicas.len()`.
    pub fn new(replicas: Vec<Arc<dyn KvBackend>>, write_quorum: usize) -> Self {
        let write_quorum = write_quorum.clamp(1, replicas.len().max(1));
        let members = replicas
            .into_iter()
            .map(|backend| Replica { backend, stale: AtomicBool::new(false) })
            .collect();
        Self { inner: Arc::new(Replicas { members, write_quorum, writes: Mutex::new(()) }) }
    }

    pub fn replica_count(&self) -> usize {
        self.inner.members.len()
    }

    pub fn write_quorum(&self) -> usize {
        self.inner.write_quorum
    }

    /// Replicas currently excluded from reads.
    pub fn stale_replicas(&self) -> usize {
        self.inner.members.iter().filter(|r| r.is_stale()).count()
    }

    async fn write_all<F, Fut>(&self, op: &'static str, f: F) -> StorageResult<()>
    where
        F: Fn(Arc<dyn KvBackend>) -> Fut + Send + 'static,
        Fut: Future<Output = StorageResult<()>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.write(op, f).await })
            .await
            .map_err(|e| StorageError::unavailable(format!("ha {op} task failed: {e}")))?
    }

    async fn read_first<T, F, Fut>(&self, op: &'static str, f: F) -> StorageResult<T>
    where
        F: Fn(Arc<dyn KvBackend>) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut failures = Vec::new();
        for replica in self.inner.members.iter().filter(|r| !r.is_stale()) {
            match f(Arc::clone(&replica.backend)).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!(op, replica = %replica.backend.describe(), error = %e, "ha replica read failed; trying next");
                    STORAGE_REPLICA_FAILURES_TOTAL.inc();
                    failures.push((replica.backend.describe(), e));
                }
            }
        }
        Err(StorageError::unavailable(format!("ha {op} failed on every in-sync replica: {}", describe_failures(&failures))))
    }
}

impl Replicas {
    /// Copy the collection of the first readable in-sync replica onto every
    /// stale one. Callers hold `writes`.
    async fn resync(&self) {
        if !self.members.iter().any(Replica::is_stale) {
            return;
        }
        let mut snapshot = None;
        for replica in self.members.iter().filter(|r| !r.is_stale()) {
            match replica.backend.get_all().await {
                Ok(all) => {
                    snapshot = Some(all);
                    break;
                }
                Err(e) => warn!(replica = %replica.backend.describe(), error = %e, "ha resync source unreadable"),
            }
        }
        let Some(snapshot) = snapshot else {
            return;
        };
        for replica in self.members.iter().filter(|r| r.is_stale()) {
            match replica.backend.set_all(snapshot.clone()).await {
                Ok(()) => {
                    replica.mark(false);
                    info!(replica = %replica.backend.describe(), entries = snapshot.len(), "ha replica resynced");
                }
                Err(e) => debug!(replica = %replica.backend.describe(), error = %e, "ha replica still behind"),
            }
        }
    }

    async fn write<F, Fut>(&self, op: &'static str, f: F) -> StorageResult<()>
    where
        F: Fn(Arc<dyn KvBackend>) -> Fut,
        Fut: Future<Output = StorageResult<()>> + Send + 'static,
    {
        let _guard = self.writes.lock().await;
        self.resync().await;

        let in_sync: Vec<bool> = self.members.iter().map(|r| !r.is_stale()).collect();
        let handles: Vec<_> = self.members.iter().map(|r| tokio::spawn(f(Arc::clone(&r.backend)))).collect();

        let mut acknowledged = 0usize;
        let mut failures: Vec<(usize, StorageError)> = Vec::new();
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(())) if in_sync[idx] => acknowledged += 1,
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push((idx, e)),
                Err(e) => failures.push((idx, StorageError::unavailable(format!("replica task failed: {e}")))),
            }
        }

        // once an in-sync replica has applied the write, every replica that failed it is behind
        if acknowledged > 0 {
            for (idx, e) in &failures {
                let replica = &self.members[*idx];
                if !replica.is_stale() {
                    warn!(op, replica = %replica.backend.describe(), error = %e, "ha replica missed a write; excluded from reads until resynced");
                }
                replica.mark(true);
            }
        }

        let replica_failures = failures.iter().filter(|(_, e)| !e.is_validation()).count();
        if replica_failures > 0 {
            STORAGE_REPLICA_FAILURES_TOTAL.inc_by(replica_failures as u64);
        }

        if let Some(pos) = failures.iter().position(|(_, e)| e.is_validation()) {
            return Err(failures.swap_remove(pos).1);
        }

        if acknowledged >= self.write_quorum {
            debug!(op, acknowledged, failed = failures.len(), "ha write committed");
            return Ok(());
        }

        let named: Vec<(String, StorageError)> = failures
            .into_iter()
            .map(|(idx, e)| (self.members[idx].backend.describe(), e))
            .collect();
        Err(StorageError::unavailable(format!(
            "ha {op} reached {acknowledged} of {} required replicas: {}",
            self.write_quorum,
            describe_failures(&named)
        )))
    }
}

fn describe_failures(failures: &[(String, StorageError)]) -> String {
    if failures.is_empty() {
        return "no replicas available".into();
    }
    failures.iter().map(|(name, e)| format!("{name}: {e}")).collect::<Vec<_>>().join("; ")
}

#[async_trait]
impl KvBackend for ReplicatedBackend {
    fn describe(&self) -> String {
        format!("replicated({} replicas, quorum {})", self.replica_count(), self.write_quorum())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.read_first("get", |r| {
            let key = key.to_string();
            async move { r.get(&key).await }
        })
        .await
    }

    async fn get_all(&self) -> StorageResult<Collection> {
        self.read_first("get_all", |r| async move { r.get_all().await }).await
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let key = key.to_string();
        self.write_all("set", move |r| {
            let key = key.clone();
            let value = value.clone();
            async move { r.set(&key, value).await }
        })
        .await
    }

    async fn set_all(&self, entries: Collection) -> StorageResult<()> {
        self.write_all("set_all", move |r| {
            let entries = entries.clone();
            async move { r.set_all(entries).await }
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.write_all("delete", move |r| {
            let key = key.clone();
            async move { r.delete(&key).await }
        })
        .await
    }

    async fn delete_all(&self) -> StorageResult<()> {
        self.write_all("delete_all", |r| async move { r.delete_all().await }).await
    }
}
