//! Cluster-wide storage.
//!
//! A single coordinator task owns the collection. Every worker holds a cheap
//! [`ClusterBackend`] handle and talks to the coordinator over a bounded mpsc
//! channel; each request carries a oneshot sender for its reply. Requests are
//! applied in arrival order, so whole-collection replace and clear are atomic
//! with respect to other workers.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{StorageError, StorageResult};
use crate::storage::backend::{Collection, KvBackend, ValuePolicy};

const COORDINATOR_GONE: &str = "cluster storage coordinator is not running";

/// Messages understood by the coordinator.
#[derive(Debug)]
enum ClusterRequest {
    Get { key: String, reply: oneshot::Sender<Option<String>> },
    GetAll { reply: oneshot::Sender<Collection> },
    Set { key: String, value: String, reply: oneshot::Sender<()> },
    SetAll { entries: Collection, reply: oneshot::Sender<()> },
    Delete { key: String, reply: oneshot::Sender<()> },
    DeleteAll { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Handle to the cluster coordinator. Clone one per worker.
#[derive(Clone)]
pub struct ClusterBackend {
    request_tx: mpsc::Sender<ClusterRequest>,
    policy: ValuePolicy,
}

/// Owns the coordinator task; await it after [`ClusterBackend::shutdown`].
pub struct ClusterCoordinator {
    task: JoinHandle<()>,
}

impl ClusterCoordinator {
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl ClusterBackend {
    /// Spawn the coordinator on the current runtime and return the first handle.
    pub fn spawn(capacity: usize, policy: ValuePolicy) -> (Self, ClusterCoordinator) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_coordinator(request_rx));
        (Self { request_tx, policy }, ClusterCoordinator { task })
    }

    /// Ask the coordinator to stop; later calls from any handle fail.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(ClusterRequest::Shutdown).await;
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ClusterRequest) -> StorageResult<T> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(build(reply))
            .await
            .map_err(|_| StorageError::unavailable(COORDINATOR_GONE))?;
        rx.await.map_err(|_| StorageError::unavailable(COORDINATOR_GONE))
    }
}

async fn run_coordinator(mut request_rx: mpsc::Receiver<ClusterRequest>) {
    let mut data = Collection::new();
    info!("cluster storage coordinator started");
    while let Some(request) = request_rx.recv().await {
        match request {
            ClusterRequest::Get { key, reply } => {
                let _ = reply.send(data.get(&key).cloned());
            }
            ClusterRequest::GetAll { reply } => {
                let _ = reply.send(data.clone());
            }
            ClusterRequest::Set { key, value, reply } => {
                data.insert(key, value);
                let _ = reply.send(());
            }
            ClusterRequest::SetAll { entries, reply } => {
                data = entries;
                let _ = reply.send(());
            }
            ClusterRequest::Delete { key, reply } => {
                data.remove(&key);
                let _ = reply.send(());
            }
            ClusterRequest::DeleteAll { reply } => {
                data.clear();
                let _ = reply.send(());
            }
            ClusterRequest::Shutdown => {
                debug!(entries = data.len(), "cluster storage coordinator shutting down");
                break;
            }
        }
    }
    info!("cluster storage coordinator stopped");
}

#[async_trait]
impl KvBackend for ClusterBackend {
    fn describe(&self) -> String {
        "cluster-coordinator".into()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let key = key.to_string();
        self.call(|reply| ClusterRequest::Get { key, reply }).await
    }

    async fn get_all(&self) -> StorageResult<Collection> {
        self.call(|reply| ClusterRequest::GetAll { reply }).await
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.policy.check(key, &value)?;
        let key = key.to_string();
        self.call(|reply| ClusterRequest::Set { key, value, reply }).await
    }

    async fn set_all(&self, entries: Collection) -> StorageResult<()> {
        self.policy.check_all(&entries)?;
        self.call(|reply| ClusterRequest::SetAll { entries, reply }).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.call(|reply| ClusterRequest::Delete { key, reply }).await
    }

    async fn delete_all(&self) -> StorageResult<()> {
        self.call(|reply| ClusterRequest::DeleteAll { reply }).await
    }
}
