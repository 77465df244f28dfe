use std::{future::Future, net::SocketAddr, path::Path, sync::Arc};

use axum::Router;
use configs::{AppConfig, StorageConfig};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::StartupError;
use crate::routes::{self, AppState};
use service::storage::{
    backend::{KvBackend, ValuePolicy},
    cluster::{ClusterBackend, ClusterCoordinator},
    file::FileBackend,
    memory::MemoryBackend,
    remote::RemoteBackend,
    replicated::ReplicatedBackend,
};
use service::{StorageScope, StorageServer, StorageService};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// The assembled storage service plus the cluster coordinator it depends on.
pub struct StorageStack {
    pub service: StorageService,
    cluster: ClusterBackend,
    coordinator: ClusterCoordinator,
}

impl StorageStack {
    /// Stop the cluster coordinator and wait for it to exit.
    pub async fn shutdown(self) {
        self.cluster.shutdown().await;
        self.coordinator.join().await;
    }
}

fn parse_scope(field: &str, value: &str) -> Result<StorageScope, StartupError> {
    value
        .parse::<StorageScope>()
        .map_err(|e| StartupError::InvalidConfig(format!("storage.{field}: {e}")))
}

/// Wire every namespace to its backend according to `cfg`.
///
/// - app-server: `local` in memory, `cluster` via the coordinator, `ha`
///   replicated over JSON files in `<data_dir>/ha/`
/// - zss: `local` and `ha` on the remote storage service, only when configured
pub async fn build_storage(cfg: &StorageConfig) -> Result<StorageStack, StartupError> {
    let policy = ValuePolicy::new(cfg.max_value_bytes);
    let app_default = parse_scope("app_server_default", &cfg.app_server_default)?;
    let zss_default = parse_scope("zss_default", &cfg.zss_default)?;

    let (cluster, coordinator) = ClusterBackend::spawn(cfg.cluster.channel_capacity, policy);

    let ha_dir = Path::new(&cfg.data_dir).join("ha");
    let mut replicas: Vec<Arc<dyn KvBackend>> = Vec::with_capacity(cfg.ha.replicas);
    for n in 0..cfg.ha.replicas {
        let replica = FileBackend::open(ha_dir.join(format!("replica-{n}.json")), policy).await?;
        replicas.push(Arc::new(replica));
    }
    let ha = ReplicatedBackend::new(replicas, cfg.ha.quorum());
    info!(replicas = ha.replica_count(), quorum = ha.write_quorum(), dir = %ha_dir.display(), "ha storage ready");

    let mut builder = StorageService::builder()
        .backend(StorageServer::AppServer, StorageScope::Local, Arc::new(MemoryBackend::new(policy)))
        .backend(StorageServer::AppServer, StorageScope::Cluster, Arc::new(cluster.clone()))
        .backend(StorageServer::AppServer, StorageScope::Ha, Arc::new(ha))
        .default_scope(StorageServer::AppServer, app_default)
        .default_scope(StorageServer::Zss, zss_default);

    match &cfg.remote {
        Some(remote) => {
            for scope in [StorageScope::Local, StorageScope::Ha] {
                let backend = RemoteBackend::new(&remote.url, scope, remote.connect_timeout(), remote.request_timeout())?;
                builder = builder.backend(StorageServer::Zss, scope, Arc::new(backend));
            }
            info!(url = %remote.url, "zss storage routed to remote service");
        }
        None => warn!("no [storage.remote] configured; zss storage requests will fail"),
    }

    Ok(StorageStack { service: builder.build(), cluster, coordinator })
}

fn bind_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(format!("{}:{}", cfg.server.host, cfg.server.port).parse()?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("received Ctrl+C, shutting down");
}

/// Build the app and serve until `shutdown` resolves.
pub async fn run_until(cfg: AppConfig, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    common::env::ensure_data_dir(&cfg.storage.data_dir).await?;

    let stack = build_storage(&cfg.storage).await?;
    for ns in stack.service.namespaces() {
        info!(namespace = %ns, "storage namespace registered");
    }

    let state = AppState { storage: stack.service.clone() };
    let app: Router = routes::build_router(state, &cfg.server.base_path, build_cors());

    let addr = bind_addr(&cfg)?;
    info!(%addr, base_path = %cfg.server.base_path, "starting storage server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;

    stack.shutdown().await;
    served?;
    Ok(())
}

/// Public entry: serve until Ctrl+C.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    run_until(cfg, shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn assembles_app_server_namespaces() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("storage_startup_{}", Uuid::new_v4()));
        let mut cfg = StorageConfig::default();
        cfg.data_dir = dir.to_string_lossy().to_string();
        cfg.normalize_and_validate()?;

        let stack = build_storage(&cfg).await?;
        let namespaces = stack.service.namespaces();
        assert_eq!(namespaces.len(), 3);
        assert!(namespaces.iter().all(|ns| ns.server == StorageServer::AppServer));
        assert!(dir.join("ha").join("replica-0.json").exists());

        stack.service.set(StorageServer::AppServer, "k", "v".into(), Some(StorageScope::Ha)).await?;
        assert_eq!(stack.service.get(StorageServer::AppServer, "k", Some(StorageScope::Ha)).await?, "v");

        stack.shutdown().await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unknown_default_scope() {
        let dir = std::env::temp_dir().join(format!("storage_startup_{}", Uuid::new_v4()));
        let mut cfg = StorageConfig::default();
        cfg.data_dir = dir.to_string_lossy().to_string();
        cfg.app_server_default = "disk".into();
        assert!(matches!(build_storage(&cfg).await, Err(StartupError::InvalidConfig(_))));
        // scopes are checked before any backend touches the disk
        assert!(!dir.exists());
    }
}
