use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::errors::{StorageError, StorageResult};
use crate::metrics;
use crate::storage::backend::{Collection, KvBackend};
use crate::storage::scope::{Namespace, StorageScope, StorageServer};

/// Uniform async key-value interface over every registered namespace.
///
/// The service holds no data of its own: each `(server, scope)` namespace maps
/// to one backend handed in at construction, and every call is forwarded to it.
/// Errors from backends are returned unchanged and never retried.
#[derive(Clone)]
pub struct StorageService {
    backends: Arc<HashMap<Namespace, Arc<dyn KvBackend>>>,
    defaults: Arc<HashMap<StorageServer, StorageScope>>,
}

/// Builder for [`StorageService`].
#[derive(Default)]
pub struct StorageServiceBuilder {
    backends: HashMap<Namespace, Arc<dyn KvBackend>>,
    defaults: HashMap<StorageServer, StorageScope>,
}

impl StorageServiceBuilder {
    pub fn backend(mut self, server: StorageServer, scope: StorageScope, backend: Arc<dyn KvBackend>) -> Self {
        self.backends.insert(Namespace::new(server, scope), backend);
        self
    }

    /// Scope used for `server` when a call names none.
    pub fn default_scope(mut self, server: StorageServer, scope: StorageScope) -> Self {
        self.defaults.insert(server, scope);
        self
    }

    pub fn build(self) -> StorageService {
        StorageService { backends: Arc::new(self.backends), defaults: Arc::new(self.defaults) }
    }
}

impl StorageService {
    pub fn builder() -> StorageServiceBuilder {
        StorageServiceBuilder::default()
    }

    /// Namespaces that have a backend, for startup logging.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut all: Vec<Namespace> = self.backends.keys().copied().collect();
        all.sort_by_key(|ns| (ns.server.as_str(), ns.scope.as_str()));
        all
    }

    /// Pick the backend for an explicit or omitted scope.
    ///
    /// An omitted scope means the server's default, falling back to `local`
    /// when that default has no backend.
    pub fn resolve(&self, server: StorageServer, scope: Option<StorageScope>) -> StorageResult<(Namespace, Arc<dyn KvBackend>)> {
        match scope {
            Some(scope) => {
                let ns = Namespace::new(server, scope);
                self.backends
                    .get(&ns)
                    .map(|b| (ns, Arc::clone(b)))
                    .ok_or_else(|| unavailable(server, Some(scope)))
            }
            None => {
                let preferred = self.defaults.get(&server).copied().unwrap_or(StorageScope::Local);
                [preferred, StorageScope::Local]
                    .into_iter()
                    .map(|scope| Namespace::new(server, scope))
                    .find_map(|ns| self.backends.get(&ns).map(|b| (ns, Arc::clone(b))))
                    .ok_or_else(|| unavailable(server, None))
            }
        }
    }

    pub async fn get(&self, server: StorageServer, key: &str, scope: Option<StorageScope>) -> StorageResult<String> {
        let started = Instant::now();
        let result = match validate_key(key).and_then(|_| self.resolve(server, scope)) {
            Ok((ns, backend)) => {
                let key = key.to_string();
                detached("get", async move {
                    let value = backend.get(&key).await?;
                    value.ok_or(StorageError::NotFound(key))
                })
                .await
                .map(|v| (ns, v))
            }
            Err(e) => Err(e),
        };
        finish("get", scope, started, result)
    }

    pub async fn get_all(&self, server: StorageServer, scope: Option<StorageScope>) -> StorageResult<Collection> {
        let started = Instant::now();
        let result = match self.resolve(server, scope) {
            Ok((ns, backend)) => detached("get_all", async move { backend.get_all().await }).await.map(|all| (ns, all)),
            Err(e) => Err(e),
        };
        finish("get_all", scope, started, result)
    }

    pub async fn set(&self, server: StorageServer, key: &str, value: String, scope: Option<StorageScope>) -> StorageResult<()> {
        let started = Instant::now();
        let result = match validate_key(key).and_then(|_| self.resolve(server, scope)) {
            Ok((ns, backend)) => {
                let key = key.to_string();
                detached("set", async move { backend.set(&key, value).await }).await.map(|_| (ns, ()))
            }
            Err(e) => Err(e),
        };
        finish("set", scope, started, result)
    }

    /// Replace the namespace's whole collection with `entries`.
    pub async fn set_all(&self, server: StorageServer, entries: Collection, scope: Option<StorageScope>) -> StorageResult<()> {
        let started = Instant::now();
        let checked = entries.keys().try_for_each(|k| validate_key(k));
        let result = match checked.and_then(|_| self.resolve(server, scope)) {
            Ok((ns, backend)) => detached("set_all", async move { backend.set_all(entries).await }).await.map(|_| (ns, ())),
            Err(e) => Err(e),
        };
        finish("set_all", scope, started, result)
    }

    /// Deleting a missing key succeeds.
    pub async fn delete(&self, server: StorageServer, key: &str, scope: Option<StorageScope>) -> StorageResult<()> {
        let started = Instant::now();
        let result = match validate_key(key).and_then(|_| self.resolve(server, scope)) {
            Ok((ns, backend)) => {
                let key = key.to_string();
                detached("delete", async move { backend.delete(&key).await }).await.map(|_| (ns, ()))
            }
            Err(e) => Err(e),
        };
        finish("delete", scope, started, result)
    }

    pub async fn delete_all(&self, server: StorageServer, scope: Option<StorageScope>) -> StorageResult<()> {
        let started = Instant::now();
        let result = match self.resolve(server, scope) {
            Ok((ns, backend)) => detached("delete_all", async move { backend.delete_all().await }).await.map(|_| (ns, ())),
            Err(e) => Err(e),
        };
        finish("delete_all", scope, started, result)
    }
}

/// Run a backend call on its own task; once issued it completes even if the caller goes away.
async fn detached<T, Fut>(op: &'static str, call: Fut) -> StorageResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = StorageResult<T>> + Send + 'static,
{
    tokio::spawn(call)
        .await
        .map_err(|e| StorageError::unavailable(format!("storage {op} task failed: {e}")))?
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    Ok(())
}

fn unavailable(server: StorageServer, scope: Option<StorageScope>) -> StorageError {
    let label = scope.map(|s| s.as_str()).unwrap_or("<default>");
    StorageError::unavailable(format!("Storage is unavailable, server '{server}', storage type - '{label}'"))
}

/// Record metrics and logs for one call and strip the namespace off the result.
fn finish<T>(op: &'static str, requested: Option<StorageScope>, started: Instant, result: StorageResult<(Namespace, T)>) -> StorageResult<T> {
    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok((ns, value)) => {
            metrics::record_operation(op, ns.scope.as_str(), "ok", elapsed);
            debug!(op, namespace = %ns, elapsed, "storage op ok");
            Ok(value)
        }
        Err(e) => {
            let scope = requested.map(|s| s.as_str()).unwrap_or("default");
            metrics::record_operation(op, scope, e.kind(), elapsed);
            match &e {
                StorageError::NotFound(_) => debug!(op, scope, error = %e, "storage op miss"),
                _ => warn!(op, scope, error = %e, "storage op failed"),
            }
            Err(e)
        }
    }
}
