use std::net::SocketAddr;
use std::path::PathBuf;

use reqwest::StatusCode as HttpStatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use server::routes::{self, AppState};
use server::startup::{build_storage, StorageStack};

fn cors() -> CorsLayer { CorsLayer::very_permissive() }

struct TestApp {
    base_url: String,
    stack: StorageStack,
    dir: PathBuf,
}

impl TestApp {
    async fn finish(self) {
        self.stack.shutdown().await;
        let _ = tokio::fs::remove_dir_all(&self.dir).await;
    }
}

/// Start one storage server on an ephemeral port. When `remote` is set, zss
/// namespaces are forwarded to it.
async fn start_server(remote: Option<String>) -> anyhow::Result<TestApp> {
    let dir = std::env::temp_dir().join(format!("storage_e2e_{}", Uuid::new_v4()));
    let mut cfg = configs::StorageConfig::default();
    cfg.data_dir = dir.to_string_lossy().to_string();
    cfg.remote = remote.map(|url| configs::RemoteStorageConfig {
        url,
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
    });
    cfg.normalize_and_validate()?;

    let stack = build_storage(&cfg).await?;
    let app = routes::build_router(AppState { storage: stack.service.clone() }, "/storage", cors());
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    let base_url = format!("http://{}:{}", addr.ip(), addr.port());

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("server error: {}", e); }
    });

    Ok(TestApp { base_url, stack, dir })
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().build().expect("reqwest client")
}

#[tokio::test]
async fn crud_over_http() -> anyhow::Result<()> {
    let app = start_server(None).await?;
    let http = client();
    let url = |path: &str| format!("{}{}", app.base_url, path);

    let resp = http.post(url("/storage/greeting?storageType=local")).json(&json!({"value": "hello"})).send().await?;
    assert_eq!(resp.status(), HttpStatusCode::NO_CONTENT);

    let body: Value = http.get(url("/storage/greeting?storageType=local")).send().await?.json().await?;
    assert_eq!(body, json!({"key": "greeting", "value": "hello"}));

    let all: Value = http.get(url("/storage/?storageType=local")).send().await?.json().await?;
    assert_eq!(all, json!({"greeting": "hello"}));

    let resp = http.delete(url("/storage/greeting?storageType=local")).send().await?;
    assert_eq!(resp.status(), HttpStatusCode::NO_CONTENT);
    let resp = http.get(url("/storage/greeting?storageType=local")).send().await?;
    assert_eq!(resp.status(), HttpStatusCode::NOT_FOUND);

    app.finish().await;
    Ok(())
}

#[tokio::test]
async fn zss_requests_are_forwarded_to_remote_service() -> anyhow::Result<()> {
    let remote = start_server(None).await?;
    let front = start_server(Some(format!("{}/storage", remote.base_url))).await?;
    let http = client();

    let resp = http
        .post(format!("{}/storage/token?storageServer=zss&storageType=local", front.base_url))
        .json(&json!({"value": "abc"}))
        .send()
        .await?;
    assert_eq!(resp.status(), HttpStatusCode::NO_CONTENT);

    // lands in the remote's app-server local namespace
    let body: Value = http.get(format!("{}/storage/token?storageType=local", remote.base_url)).send().await?.json().await?;
    assert_eq!(body["value"], "abc");

    let body: Value = http
        .get(format!("{}/storage/token?storageServer=zss&storageType=local", front.base_url))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["value"], "abc");

    let resp = http.get(format!("{}/storage/nope?storageServer=zss&storageType=local", front.base_url)).send().await?;
    assert_eq!(resp.status(), HttpStatusCode::NOT_FOUND);

    // zss default is ha
    let resp = http
        .post(format!("{}/storage/?storageServer=zss", front.base_url))
        .json(&json!({"x": "1", "y": "2"}))
        .send()
        .await?;
    assert_eq!(resp.status(), HttpStatusCode::NO_CONTENT);
    let all: Value = http.get(format!("{}/storage/?storageType=ha", remote.base_url)).send().await?.json().await?;
    assert_eq!(all, json!({"x": "1", "y": "2"}));

    front.finish().await;
    remote.finish().await;
    Ok(())
}
