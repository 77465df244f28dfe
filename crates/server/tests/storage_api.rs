use std::path::PathBuf;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::Service;
use uuid::Uuid;

use server::routes::{self, AppState};
use server::startup::{build_storage, StorageStack};

fn cors() -> tower_http::cors::CorsLayer { tower_http::cors::CorsLayer::very_permissive() }

/// Storage behind a test router, with its temp data directory.
struct TestStorage {
    stack: StorageStack,
    dir: PathBuf,
}

impl TestStorage {
    async fn finish(self) {
        self.stack.shutdown().await;
        let _ = tokio::fs::remove_dir_all(&self.dir).await;
    }
}

async fn build_app() -> anyhow::Result<(Router, TestStorage)> {
    let dir = std::env::temp_dir().join(format!("storage_api_{}", Uuid::new_v4()));
    let mut cfg = configs::StorageConfig::default();
    cfg.data_dir = dir.to_string_lossy().to_string();
    cfg.normalize_and_validate()?;
    let stack = build_storage(&cfg).await?;
    let state = AppState { storage: stack.service.clone() };
    Ok((routes::build_router(state, "/storage", cors()), TestStorage { stack, dir }))
}

fn request(method: &str, uri: &str, body: Option<Value>) -> anyhow::Result<Request<Body>> {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&v)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(req)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let resp = app.clone().call(request(method, uri, body)?).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, json))
}

#[tokio::test]
async fn set_then_get_key() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;

    let (status, _) = send(&app, "POST", "/storage/Key%201", Some(json!({"value": "I am a simple object"}))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", "/storage/Key%201", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"key": "Key 1", "value": "I am a simple object"}));

    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn missing_key_is_404_with_err_envelope() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;
    let (status, body) = send(&app, "GET", "/storage/missing-key?storageType=local", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["err"].as_str().is_some_and(|m| m.contains("missing-key")), "{body}");

    let resp = app.clone().call(request("GET", "/storage/missing-key", None)?).await?;
    assert_eq!(resp.headers().get("x-storage-error").and_then(|v| v.to_str().ok()), Some("not_found"));
    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn unknown_storage_type_is_400() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;
    for (method, uri) in [("GET", "/storage/?storageType=disk"), ("DELETE", "/storage/k?storageType=disk")] {
        let (status, body) = send(&app, method, uri, None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["err"].as_str().is_some_and(|m| m.contains("Unrecognized storage type 'disk'")), "{body}");
    }
    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn set_all_replaces_collection() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;
    send(&app, "POST", "/storage/old?storageType=ha", Some(json!({"value": "stale"}))).await?;

    let (status, _) = send(&app, "POST", "/storage/?storageType=ha", Some(json!({"42": "Replacement", "n": 7}))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", "/storage/?storageType=ha", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"42": "Replacement", "n": "7"}));

    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent_and_delete_all_clears() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;

    let (status, _) = send(&app, "DELETE", "/storage/never-set", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(&app, "POST", "/storage/a", Some(json!({"value": "1"}))).await?;
    send(&app, "POST", "/storage/b", Some(json!({"value": "2"}))).await?;
    let (status, _) = send(&app, "DELETE", "/storage/a", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/storage/a", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/storage", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/storage/", None).await?;
    assert_eq!(body, json!({}));

    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn scopes_are_isolated() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;
    send(&app, "POST", "/storage/shared?storageType=local", Some(json!({"value": "local"}))).await?;
    send(&app, "POST", "/storage/shared?storageType=ha", Some(json!({"value": "ha"}))).await?;

    // omitted storageType resolves to cluster on app-server
    let (status, _) = send(&app, "GET", "/storage/shared", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/storage/shared?storageType=local", None).await?;
    assert_eq!(body["value"], "local");
    let (_, body) = send(&app, "GET", "/storage/shared?storageType=ha", None).await?;
    assert_eq!(body["value"], "ha");

    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn value_handling_in_request_body() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;

    let (status, body) = send(&app, "POST", "/storage/k", Some(json!({"other": 1}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"err": "value wasn't found in request body"}));

    let (status, _) = send(&app, "POST", "/storage/obj", Some(json!({"value": {"a": [1, 2]}}))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/storage/obj", None).await?;
    assert_eq!(body["value"], r#"{"a":[1,2]}"#);

    let resp = app
        .clone()
        .call(
            Request::builder()
                .method("POST")
                .uri("/storage/k")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))?,
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn zss_without_remote_is_unavailable() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;
    let (status, body) = send(&app, "GET", "/storage/k?storageServer=zss&storageType=local", None).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["err"].as_str().is_some_and(|m| m.contains("Storage is unavailable")), "{body}");

    let (status, _) = send(&app, "GET", "/storage/k?storageServer=mainframe", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    storage.finish().await;
    Ok(())
}

#[tokio::test]
async fn health_metrics_and_docs() -> anyhow::Result<()> {
    let (app, storage) = build_app().await?;

    let (status, body) = send(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    send(&app, "GET", "/storage/", None).await?;
    let resp = app.clone().call(request("GET", "/metrics", None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(axum::body::to_bytes(resp.into_body(), usize::MAX).await?.to_vec())?;
    assert!(text.contains("storage_operations_total"), "{text}");

    let (status, body) = send(&app, "GET", "/api-docs/openapi.json", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/storage/{key}").is_some());

    storage.finish().await;
    Ok(())
}
