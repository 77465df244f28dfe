use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use common::types::KeyValue;
use service::storage::backend::{json_to_text, Collection};
use service::{StorageScope, StorageServer};

use crate::errors::ApiError;
use crate::routes::AppState;

/// `?storageType=local|cluster|ha&storageServer=app-server|zss`, both optional.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StorageQuery {
    #[serde(rename = "storageType")]
    pub storage_type: Option<String>,
    #[serde(rename = "storageServer")]
    pub storage_server: Option<String>,
}

impl StorageQuery {
    /// Empty parameters count as omitted.
    pub fn target(&self) -> Result<(StorageServer, Option<StorageScope>), ApiError> {
        let server = match self.storage_server.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s.parse::<StorageServer>()?,
            None => StorageServer::AppServer,
        };
        let scope = self
            .storage_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<StorageScope>)
            .transpose()?;
        Ok((server, scope))
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[utoipa::path(
    get, path = "/storage/", tag = "storage",
    params(StorageQuery),
    responses(
        (status = 200, description = "All entries of the namespace", body = crate::openapi::CollectionDoc),
        (status = 400, description = "Unknown storage type", body = crate::openapi::ErrorDoc),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn get_all(
    State(state): State<AppState>,
    Query(q): Query<StorageQuery>,
) -> Result<Json<Collection>, ApiError> {
    let (server, scope) = q.target()?;
    let all = state.storage.get_all(server, scope).await?;
    Ok(Json(all))
}

#[utoipa::path(
    post, path = "/storage/", tag = "storage",
    params(StorageQuery),
    request_body = crate::openapi::CollectionDoc,
    responses(
        (status = 204, description = "Collection replaced"),
        (status = 400, description = "Invalid body, key or value", body = crate::openapi::ErrorDoc),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn set_all(
    State(state): State<AppState>,
    Query(q): Query<StorageQuery>,
    payload: Result<Json<HashMap<String, serde_json::Value>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let (server, scope) = q.target()?;
    let entries: Collection = body(payload)?
        .into_iter()
        .filter_map(|(k, v)| json_to_text(v).map(|v| (k, v)))
        .collect();
    info!(%server, scope = ?scope, entries = entries.len(), "storage set_all");
    state.storage.set_all(server, entries, scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete, path = "/storage/", tag = "storage",
    params(StorageQuery),
    responses(
        (status = 204, description = "Namespace cleared"),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn delete_all(
    State(state): State<AppState>,
    Query(q): Query<StorageQuery>,
) -> Result<StatusCode, ApiError> {
    let (server, scope) = q.target()?;
    info!(%server, scope = ?scope, "storage delete_all");
    state.storage.delete_all(server, scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get, path = "/storage/{key}", tag = "storage",
    params(("key" = String, Path, description = "Storage key"), StorageQuery),
    responses(
        (status = 200, description = "Value of the key", body = crate::openapi::KeyValueDoc),
        (status = 404, description = "Key not found", body = crate::openapi::ErrorDoc),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn get_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<StorageQuery>,
) -> Result<Json<KeyValue>, ApiError> {
    let (server, scope) = q.target()?;
    let value = state.storage.get(server, &key, scope).await?;
    Ok(Json(KeyValue { key, value: Some(value) }))
}

#[utoipa::path(
    post, path = "/storage/{key}", tag = "storage",
    params(("key" = String, Path, description = "Storage key"), StorageQuery),
    request_body = crate::openapi::SetValueDoc,
    responses(
        (status = 204, description = "Value stored"),
        (status = 400, description = "Missing or rejected value", body = crate::openapi::ErrorDoc),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn set_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<StorageQuery>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let (server, scope) = q.target()?;
    let value = body(payload)?
        .get_mut("value")
        .map(serde_json::Value::take)
        .and_then(json_to_text)
        .ok_or_else(|| ApiError::BadRequest("value wasn't found in request body".into()))?;
    state.storage.set(server, &key, value, scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete, path = "/storage/{key}", tag = "storage",
    params(("key" = String, Path, description = "Storage key"), StorageQuery),
    responses(
        (status = 204, description = "Key removed (or was absent)"),
        (status = 500, description = "Backend failure", body = crate::openapi::ErrorDoc)
    )
)]
pub async fn delete_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<StorageQuery>,
) -> Result<StatusCode, ApiError> {
    let (server, scope) = q.target()?;
    state.storage.delete(server, &key, scope).await?;
    Ok(StatusCode::NO_CONTENT)
}
