//! Client for an external storage service that speaks the storage HTTP surface:
//!
//! - `GET|POST|DELETE <base>/?storageType=<t>` for the whole collection
//! - `GET|POST|DELETE <base>/<key>?storageType=<t>` for one key
//!
//! Errors come back as `{"err": "..."}` (or `{"error": "..."}` from older
//! servers). A 404 means a missing key only when it carries the
//! [`STORAGE_ERROR_HEADER`] or the `{"err"}` envelope; any other 404 is a
//! misrouted request. The transport's connect/request timeouts are the only
//! timeouts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{StorageError, StorageResult};
use crate::storage::backend::{json_to_text, Collection, KvBackend};
use crate::storage::scope::StorageScope;

/// Set by the storage server on error responses; the value is the error kind.
pub const STORAGE_ERROR_HEADER: &str = "x-storage-error";

#[derive(Clone)]
pub struct RemoteBackend {
    client: Client,
    base: Url,
    scope: StorageScope,
}

#[derive(Deserialize)]
struct KeyValueBody {
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct ErrBody {
    err: Option<String>,
    error: Option<String>,
}

impl RemoteBackend {
    /// `base` is the storage root of the remote service, e.g. `http://host:8542/storage`.
    pub fn new(base: &str, scope: StorageScope, connect_timeout: Duration, request_timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| StorageError::unavailable(format!("cannot build storage client: {e}")))?;
        Self::with_client(client, base, scope)
    }

    pub fn with_client(client: Client, base: &str, scope: StorageScope) -> StorageResult<Self> {
        let base = Url::parse(base).map_err(|e| StorageError::unavailable(format!("invalid storage url '{base}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::unavailable(format!("invalid storage url '{base}'")));
        }
        Ok(Self { client, base, scope })
    }

    /// `<base>/<key>?storageType=<scope>`; the key is percent-encoded as one segment.
    pub fn key_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(key);
        }
        url.query_pairs_mut().clear().append_pair("storageType", self.scope.as_str());
        url
    }

    /// `<base>/?storageType=<scope>`, adding the trailing slash when missing.
    pub fn all_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("");
        }
        url.query_pairs_mut().clear().append_pair("storageType", self.scope.as_str());
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> StorageResult<Response> {
        request.send().await.map_err(|e| {
            let msg = format!("storage service {} unreachable: {e}", url);
            warn!(error = %msg, "storage error");
            StorageError::unavailable(msg)
        })
    }

    /// Turn a non-success response into the matching error.
    async fn failure(&self, resp: Response) -> StorageError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: ErrBody = serde_json::from_str(&text).unwrap_or_default();
        let msg = parsed
            .err
            .or(parsed.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| if text.trim().is_empty() { status.to_string() } else { text });
        warn!(%status, scope = %self.scope, "storage error: {msg}");
        match status {
            StatusCode::BAD_REQUEST => StorageError::InvalidValue(msg),
            _ => StorageError::unavailable(msg),
        }
    }

    /// Resolve a 404: `Ok` for a storage miss, `BackendUnavailable` otherwise.
    async fn missing(&self, resp: Response) -> StorageResult<()> {
        let marked = resp
            .headers()
            .get(STORAGE_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|kind| kind == "not_found");
        if marked {
            return Ok(());
        }
        let url = resp.url().clone();
        let text = resp.text().await.unwrap_or_default();
        if let Ok(ErrBody { err: Some(_), .. }) = serde_json::from_str::<ErrBody>(&text) {
            return Ok(());
        }
        let msg = format!("storage service {url} answered 404 without a storage error; check the storage url");
        warn!(scope = %self.scope, "storage error: {msg}");
        Err(StorageError::unavailable(msg))
    }

    async fn expect_no_content(&self, resp: Response) -> StorageResult<()> {
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.failure(resp).await)
        }
    }
}

#[async_trait]
impl KvBackend for RemoteBackend {
    fn describe(&self) -> String {
        format!("remote:{}?storageType={}", self.base, self.scope)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let url = self.key_url(key);
        let resp = self.send(self.client.get(url.clone()), &url).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => self.missing(resp).await.map(|_| None),
            s if s.is_success() => {
                let body: KeyValueBody = resp
                    .json()
                    .await
                    .map_err(|e| StorageError::unavailable(format!("malformed storage response: {e}")))?;
                Ok(json_to_text(body.value))
            }
            _ => Err(self.failure(resp).await),
        }
    }

    async fn get_all(&self) -> StorageResult<Collection> {
        let url = self.all_url();
        let resp = self.send(self.client.get(url.clone()), &url).await?;
        if !resp.status().is_success() {
            return Err(self.failure(resp).await);
        }
        let body: HashMap<String, serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| StorageError::unavailable(format!("malformed storage response: {e}")))?;
        debug!(entries = body.len(), scope = %self.scope, "remote get_all");
        Ok(body.into_iter().filter_map(|(k, v)| json_to_text(v).map(|v| (k, v))).collect())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let url = self.key_url(key);
        let request = self.client.post(url.clone()).json(&serde_json::json!({ "value": value }));
        let resp = self.send(request, &url).await?;
        self.expect_no_content(resp).await
    }

    async fn set_all(&self, entries: Collection) -> StorageResult<()> {
        let url = self.all_url();
        let resp = self.send(self.client.post(url.clone()).json(&entries), &url).await?;
        self.expect_no_content(resp).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let url = self.key_url(key);
        let resp = self.send(self.client.delete(url.clone()), &url).await?;
        // a missing key is not an error
        if resp.status() == StatusCode::NOT_FOUND {
            return self.missing(resp).await;
        }
        self.expect_no_content(resp).await
    }

    async fn delete_all(&self) -> StorageResult<()> {
        let url = self.all_url();
        let resp = self.send(self.client.delete(url.clone()), &url).await?;
        self.expect_no_content(resp).await
    }
}
