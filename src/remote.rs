//! Algolia REST implementation of [`RemoteStore`].
//!
//! Talks to the `/1/indexes/...` endpoints with `reqwest`. Every mutating
//! endpoint answers with a `taskID`; the client polls
//! `/1/indexes/{index}/task/{taskID}` until the task is `published` before
//! returning, so callers observe their writes.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use searchsync_core::models::Record;
use searchsync_core::settings::Settings;
use searchsync_core::store::{BrowsePage, RemoteError, RemoteStore};

use crate::config::IndexConfig;
use crate::error::SyncError;

/// ACLs an API key needs for every searchsync operation.
pub const REQUIRED_ACLS: [&str; 6] = [
    "addObject",
    "deleteObject",
    "browse",
    "settings",
    "editSettings",
    "deleteIndex",
];

const BROWSE_PAGE_SIZE: usize = 1000;
const TASK_POLL_START: Duration = Duration::from_millis(100);
const TASK_POLL_MAX: Duration = Duration::from_secs(1);

pub struct AlgoliaClient {
    http: reqwest::Client,
    base_url: String,
    application_id: String,
    api_key: String,
    max_retries: u32,
    /// Upper bound on the time spent waiting for one task to publish.
    task_timeout: Duration,
}

impl AlgoliaClient {
    /// Build a client from the `[index]` configuration.
    ///
    /// # Errors
    ///
    /// [`SyncError::Credentials`] when the application id or the API key is
    /// missing.
    pub fn from_config(config: &IndexConfig) -> Result<Self, SyncError> {
        if config.application_id.trim().is_empty() {
            return Err(SyncError::Credentials(
                "index.application_id is not set".to_string(),
            ));
        }
        let api_key = config.api_key().ok_or_else(|| {
            SyncError::Credentials(format!(
                "no API key found in the {} environment variable",
                config.api_key_env
            ))
        })?;
        let base_url = format!("https://{}.algolia.net", config.application_id.trim());
        Self::new(base_url, config.application_id.trim(), api_key, config)
    }

    /// Build a client against an explicit host, e.g. a local mock.
    pub fn new(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        api_key: impl Into<String>,
        config: &IndexConfig,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                SyncError::Remote(RemoteError::new("build_client", None, None, e.to_string()))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
            task_timeout: Duration::from_secs(config.timeout_secs.saturating_mul(10)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one request with retries.
    ///
    /// Returns `Ok(None)` on HTTP 404 so that callers decide whether a
    /// missing index is an error.
    async fn send(
        &self,
        operation: &str,
        index: Option<&str>,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, RemoteError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .http
                .request(method.clone(), self.url(path))
                .header("X-Algolia-Application-Id", &self.application_id)
                .header("X-Algolia-API-Key", &self.api_key);
            if let Some(body) = body {
                request = request.json(body);
            }
            debug!(operation, %method, path, attempt, "remote request");

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            RemoteError::new(operation, index, Some(status.as_u16()), e.to_string())
                        })?;
                        return Ok(Some(json));
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err =
                        RemoteError::from_response(operation, index, status.as_u16(), &body_text);

                    // Rate limited or server error: retry
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        warn!(operation, status = status.as_u16(), attempt, "retrying remote call");
                        last_err = Some(err);
                        continue;
                    }

                    // Client error (not 429): no retry
                    return Err(err);
                }
                Err(e) => {
                    warn!(operation, error = %e, attempt, "retrying remote call");
                    last_err = Some(RemoteError::new(operation, index, None, e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RemoteError::new(operation, index, None, "request failed after retries")
        }))
    }

    /// Like [`send`](Self::send), with a 404 reported as an error.
    async fn send_existing(
        &self,
        operation: &str,
        index: Option<&str>,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        self.send(operation, index, method, path, body)
            .await?
            .ok_or_else(|| RemoteError::new(operation, index, Some(404), "Index does not exist"))
    }

    /// Poll until the task behind `response` is published.
    async fn wait_task(
        &self,
        operation: &str,
        index: &str,
        response: &Value,
    ) -> Result<(), RemoteError> {
        let Some(task_id) = response.get("taskID").and_then(Value::as_u64) else {
            return Ok(());
        };

        let path = format!("/1/indexes/{}/task/{}", encode_segment(index), task_id);
        let started = tokio::time::Instant::now();
        let mut delay = TASK_POLL_START;

        loop {
            let status = self
                .send_existing(operation, Some(index), Method::GET, &path, None)
                .await?;
            if status.get("status").and_then(Value::as_str) == Some("published") {
                debug!(operation, index, task_id, "task published");
                return Ok(());
            }
            if started.elapsed() >= self.task_timeout {
                return Err(RemoteError::new(
                    operation,
                    Some(index),
                    None,
                    format!("task {} was not published in time", task_id),
                ));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(TASK_POLL_MAX);
        }
    }

    async fn batch(
        &self,
        operation: &str,
        index: &str,
        requests: Vec<Value>,
    ) -> Result<(), RemoteError> {
        let body = json!({ "requests": requests });
        let path = format!("/1/indexes/{}/batch", encode_segment(index));
        let response = self
            .send_existing(operation, Some(index), Method::POST, &path, Some(&body))
            .await?;
        self.wait_task(operation, index, &response).await
    }

    /// Verify that an admin key can list indices.
    async fn check_admin_key(&self) -> Result<(), RemoteError> {
        self.send_existing(
            "check_access",
            None,
            Method::GET,
            "/1/indexes?page=0&hitsPerPage=1",
            None,
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl RemoteStore for AlgoliaClient {
    async fn check_access(&self) -> Result<(), RemoteError> {
        let path = format!("/1/keys/{}", encode_segment(&self.api_key));
        // Admin keys are not listed under /1/keys.
        let Some(key) = self
            .send("check_access", None, Method::GET, &path, None)
            .await?
        else {
            return self.check_admin_key().await;
        };

        let missing = missing_acls(&key);
        if missing.is_empty() {
            return Ok(());
        }
        Err(RemoteError::new(
            "check_access",
            None,
            Some(403),
            format!("API key is missing the ACLs: {}", missing.join(", ")),
        ))
    }

    async fn upsert_objects(&self, index: &str, records: &[Record]) -> Result<(), RemoteError> {
        let requests = records
            .iter()
            .map(|record| {
                serde_json::to_value(record)
                    .map(|body| json!({ "action": "updateObject", "body": body }))
                    .map_err(|e| RemoteError::new("upsert_objects", Some(index), None, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.batch("upsert_objects", index, requests).await
    }

    async fn delete_objects(&self, index: &str, object_ids: &[String]) -> Result<(), RemoteError> {
        let requests = object_ids
            .iter()
            .map(|id| json!({ "action": "deleteObject", "body": { "objectID": id } }))
            .collect();
        self.batch("delete_objects", index, requests).await
    }

    async fn browse_object_ids(
        &self,
        index: &str,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, RemoteError> {
        let path = format!("/1/indexes/{}/browse", encode_segment(index));
        let body = browse_body(cursor);
        let response = self
            .send("browse", Some(index), Method::POST, &path, Some(&body))
            .await?;
        Ok(response.map(|json| parse_browse(&json)).unwrap_or_default())
    }

    async fn get_settings(&self, index: &str) -> Result<Option<Settings>, RemoteError> {
        let path = format!("/1/indexes/{}/settings?getVersion=2", encode_segment(index));
        let response = self
            .send("get_settings", Some(index), Method::GET, &path, None)
            .await?;
        Ok(response.map(|json| match json {
            Value::Object(map) => map,
            _ => Settings::new(),
        }))
    }

    async fn set_settings(&self, index: &str, settings: &Settings) -> Result<(), RemoteError> {
        let path = format!("/1/indexes/{}/settings", encode_segment(index));
        let body = Value::Object(settings.clone());
        let response = self
            .send_existing("set_settings", Some(index), Method::PUT, &path, Some(&body))
            .await?;
        self.wait_task("set_settings", index, &response).await
    }

    async fn move_index(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        let path = format!("/1/indexes/{}/operation", encode_segment(source));
        let body = json!({ "operation": "move", "destination": destination });
        let response = self
            .send_existing("move_index", Some(source), Method::POST, &path, Some(&body))
            .await?;
        self.wait_task("move_index", destination, &response).await
    }

    async fn delete_index(&self, index: &str) -> Result<(), RemoteError> {
        let path = format!("/1/indexes/{}", encode_segment(index));
        match self
            .send("delete_index", Some(index), Method::DELETE, &path, None)
            .await?
        {
            Some(response) => self.wait_task("delete_index", index, &response).await,
            None => Ok(()),
        }
    }
}

fn browse_body(cursor: Option<&str>) -> Value {
    let mut body = json!({
        "attributesToRetrieve": ["objectID"],
        "hitsPerPage": BROWSE_PAGE_SIZE,
    });
    if let Some(cursor) = cursor {
        body["cursor"] = json!(cursor);
    }
    body
}

fn parse_browse(json: &Value) -> BrowsePage {
    let object_ids = json
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("objectID").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let cursor = json
        .get("cursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    BrowsePage { object_ids, cursor }
}

fn missing_acls(key: &Value) -> Vec<&'static str> {
    let granted: Vec<&str> = key
        .get("acl")
        .and_then(Value::as_array)
        .map(|acl| acl.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    REQUIRED_ACLS
        .iter()
        .copied()
        .filter(|acl| !granted.contains(acl))
        .collect()
}

/// Percent-encode one path segment.
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
