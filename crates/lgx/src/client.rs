//! 📡 The Remote Client Gateway — the only door between this crate and the cluster.
//!
//! 🎬 *[a request leaves the building. it may come back with hits. it may come back with a
//! `circuit_breaking_exception` and a thousand-yard stare.]*
//!
//! Two layers:
//! - raw operations ([`SearchClient::search`], [`SearchClient::scroll`],
//!   [`SearchClient::clear_scroll`]) speak HTTP and fail with [`RemoteFailure`].
//! - [`SearchClient::execute`] and [`SearchClient::execute_with_timeout`] run an operation and
//!   send any failure through [`translate`] exactly once, so callers only ever see [`SearchError`].
//!
//! ⚠️ `execute_with_timeout` gives up waiting; it does not stop the server. A search that misses
//! the client-side deadline keeps running on the cluster until it finishes on its own.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::app_config::SearchConfig;
use crate::common::{SearchRequest, SearchResponse};
use crate::errors::{ClusterException, RemoteFailure, SearchError};
use crate::translator::translate;

const JSON_CONTENT_TYPE: &str = "application/json";
const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// 📡 Cheap to clone: the connection pool inside is shared between clones.
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
    request_timeout: Duration,
    max_response_size_bytes: u64,
    max_concurrent_searches: Option<u32>,
    max_concurrent_shard_requests: Option<u32>,
}

impl fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -- 🔒 credentials stay out of the logs. the password has suffered enough.
        f.debug_struct("SearchClient")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("max_response_size_bytes", &self.max_response_size_bytes)
            .finish()
    }
}

#[derive(Deserialize)]
struct MultiSearchEnvelope {
    responses: Vec<Value>,
}

impl SearchClient {
    /// 🚀 Build the client. No network traffic happens here.
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&config.url)
            .with_context(|| format!("💀 '{}' is not a URL the cluster can live at. Scheme, host, port. All of it.", config.url))?;
        // -- 🔧 trailing slash so `join` appends instead of replacing the last path segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(config.compression_enabled)
            .build()
            .context("💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed system OpenSSL.")?;

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
            max_response_size_bytes: config.max_response_size_bytes,
            max_concurrent_searches: config.max_concurrent_searches,
            max_concurrent_shard_requests: config.max_concurrent_shard_requests,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// 🔄 Run `operation` and translate whatever it throws.
    ///
    /// `context` is a human-readable description of what was being attempted; it becomes the
    /// headline of `Unclassified` errors and the prefix of `IndexNotFound` messages.
    pub async fn execute<'a, T, F, Fut>(&'a self, context: &str, operation: F) -> Result<T, SearchError>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = Result<T, RemoteFailure>>,
    {
        operation(self)
            .await
            .map_err(|failure| translate(failure, context))
    }

    /// ⏱️ Like [`SearchClient::execute`], but stop waiting after `timeout`.
    ///
    /// A missed deadline is a [`SearchError::ClientTimeout`]. Nothing is retried and the server is
    /// not told to stop; whatever it was doing, it keeps doing.
    pub async fn execute_with_timeout<'a, T, F, Fut>(
        &'a self,
        context: &str,
        timeout: Duration,
        operation: F,
    ) -> Result<T, SearchError>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = Result<T, RemoteFailure>>,
    {
        match tokio::time::timeout(timeout, operation(self)).await {
            Ok(outcome) => outcome.map_err(|failure| translate(failure, context)),
            Err(_elapsed) => Err(SearchError::ClientTimeout {
                context: context.to_owned(),
                timeout,
            }),
        }
    }

    /// ⏱️ [`SearchClient::execute_with_timeout`] with the configured `request_timeout` as the deadline.
    pub async fn execute_with_default_timeout<'a, T, F, Fut>(&'a self, context: &str, operation: F) -> Result<T, SearchError>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = Result<T, RemoteFailure>>,
    {
        self.execute_with_timeout(context, self.request_timeout(), operation).await
    }

    /// 🔎 `POST {indices}/_search`, optionally opening a scroll context.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RemoteFailure> {
        let mut params = vec![
            ("ignore_unavailable", request.ignore_unavailable.to_string()),
            ("expand_wildcards", "open".to_owned()),
        ];
        if let Some(scroll) = &request.scroll {
            params.push(("scroll", scroll.clone()));
        }
        if let Some(max) = self.max_concurrent_shard_requests {
            params.push(("max_concurrent_shard_requests", max.to_string()));
        }

        let body = serde_json::to_vec(&request.body)?;
        self.send_json(Method::POST, &request.search_path(), &params, Some((body, JSON_CONTENT_TYPE)))
            .await
    }

    /// 📜 `POST _search/scroll`: the next page of an open scroll context, renewing its keep-alive.
    pub async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchResponse, RemoteFailure> {
        let body = serde_json::to_vec(&json!({ "scroll": keep_alive, "scroll_id": scroll_id }))?;
        self.send_json(Method::POST, "_search/scroll", &[], Some((body, JSON_CONTENT_TYPE)))
            .await
    }

    /// 🗑️ `DELETE _search/scroll`: release scroll contexts on the server.
    pub async fn clear_scroll(&self, scroll_ids: &[String]) -> Result<(), RemoteFailure> {
        let body = serde_json::to_vec(&json!({ "scroll_id": scroll_ids }))?;
        self.send(Method::DELETE, "_search/scroll", &[], Some((body, JSON_CONTENT_TYPE)))
            .await?;
        Ok(())
    }

    /// 🧺 `POST _msearch`: many searches, one round trip.
    ///
    /// The outer `Result` fails when the round trip itself fails. Each item then succeeds or
    /// fails on its own, translated independently.
    pub async fn msearch(
        &self,
        requests: &[SearchRequest],
        context: &str,
    ) -> Result<Vec<Result<SearchResponse, SearchError>>, SearchError> {
        let envelope: MultiSearchEnvelope = self
            .execute(context, |client| client.msearch_raw(requests))
            .await?;

        Ok(envelope
            .responses
            .into_iter()
            .map(|item| multi_search_item(item, context))
            .collect())
    }

    async fn msearch_raw(&self, requests: &[SearchRequest]) -> Result<MultiSearchEnvelope, RemoteFailure> {
        let mut payload = Vec::new();
        for request in requests {
            let mut header = json!({ "expand_wildcards": "open", "ignore_unavailable": request.ignore_unavailable });
            if !request.indices.is_empty() {
                header["index"] = json!(request.indices);
            }
            serde_json::to_writer(&mut payload, &header)?;
            payload.push(b'\n');
            serde_json::to_writer(&mut payload, &request.body)?;
            payload.push(b'\n');
        }

        let mut params = Vec::new();
        if let Some(max) = self.max_concurrent_searches {
            params.push(("max_concurrent_searches", max.to_string()));
        }
        if let Some(max) = self.max_concurrent_shard_requests {
            params.push(("max_concurrent_shard_requests", max.to_string()));
        }

        self.send_json(Method::POST, "_msearch", &params, Some((payload, NDJSON_CONTENT_TYPE)))
            .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<(Vec<u8>, &'static str)>,
    ) -> Result<T, RemoteFailure> {
        let bytes = self.send(method, path, params, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 📡 One HTTP round trip. Non-2xx answers become [`RemoteFailure::Cluster`] when the body
    /// carries a structured error, [`RemoteFailure::Status`] otherwise.
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<(Vec<u8>, &'static str)>,
    ) -> Result<Vec<u8>, RemoteFailure> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|error| RemoteFailure::InvalidUrl(format!("{path}: {error}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        trace!("📡 {} {}", method, url);

        let mut request = self.authorize(self.http.request(method, url));
        if let Some((bytes, content_type)) = body {
            request = request.header(header::CONTENT_TYPE, content_type).body(bytes);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = self.read_body(response).await?;

        if !status.is_success() {
            let code = status.as_u16();
            debug!("💀 cluster answered HTTP {} ({} bytes)", code, bytes.len());
            let structured = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|body| ClusterException::from_error_body(code, &body));
            return Err(match structured {
                Some(exception) => RemoteFailure::Cluster(exception),
                None => RemoteFailure::Status {
                    status: code,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                },
            });
        }

        Ok(bytes)
    }

    /// 🔒 API key wins over basic auth. This is not a democracy.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(api_key) = &self.api_key {
            request.header(header::AUTHORIZATION, format!("ApiKey {api_key}"))
        } else if let Some(username) = &self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }

    /// 📏 Read the body, refusing to go past the configured ceiling.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, RemoteFailure> {
        let limit = self.max_response_size_bytes;
        if let Some(declared) = response.content_length().filter(|declared| *declared > limit) {
            return Err(RemoteFailure::ContentTooLong { size: declared, limit });
        }

        let mut buffer = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (buffer.len() + chunk.len()) as u64;
            if size > limit {
                return Err(RemoteFailure::ContentTooLong { size, limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer)
    }
}

fn multi_search_item(item: Value, context: &str) -> Result<SearchResponse, SearchError> {
    let status = item
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
        .unwrap_or(500);
    if let Some(exception) = ClusterException::from_error_body(status, &item) {
        return Err(translate(RemoteFailure::Cluster(exception), context));
    }
    serde_json::from_value(item).map_err(|error| translate(RemoteFailure::Decode(error), context))
}
