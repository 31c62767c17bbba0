//! 💀 Errors — the complete field guide to everything a search cluster can throw at you.
//!
//! 🎬 COLD OPEN — INT. ON-CALL ROTATION — 2:13 AM
//!
//! The cluster said `429`. Then it said `search_phase_execution_exception`. Then it said
//! something about a parent circuit breaker and "Data too large", which is also what the
//! engineer's therapist said about their backlog.
//!
//! Two layers live here:
//! - [`RemoteFailure`]: the raw, unfiltered thing that went wrong on the wire. Status codes,
//!   error bodies, transport hiccups, bodies bigger than our patience.
//! - [`SearchError`]: the closed taxonomy callers actually match on. Only the translator in
//!   [`crate::translator`] turns the first into the second. Nobody else gets to freelance.
//!
//! 🦆 The duck has filed a ticket. The ticket was classified as `Unclassified`.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// 📡 A structured error reported by the remote cluster.
///
/// `message` follows the `Elasticsearch exception [type=..., reason=...]` shape so the
/// translator can parse type and reason out of it. `error` keeps the raw `error` object
/// from the response body, which is where the metadata (`index`, `resource.id`) and the
/// nested `caused_by` chain hide.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterException {
    /// HTTP status of the response that carried the error, when there was one.
    pub status: Option<u16>,
    pub message: String,
    pub error: Option<Value>,
}

impl ClusterException {
    /// 🏗️ Build from an error response body (`{"error": {...}, "status": 404}`).
    ///
    /// Returns `None` when the body has no `error` member at all, in which case the caller
    /// should fall back to [`RemoteFailure::Status`].
    pub fn from_error_body(status: u16, body: &Value) -> Option<Self> {
        match body.get("error")? {
            error @ Value::Object(_) => {
                let error_type = error.get("type").and_then(Value::as_str).unwrap_or("exception");
                let reason = error.get("reason").and_then(Value::as_str).unwrap_or_default();
                Some(Self {
                    status: Some(status),
                    message: format!("Elasticsearch exception [type={error_type}, reason={reason}]"),
                    error: Some(error.clone()),
                })
            }
            // -- 🧓 ancient clusters answered with a plain string. we still love them.
            Value::String(text) => Some(Self {
                status: Some(status),
                message: text.clone(),
                error: None,
            }),
            _ => None,
        }
    }

    /// 🔍 Metadata lookup on the structured cause, e.g. `index` or `resource.id`.
    ///
    /// Looks at the top-level error first, then at the first `root_cause` entry. Anything
    /// that is not a plain string (or a single-element string array) is treated as absent.
    pub fn metadata(&self, key: &str) -> Option<String> {
        let error = self.error.as_ref()?;
        let root_cause = error.get("root_cause").and_then(|causes| causes.get(0));
        [Some(error), root_cause]
            .into_iter()
            .flatten()
            .find_map(|node| string_like(node.get(key)?))
    }

    /// 🧅 The deepest nested cause, following `caused_by` until the onion runs out of layers.
    ///
    /// Falls back to the first `root_cause` entry when there is no `caused_by` chain.
    /// `None` means the error had no nested cause at all.
    pub fn root_cause(&self) -> Option<&Value> {
        let error = self.error.as_ref()?;
        let mut deepest = None;
        let mut cursor = error.get("caused_by");
        while let Some(cause) = cursor.filter(|c| c.is_object()) {
            deepest = Some(cause);
            cursor = cause.get("caused_by");
        }
        deepest.or_else(|| error.get("root_cause").and_then(|causes| causes.get(0)))
    }
}

fn string_like(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.len() == 1 => items[0].as_str().map(str::to_owned),
        _ => None,
    }
}

impl fmt::Display for ClusterException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

/// 🌩️ Everything that can go wrong between "send request" and "here is your JSON".
///
/// This is the input of [`crate::translator::translate`]. It never reaches callers directly;
/// at most it rides along as the `#[source]` of [`SearchError::Unclassified`].
#[derive(Debug, Error)]
pub enum RemoteFailure {
    /// The cluster answered with a structured error body.
    #[error("{0}")]
    Cluster(ClusterException),

    /// Non-2xx response without anything resembling a structured error.
    #[error("remote cluster answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body blew through the configured ceiling while we were reading it.
    #[error("response body of at least {size} bytes exceeds the configured ceiling of {limit} bytes")]
    ContentTooLong { size: u64, limit: u64 },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode response from remote cluster: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

/// 🏷️ The closed taxonomy of search failures.
///
/// Produced exclusively by [`crate::translator::translate`] (plus the two lifecycle kinds,
/// `ClientTimeout` from the gateway and `AlreadyCancelled` from chunked results).
/// Retry and backoff live above this crate; [`SearchError::is_transient`] is their hint.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{message}")]
    IndexNotFound {
        resource: Option<String>,
        message: String,
    },

    #[error("no master node has been discovered in the remote cluster")]
    MasterNotDiscovered,

    #[error("no write index is defined for alias [{target}]")]
    InvalidWriteTarget { target: String },

    #[error("batch size too large: {detail}")]
    BatchSizeTooLarge { detail: String },

    #[error("mapper parsing failed: {detail}")]
    MapperParsing { detail: String },

    #[error("parent circuit breaker tripped: {detail}")]
    ParentCircuitBreaking { detail: String },

    /// The client-side deadline elapsed. The server may still be chewing on the request.
    #[error("{context}: no response within the client-side timeout of {timeout:?}")]
    ClientTimeout { context: String, timeout: Duration },

    #[error("{context}")]
    Unclassified {
        context: String,
        #[source]
        cause: RemoteFailure,
    },

    /// `next_chunk()` was called after `cancel()`. The server-side context is gone.
    #[error("chunked result was already cancelled, refusing to resume iteration")]
    AlreadyCancelled,
}

impl SearchError {
    /// 🔄 Whether a retry of the whole retrieval has a fighting chance.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::MasterNotDiscovered
                | SearchError::ParentCircuitBreaking { .. }
                | SearchError::BatchSizeTooLarge { .. }
                | SearchError::ClientTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_an_error_body_becomes_a_parseable_message() {
        let body = json!({
            "error": {"type": "index_not_found_exception", "reason": "no such index [graylog_9]", "index": "graylog_9"},
            "status": 404
        });
        let exception = ClusterException::from_error_body(404, &body).expect("error body should parse");

        assert_eq!(
            exception.message,
            "Elasticsearch exception [type=index_not_found_exception, reason=no such index [graylog_9]]"
        );
        assert_eq!(exception.metadata("index").as_deref(), Some("graylog_9"));
        assert_eq!(exception.to_string(), format!("{} (HTTP 404)", exception.message));
    }

    #[test]
    fn the_one_where_the_body_has_no_error_and_nobody_pretends_otherwise() {
        assert!(ClusterException::from_error_body(500, &json!({"acknowledged": false})).is_none());
        assert!(ClusterException::from_error_body(500, &json!({"error": 42})).is_none());
    }

    #[test]
    fn the_one_where_the_root_cause_is_at_the_bottom_of_the_onion() {
        let exception = ClusterException::from_error_body(
            500,
            &json!({"error": {
                "type": "search_phase_execution_exception",
                "reason": "all shards failed",
                "caused_by": {"type": "a", "reason": "outer", "caused_by": {"type": "b", "reason": "inner"}}
            }}),
        )
        .expect("error body should parse");

        assert_eq!(exception.root_cause().and_then(|c| c["reason"].as_str()), Some("inner"));
    }

    #[test]
    fn the_one_where_root_cause_array_fills_in_for_missing_metadata() {
        let exception = ClusterException::from_error_body(
            404,
            &json!({"error": {
                "type": "index_not_found_exception",
                "reason": "no such index",
                "root_cause": [{"type": "index_not_found_exception", "resource.id": ["graylog_3"]}]
            }}),
        )
        .expect("error body should parse");

        assert_eq!(exception.metadata("resource.id").as_deref(), Some("graylog_3"));
        assert_eq!(exception.metadata("index"), None);
    }

    #[test]
    fn the_one_where_only_the_weather_related_failures_are_worth_retrying() {
        assert!(SearchError::MasterNotDiscovered.is_transient());
        assert!(SearchError::ClientTimeout { context: "x".into(), timeout: Duration::from_secs(1) }.is_transient());
        assert!(!SearchError::InvalidWriteTarget { target: "graylog_deflector".into() }.is_transient());
        assert!(!SearchError::AlreadyCancelled.is_transient());
    }
}
