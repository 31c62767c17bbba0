//! 🔍 The Exception Translator — turning cluster tantrums into typed, actionable grief.
//!
//! 🎬 *[a cluster error arrives. it speaks only in snake_case and square brackets.]*
//! *["index_not_found_exception," it hisses. "reason=no such index [graylog_42]".]*
//! *[the translator nods, and writes `SearchError::IndexNotFound` on a sticky note.]*
//!
//! One pure function, [`translate`]. No I/O, no side effects, no panics. Rules are checked in
//! a fixed order and the first match wins:
//!
//! 1. structured cluster errors:
//!    a. index not found / index closed
//!    b. master not discovered (or a cluster block that mentions "no master")
//!    c. no write index defined for an alias
//!    d. batch size too large (the reason says so, or a search phase failure whose root cause does)
//!    e. mapper parsing failures
//!    f. parent circuit breaker trips
//! 2. bare HTTP 429/413 without a structured body. A structured body is judged by what it says,
//!    never by its status: the cluster answers 429 for circuit breakers and rejected executions too.
//! 3. response bodies that blew through the size ceiling
//! 4. everything else → [`SearchError::Unclassified`]
//!
//! Any parse that fails while checking a rule counts as "no match" and we move on. The
//! translator is the one place in this crate that is not allowed to have a bad day. 🦆

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::{ClusterException, RemoteFailure, SearchError};

// 🔒 both patterns are compile-time constants; if these fail to compile, so did we.
static INVALID_WRITE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"no write index is defined for alias \[(?<target>[\w_]+)\]")
        .expect("invalid write target pattern is a valid regex")
});

static PARSED_EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Elasticsearch|OpenSearch) exception \[type=(?<type>[\w_]+), reason=(?<reason>.*?)(?:\]+;|\]$)")
        .expect("parsed exception pattern is a valid regex")
});

const BATCH_SIZE_TOO_LARGE_REASON: &str = "Batch size is too large";
const PARENT_DATA_TOO_LARGE_REASON: &str = "[parent] Data too large";

/// 📋 Type and reason, as parsed from a cluster exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClusterException {
    pub error_type: String,
    pub reason: String,
}

impl ParsedClusterException {
    /// Parse `... exception [type=foo_exception, reason=...]`. Garbage in, `None` out.
    pub fn from_message(message: &str) -> Option<Self> {
        let captures = PARSED_EXCEPTION.captures(message)?;
        Some(Self {
            error_type: captures.name("type")?.as_str().to_owned(),
            reason: captures.name("reason")?.as_str().to_owned(),
        })
    }

    /// Read `type` and `reason` straight off a structured cause object.
    pub fn from_value(cause: &Value) -> Option<Self> {
        Some(Self {
            error_type: cause.get("type")?.as_str()?.to_owned(),
            reason: cause.get("reason").and_then(Value::as_str).unwrap_or_default().to_owned(),
        })
    }
}

/// 🔄 Reclassify a raw remote failure into the [`SearchError`] taxonomy.
///
/// `context` is the caller's human-readable description of what it was doing
/// ("Unable to perform scroll search"). It ends up in `IndexNotFound` messages and as the
/// headline of `Unclassified`.
pub fn translate(failure: RemoteFailure, context: &str) -> SearchError {
    match &failure {
        RemoteFailure::Cluster(exception) => {
            if let Some(translated) = translate_cluster_exception(exception, context) {
                return translated;
            }
        }
        RemoteFailure::Status { status, .. } if is_batch_size_status(*status) => {
            return SearchError::BatchSizeTooLarge {
                detail: failure.to_string(),
            };
        }
        RemoteFailure::ContentTooLong { .. } => {
            return SearchError::BatchSizeTooLarge {
                detail: failure.to_string(),
            };
        }
        _ => {}
    }

    SearchError::Unclassified {
        context: context.to_owned(),
        cause: failure,
    }
}

fn translate_cluster_exception(exception: &ClusterException, context: &str) -> Option<SearchError> {
    let parsed = ParsedClusterException::from_message(&exception.message);

    if is_index_not_found(exception) {
        let resource = exception
            .metadata("index")
            .or_else(|| exception.metadata("resource.id"));
        return Some(match resource {
            Some(resource) => SearchError::IndexNotFound {
                message: format!("{context}[{resource}]"),
                resource: Some(resource),
            },
            None => SearchError::IndexNotFound {
                resource: None,
                message: exception.message.clone(),
            },
        });
    }

    if let Some(parsed) = &parsed {
        if parsed.error_type == "master_not_discovered_exception"
            || (parsed.error_type == "cluster_block_exception" && parsed.reason.contains("no master"))
        {
            return Some(SearchError::MasterNotDiscovered);
        }

        if parsed.reason.starts_with("no write index is defined for alias") {
            // -- 🎯 the alias name is in the brackets. if the brackets lie, we fall through.
            let target = INVALID_WRITE_TARGET
                .captures(&exception.message)
                .and_then(|captures| captures.name("target"))
                .map(|target| target.as_str().to_owned());
            if let Some(target) = target {
                return Some(SearchError::InvalidWriteTarget { target });
            }
        }
    }

    if is_batch_size_too_large(exception, parsed.as_ref()) {
        return Some(SearchError::BatchSizeTooLarge {
            detail: exception.message.clone(),
        });
    }

    if is_mapper_parsing(exception, parsed.as_ref()) {
        return Some(SearchError::MapperParsing {
            detail: exception.message.clone(),
        });
    }

    if is_parent_circuit_breaking(exception, parsed.as_ref()) {
        return Some(SearchError::ParentCircuitBreaking {
            detail: exception.message.clone(),
        });
    }

    None
}

fn is_batch_size_status(status: u16) -> bool {
    status == 429 || status == 413
}

fn is_index_not_found(exception: &ClusterException) -> bool {
    exception.message.contains("index_not_found_exception")
        || exception.message.contains("index_closed_exception")
}

fn root_cause_reason(exception: &ClusterException) -> Option<String> {
    exception
        .root_cause()
        .and_then(ParsedClusterException::from_value)
        .map(|cause| cause.reason)
}

fn is_batch_size_too_large(exception: &ClusterException, parsed: Option<&ParsedClusterException>) -> bool {
    let Some(parsed) = parsed else {
        return false;
    };
    if parsed.reason.contains(BATCH_SIZE_TOO_LARGE_REASON) {
        return true;
    }
    parsed.error_type == "search_phase_execution_exception"
        && root_cause_reason(exception).is_some_and(|reason| reason.contains(BATCH_SIZE_TOO_LARGE_REASON))
}

fn is_mapper_parsing(exception: &ClusterException, parsed: Option<&ParsedClusterException>) -> bool {
    exception.message.contains("mapper_parsing_exception")
        || parsed.is_some_and(|parsed| parsed.reason.starts_with("failed to parse"))
}

fn is_parent_circuit_breaking(exception: &ClusterException, parsed: Option<&ParsedClusterException>) -> bool {
    let Some(parsed) = parsed else {
        return false;
    };
    if parsed.error_type != "circuit_breaking_exception" {
        return false;
    }
    // -- 🧅 when there is a nested cause, it has the final word. otherwise the outer reason does.
    match root_cause_reason(exception) {
        Some(reason) => reason.contains(PARENT_DATA_TOO_LARGE_REASON),
        None => parsed.reason.contains(PARENT_DATA_TOO_LARGE_REASON),
    }
}
