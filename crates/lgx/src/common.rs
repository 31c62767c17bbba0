//! 📦 Common wire structures — what we say to the cluster, and what it mumbles back.
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. SEARCH CLUSTER — 3:47 AM
//!
//! A `SearchRequest` walks into a cluster. The cluster looks it up and down. "Sorted by `_doc`?
//! Tracking total hits? Ignoring unavailable indices? ...Fine. You can come in."
//!
//! Forty milliseconds later a `SearchResponse` comes out the other side, carrying a scroll id it
//! may or may not need, a total that may or may not be exact, and a page of `RawHit`s that
//! definitely do not know what is coming next. Relatable.
//!
//! 🦆
//!
//! ---
//!
//! These types are deliberately dumb: request descriptors are built in [`crate::request`],
//! executed by [`crate::client`], and consumed by [`crate::chunked`]. They carry data, they do not
//! have opinions. The postal workers of this codebase. Please tip your postal workers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::SliceParams;

/// 📡 A fully built search request: where to look (indices + URL parameters) and what to ask (body).
///
/// Kept intact by the search-after strategy for the whole retrieval, because every continuation
/// page is "the original request again, but resume after this sort key."
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// 🎯 Target indices. Empty means the whole cluster, which is as bold as it sounds.
    pub indices: Vec<String>,
    /// ⏳ Scroll keep-alive. `Some` opens a scroll context on the server.
    pub scroll: Option<String>,
    pub ignore_unavailable: bool,
    pub body: SearchBody,
}

impl SearchRequest {
    /// 🛣️ The `_search` path for this request's indices.
    pub fn search_path(&self) -> String {
        if self.indices.is_empty() {
            "_search".to_owned()
        } else {
            format!("{}/_search", self.indices.join(","))
        }
    }
}

/// 📝 The JSON body of a search. Serialized as-is onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SearchBody {
    pub query: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
    /// 🔖 Resume point for search-after pagination: the sort values of the previous page's last hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
    pub track_total_hits: bool,
}

/// 📬 What the cluster sends back from `_search` and `_search/scroll`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsEnvelope,
}

impl SearchResponse {
    /// 🔢 Server-reported total, whichever dialect the server speaks.
    pub fn total_hits(&self) -> u64 {
        self.hits.total.as_ref().map(TotalHits::value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

/// 🔢 `hits.total` is `{"value": n, "relation": "eq"}` on modern clusters and a bare number on
/// ancient ones. We accept both and judge neither (out loud).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TotalHits {
    Tracked {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
    Legacy(u64),
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Tracked { value, .. } => *value,
            TotalHits::Legacy(value) => *value,
        }
    }
}

/// 🎯 One hit, exactly as the cluster returned it. Turned into a message by
/// [`crate::messages::ResultMessageFactory`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
    #[serde(default)]
    pub highlight: Option<HashMap<String, Vec<String>>>,
    /// 🔖 Sort key tuple. Opaque; handed back verbatim as `search_after`.
    #[serde(default)]
    pub sort: Option<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_both_total_hit_dialects_are_understood() {
        let modern: SearchResponse =
            serde_json::from_value(json!({"hits": {"total": {"value": 237, "relation": "eq"}, "hits": []}}))
                .expect("modern response should decode");
        let ancient: SearchResponse = serde_json::from_value(json!({"hits": {"total": 42, "hits": []}}))
            .expect("legacy response should decode");
        let silent: SearchResponse = serde_json::from_value(json!({})).expect("empty response should decode");

        assert_eq!(modern.total_hits(), 237);
        assert_eq!(ancient.total_hits(), 42);
        assert_eq!(silent.total_hits(), 0);
        assert!(silent.scroll_id.is_none());
    }

    #[test]
    fn the_one_where_a_hit_brings_its_sort_key_and_highlights() {
        let hit: RawHit = serde_json::from_value(json!({
            "_id": "abc",
            "_index": "graylog_0",
            "_source": {"message": "hello", "source": "web-1"},
            "highlight": {"message": ["<em>hello</em>"]},
            "sort": [1700000000000u64, "abc"]
        }))
        .expect("hit should decode");

        assert_eq!(hit.id, "abc");
        assert_eq!(hit.source["message"], "hello");
        assert_eq!(hit.sort, Some(vec![json!(1700000000000u64), json!("abc")]));
        assert_eq!(hit.highlight.expect("highlight present")["message"], vec!["<em>hello</em>"]);
    }

    #[test]
    fn the_one_where_optional_body_fields_stay_off_the_wire() {
        let body = SearchBody {
            query: json!({"match_all": {}}),
            size: Some(10),
            track_total_hits: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&body).expect("body should serialize"),
            json!({"query": {"match_all": {}}, "size": 10, "track_total_hits": true})
        );
    }

    #[test]
    fn the_one_where_zero_indices_means_the_whole_cluster() {
        let mut request = SearchRequest {
            indices: vec![],
            scroll: None,
            ignore_unavailable: true,
            body: SearchBody::default(),
        };
        assert_eq!(request.search_path(), "_search");
        request.indices = vec!["graylog_0".into(), "graylog_1".into()];
        assert_eq!(request.search_path(), "graylog_0,graylog_1/_search");
    }
}
