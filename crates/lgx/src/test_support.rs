//! 🧪 Test fixtures: canned cluster pages and clients pointed at a mock server.

use std::ops::Range;

use serde_json::{Value, json};
use wiremock::MockServer;

use crate::app_config::SearchConfig;
use crate::client::SearchClient;

pub(crate) fn client_for(server: &MockServer) -> SearchClient {
    SearchClient::new(&SearchConfig::new(server.uri())).expect("💀 test client should build")
}

/// 📄 One search page with hits `doc-{n}` for `n` in `ids`, each sorted by `[n, "doc-n"]`.
pub(crate) fn page(scroll_id: Option<&str>, ids: Range<usize>, total: u64) -> Value {
    let hits: Vec<Value> = ids
        .map(|n| {
            json!({
                "_id": format!("doc-{n}"),
                "_index": "graylog_0",
                "_source": {"message": format!("message {n}"), "source": "web-1"},
                "sort": [n, format!("doc-{n}")]
            })
        })
        .collect();

    let mut body = json!({
        "took": 3,
        "timed_out": false,
        "hits": {"total": {"value": total, "relation": "eq"}, "hits": hits}
    });
    if let Some(scroll_id) = scroll_id {
        body["_scroll_id"] = json!(scroll_id);
    }
    body
}
