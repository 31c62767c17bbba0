//! 📜 Scroll strategy — the server keeps a cursor, we keep the ticket stub.
//!
//! Every page hands back an opaque scroll id. Presenting it (plus a renewed keep-alive) to
//! `_search/scroll` yields the next page. No id, no next page, no network call.
//! Every id we ever saw is cleared on `cancel()`.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::chunked::ChunkingStrategy;
use crate::client::SearchClient;
use crate::common::SearchResponse;
use crate::errors::SearchError;

/// ⏳ Keep-alive used when none is configured, or the configured one is blank.
pub const DEFAULT_SCROLL_KEEP_ALIVE: &str = "1m";

/// Resolve the configured keep-alive, falling back to [`DEFAULT_SCROLL_KEEP_ALIVE`].
pub fn resolve_keep_alive(configured: Option<&str>) -> String {
    configured
        .map(str::trim)
        .filter(|keep_alive| !keep_alive.is_empty())
        .unwrap_or(DEFAULT_SCROLL_KEEP_ALIVE)
        .to_owned()
}

#[derive(Debug)]
pub struct ScrollStrategy {
    keep_alive: String,
    current_scroll_id: Option<String>,
    /// Every distinct id the server handed out, in order. Cleared together on cancel.
    scroll_ids: Vec<String>,
}

impl ScrollStrategy {
    pub fn new(keep_alive: Option<&str>) -> Self {
        Self {
            keep_alive: resolve_keep_alive(keep_alive),
            current_scroll_id: None,
            scroll_ids: Vec::new(),
        }
    }

    pub fn keep_alive(&self) -> &str {
        &self.keep_alive
    }
}

#[async_trait]
impl ChunkingStrategy for ScrollStrategy {
    fn name(&self) -> &'static str {
        "scroll"
    }

    fn observe(&mut self, response: &SearchResponse) {
        self.current_scroll_id = response.scroll_id.clone();
        if let Some(scroll_id) = &response.scroll_id {
            if !self.scroll_ids.contains(scroll_id) {
                self.scroll_ids.push(scroll_id.clone());
            }
        }
    }

    async fn next_search_result(&mut self, client: &SearchClient) -> Result<Option<SearchResponse>, SearchError> {
        let Some(scroll_id) = self.current_scroll_id.clone() else {
            // -- 🏜️ zero available indices means the server never opened a context. nothing to continue.
            debug!("📜 no scroll id on the previous page, scroll retrieval is done");
            return Ok(None);
        };

        let keep_alive = self.keep_alive.as_str();
        client
            .execute("Unable to perform scroll search", |c| c.scroll(&scroll_id, keep_alive))
            .await
            .map(Some)
    }

    async fn cancel(&mut self, client: &SearchClient) {
        self.current_scroll_id = None;
        if self.scroll_ids.is_empty() {
            return;
        }
        let scroll_ids = std::mem::take(&mut self.scroll_ids);
        if let Err(error) = client
            .execute("Unable to clear scroll context", |c| c.clear_scroll(&scroll_ids))
            .await
        {
            // -- 🧹 best effort. the keep-alive will sweep up whatever we could not.
            warn!(
                "⚠️ Failed to clear {} scroll context(s), they expire on their own: {}",
                scroll_ids.len(),
                error
            );
        }
    }

    fn holds_server_resources(&self) -> bool {
        !self.scroll_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::{ChunkState, ChunkedQueryResult, ChunkedResult};
    use crate::messages::SourceMessageFactory;
    use crate::test_support::{client_for, page};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scroll_result(server: &MockServer, initial: serde_json::Value, keep_alive: Option<&str>) -> ChunkedQueryResult<ScrollStrategy> {
        ChunkedQueryResult::new(
            client_for(server),
            ScrollStrategy::new(keep_alive),
            serde_json::from_value(initial).expect("fixture should decode"),
            vec![],
            None,
            Arc::new(SourceMessageFactory),
        )
    }

    #[test]
    fn the_one_where_a_blank_keep_alive_gets_the_default_minute() {
        assert_eq!(resolve_keep_alive(None), "1m");
        assert_eq!(resolve_keep_alive(Some("")), "1m");
        assert_eq!(resolve_keep_alive(Some("   ")), "1m");
        assert_eq!(resolve_keep_alive(Some(" 5m ")), "5m");
    }

    #[tokio::test]
    async fn the_one_where_no_scroll_id_means_no_phone_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        // 🧪 zero indices searched: empty page, no scroll id
        let mut empty = scroll_result(&server, page(None, 0..0, 0), None);
        assert!(empty.next_chunk().await.expect("no error").is_none());
        assert_eq!(empty.state(), ChunkState::Exhausted);
        empty.cancel().await;

        // 🧪 hits but no scroll id: the first page is handed out, then the line goes quiet
        let mut lonely = scroll_result(&server, page(None, 0..5, 5), None);
        assert_eq!(lonely.next_chunk().await.expect("first").expect("page").len(), 5);
        assert!(lonely.next_chunk().await.expect("second").is_none());
        lonely.cancel().await;
        lonely.cancel().await;
        assert_eq!(lonely.state(), ChunkState::Cancelled);
    }

    #[tokio::test]
    async fn the_one_where_the_configured_keep_alive_rides_every_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll": "5m", "scroll_id": "s1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(Some("s1"), 0..0, 3)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll_id": ["s1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true, "num_freed": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let mut result = scroll_result(&server, page(Some("s1"), 0..3, 3), Some("5m"));
        assert_eq!(result.strategy().keep_alive(), "5m");
        assert!(result.next_chunk().await.expect("first").is_some());
        assert!(result.next_chunk().await.expect("second").is_none());
        assert!(result.strategy().holds_server_resources());

        result.cancel().await;
        result.cancel().await;
        assert!(!result.strategy().holds_server_resources());
    }

    #[tokio::test]
    async fn the_one_where_a_failed_clear_is_swallowed_with_dignity() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("the cluster is on fire"))
            .expect(1)
            .mount(&server)
            .await;

        let mut result = scroll_result(&server, page(Some("s1"), 0..3, 3), None);
        result.cancel().await;
        assert_eq!(result.state(), ChunkState::Cancelled);
    }
}
