//! 🔄 Chunked results — one in-flight retrieval, one page at a time.
//!
//! 🎬 COLD OPEN — INT. CALLER'S LOOP — SOMEWHERE AROUND PAGE 4,096
//!
//! "Are there more?" asks the caller. "Let me check," says the chunked result, and goes back to the
//! cluster holding either a scroll id or the sort key of the last hit it saw. Eventually the cluster
//! says "that's all of them", and the loop ends. The caller then calls `cancel()`, because the caller
//! was raised right.
//!
//! 🧠 Shape of the thing:
//! - [`ChunkedResult`] is the public contract: `next_chunk`, `cancel`, a few observers.
//! - [`ChunkedQueryResult`] is the one state machine, generic over a [`ChunkingStrategy`].
//! - [`scroll::ScrollStrategy`] continues via a server-side scroll context.
//! - [`search_after::SearchAfterStrategy`] continues by re-sending the original request with the
//!   last hit's sort key as the resume point. Nothing is held on the server between pages.
//! - [`ChunkedRetrieval`] is the closed set of the two, dispatched by `match`.
//!
//! ```text
//!   Fresh ──next_chunk──▶ Active ──next_chunk (no more)──▶ Exhausted
//!     │                     │                                 │
//!     └────────cancel───────┴──────────────cancel─────────────┴──▶ Cancelled
//! ```
//!
//! ⚠️ Not thread-safe, not meant to be. One caller drives one retrieval, strictly page after page.
//! Dropping a scroll retrieval without `cancel()` leaks the scroll context until its keep-alive
//! runs out; we log about it, we do not fix it for you.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::SearchClient;
use crate::common::SearchResponse;
use crate::errors::SearchError;
use crate::messages::{ResultChunk, ResultMessageFactory};

pub mod scroll;
pub mod search_after;

pub use scroll::ScrollStrategy;
pub use search_after::SearchAfterStrategy;

/// 🚦 Where a retrieval is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// The first page is fetched and not yet handed out.
    Fresh,
    Active,
    /// The server has nothing more. `cancel()` is still expected.
    Exhausted,
    /// Terminal. Server-side resources are released.
    Cancelled,
}

/// 📦 A stateful handle over one in-flight chunked retrieval.
///
/// # Contract 📜
/// - `next_chunk` returns `Ok(Some(chunk))` while pages flow and `Ok(None)` once the server is out
///   of results or the limit has been reached. A failed fetch fails the whole retrieval.
/// - `next_chunk` after `cancel` is refused with [`SearchError::AlreadyCancelled`].
/// - `cancel` never fails and may be called any number of times. Call it. Always. Even after
///   `next_chunk` returned `None`.
#[async_trait]
pub trait ChunkedResult: Send {
    async fn next_chunk(&mut self) -> Result<Option<ResultChunk>, SearchError>;

    async fn cancel(&mut self);

    fn state(&self) -> ChunkState;

    /// Messages handed out so far.
    fn delivered(&self) -> u64;

    /// Total hit count as last reported by the server.
    fn total_hits(&self) -> u64;
}

/// 🧭 How a retrieval gets from one page to the next.
#[async_trait]
pub trait ChunkingStrategy: Send + Sync + Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Called with every response the retrieval receives, the initial one included.
    fn observe(&mut self, response: &SearchResponse);

    /// Fetch the page after the last observed one. `Ok(None)` means there is no continuation.
    async fn next_search_result(&mut self, client: &SearchClient) -> Result<Option<SearchResponse>, SearchError>;

    /// Best-effort release of server-side state. Never fails, never panics.
    async fn cancel(&mut self, client: &SearchClient);

    /// Whether dropping the retrieval right now would leak something on the server.
    fn holds_server_resources(&self) -> bool;
}

/// 🔄 The state machine behind every chunked retrieval.
#[derive(Debug)]
pub struct ChunkedQueryResult<S: ChunkingStrategy> {
    client: SearchClient,
    strategy: S,
    last_response: SearchResponse,
    fields: Vec<String>,
    limit: Option<u64>,
    delivered: u64,
    chunk_number: u64,
    state: ChunkState,
    message_factory: Arc<dyn ResultMessageFactory>,
}

impl<S: ChunkingStrategy> ChunkedQueryResult<S> {
    /// 🏗️ Wrap an already fetched first page. The first `next_chunk()` hands it out without a
    /// network call.
    pub fn new(
        client: SearchClient,
        mut strategy: S,
        initial_response: SearchResponse,
        fields: Vec<String>,
        limit: Option<u64>,
        message_factory: Arc<dyn ResultMessageFactory>,
    ) -> Self {
        strategy.observe(&initial_response);
        Self {
            client,
            strategy,
            last_response: initial_response,
            fields,
            limit,
            delivered: 0,
            chunk_number: 0,
            state: ChunkState::Fresh,
            message_factory,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.delivered >= limit)
    }
}

#[async_trait]
impl<S: ChunkingStrategy> ChunkedResult for ChunkedQueryResult<S> {
    async fn next_chunk(&mut self) -> Result<Option<ResultChunk>, SearchError> {
        match self.state {
            ChunkState::Cancelled => return Err(SearchError::AlreadyCancelled),
            ChunkState::Exhausted => return Ok(None),
            ChunkState::Fresh | ChunkState::Active => {}
        }

        if self.limit_reached() {
            debug!(
                "🏁 {} retrieval reached its limit of {:?} after {} messages",
                self.strategy.name(),
                self.limit,
                self.delivered
            );
            self.state = ChunkState::Exhausted;
            return Ok(None);
        }

        if self.state == ChunkState::Fresh {
            self.state = ChunkState::Active;
        } else {
            match self.strategy.next_search_result(&self.client).await? {
                Some(response) => {
                    self.strategy.observe(&response);
                    self.last_response = response;
                }
                None => {
                    self.state = ChunkState::Exhausted;
                    return Ok(None);
                }
            }
        }

        let hits = std::mem::take(&mut self.last_response.hits.hits);
        debug!(
            "📄 {} page {}: {} hits of {} total",
            self.strategy.name(),
            self.chunk_number,
            hits.len(),
            self.last_response.total_hits()
        );
        if hits.is_empty() {
            self.state = ChunkState::Exhausted;
            return Ok(None);
        }

        let messages: Vec<_> = hits
            .into_iter()
            .map(|hit| {
                self.message_factory
                    .parse_from_source(&hit.id, &hit.index, hit.source, hit.highlight)
            })
            .collect();
        self.delivered += messages.len() as u64;

        let chunk = ResultChunk {
            fields: self.fields.clone(),
            chunk_number: self.chunk_number,
            messages,
        };
        self.chunk_number += 1;
        Ok(Some(chunk))
    }

    async fn cancel(&mut self) {
        if self.state == ChunkState::Cancelled {
            return;
        }
        self.strategy.cancel(&self.client).await;
        self.state = ChunkState::Cancelled;
    }

    fn state(&self) -> ChunkState {
        self.state
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    fn total_hits(&self) -> u64 {
        self.last_response.total_hits()
    }
}

impl<S: ChunkingStrategy> Drop for ChunkedQueryResult<S> {
    fn drop(&mut self) {
        if self.state != ChunkState::Cancelled && self.strategy.holds_server_resources() {
            warn!(
                "⚠️ {} retrieval dropped without cancel(); its server-side context lives on until the keep-alive expires",
                self.strategy.name()
            );
        }
    }
}

/// 🎭 The two faces of a chunked retrieval. Which one you get is a deployment decision.
#[derive(Debug)]
pub enum ChunkedRetrieval {
    Scroll(ChunkedQueryResult<ScrollStrategy>),
    SearchAfter(ChunkedQueryResult<SearchAfterStrategy>),
}

#[async_trait]
impl ChunkedResult for ChunkedRetrieval {
    async fn next_chunk(&mut self) -> Result<Option<ResultChunk>, SearchError> {
        match self {
            ChunkedRetrieval::Scroll(result) => result.next_chunk().await,
            ChunkedRetrieval::SearchAfter(result) => result.next_chunk().await,
        }
    }

    async fn cancel(&mut self) {
        match self {
            ChunkedRetrieval::Scroll(result) => result.cancel().await,
            ChunkedRetrieval::SearchAfter(result) => result.cancel().await,
        }
    }

    fn state(&self) -> ChunkState {
        match self {
            ChunkedRetrieval::Scroll(result) => result.state(),
            ChunkedRetrieval::SearchAfter(result) => result.state(),
        }
    }

    fn delivered(&self) -> u64 {
        match self {
            ChunkedRetrieval::Scroll(result) => result.delivered(),
            ChunkedRetrieval::SearchAfter(result) => result.delivered(),
        }
    }

    fn total_hits(&self) -> u64 {
        match self {
            ChunkedRetrieval::Scroll(result) => result.total_hits(),
            ChunkedRetrieval::SearchAfter(result) => result.total_hits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SourceMessageFactory;
    use crate::test_support::{client_for, page};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn decode(value: serde_json::Value) -> SearchResponse {
        serde_json::from_value(value).expect("fixture page should decode")
    }

    async fn mount_scroll_page(server: &MockServer, scroll_id: &str, next: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll": "1m", "scroll_id": scroll_id})))
            .respond_with(ResponseTemplate::new(200).set_body_json(next))
            .expect(1)
            .mount(server)
            .await;
    }

    fn scroll_result(server: &MockServer, initial: serde_json::Value, limit: Option<u64>) -> ChunkedQueryResult<ScrollStrategy> {
        ChunkedQueryResult::new(
            client_for(server),
            ScrollStrategy::new(None),
            decode(initial),
            vec!["message".into()],
            limit,
            Arc::new(SourceMessageFactory),
        )
    }

    #[tokio::test]
    async fn the_one_where_237_messages_arrive_in_three_acts() {
        let server = MockServer::start().await;
        mount_scroll_page(&server, "s1", page(Some("s2"), 100..200, 237)).await;
        mount_scroll_page(&server, "s2", page(Some("s3"), 200..237, 237)).await;
        mount_scroll_page(&server, "s3", page(Some("s3"), 0..0, 237)).await;

        let mut result = scroll_result(&server, page(Some("s1"), 0..100, 237), None);
        assert_eq!(result.fields().to_vec(), vec!["message".to_owned()]);
        assert_eq!(result.strategy().keep_alive(), "1m");

        let mut page_sizes = Vec::new();
        let mut messages = 0;
        while let Some(chunk) = result.next_chunk().await.expect("pages should flow") {
            assert_eq!(chunk.is_first_chunk(), page_sizes.is_empty());
            assert_eq!(chunk.chunk_number, page_sizes.len() as u64);
            page_sizes.push(chunk.len());
            messages += chunk.messages.len();
        }

        assert_eq!(page_sizes, vec![100, 100, 37]);
        assert_eq!(page_sizes.iter().sum::<usize>(), 237);
        assert_eq!(messages, 237);
        assert_eq!(result.delivered(), 237);
        assert_eq!(result.total_hits(), 237);
        assert_eq!(result.state(), ChunkState::Exhausted);

        // 🧪 exhausted stays exhausted, without bothering the server again
        assert!(result.next_chunk().await.expect("still fine").is_none());

        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
            .expect(1)
            .mount(&server)
            .await;
        result.cancel().await;
        assert_eq!(result.state(), ChunkState::Cancelled);
    }

    #[tokio::test]
    async fn the_one_where_the_limit_stops_the_party_after_the_crossing_chunk() {
        let server = MockServer::start().await;
        mount_scroll_page(&server, "s1", page(Some("s1"), 100..200, 237)).await;

        let mut result = scroll_result(&server, page(Some("s1"), 0..100, 237), Some(150));

        assert_eq!(result.next_chunk().await.expect("first").expect("page").len(), 100);
        // -- the chunk that crosses the limit is delivered whole
        assert_eq!(result.next_chunk().await.expect("second").expect("page").len(), 100);
        assert!(result.next_chunk().await.expect("third").is_none());
        assert_eq!(result.delivered(), 200);
        assert_eq!(result.state(), ChunkState::Exhausted);

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
            .mount(&server)
            .await;
        result.cancel().await;
    }

    #[tokio::test]
    async fn the_one_where_resuming_after_cancel_is_refused_loudly() {
        let server = MockServer::start().await;
        let mut result = scroll_result(&server, page(None, 0..3, 3), None);

        result.cancel().await;
        result.cancel().await;

        assert!(matches!(result.next_chunk().await, Err(SearchError::AlreadyCancelled)));
        assert_eq!(result.state(), ChunkState::Cancelled);
    }

    #[tokio::test]
    async fn the_one_where_a_failed_page_fails_the_whole_retrieval() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": {"type": "master_not_discovered_exception", "reason": null},
                "status": 503
            })))
            .mount(&server)
            .await;

        let mut result = scroll_result(&server, page(Some("s1"), 0..10, 20), None);
        assert!(result.next_chunk().await.expect("first page is local").is_some());
        assert!(matches!(result.next_chunk().await, Err(SearchError::MasterNotDiscovered)));

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
            .mount(&server)
            .await;
        result.cancel().await;
    }

    #[tokio::test]
    async fn the_one_where_the_enum_dispatches_like_a_universal_remote() {
        let server = MockServer::start().await;
        let mut retrieval = ChunkedRetrieval::Scroll(scroll_result(&server, page(None, 0..2, 2), None));

        assert_eq!(retrieval.state(), ChunkState::Fresh);
        assert_eq!(retrieval.next_chunk().await.expect("page").expect("some").len(), 2);
        assert_eq!(retrieval.delivered(), 2);
        assert!(retrieval.next_chunk().await.expect("end").is_none());
        retrieval.cancel().await;
        assert_eq!(retrieval.state(), ChunkState::Cancelled);
    }
}
