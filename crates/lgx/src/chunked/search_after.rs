//! 🔖 Search-after strategy — stateless paging by "resume after this sort key".
//!
//! Every continuation is the original request again, with `search_after` set to the sort values
//! of the previous page's last hit. The server holds nothing between pages, so `cancel()` has
//! nothing to do. Offset-based `from` is cleared on continuations; the resume point already says
//! where to start.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::chunked::ChunkingStrategy;
use crate::client::SearchClient;
use crate::common::{SearchRequest, SearchResponse};
use crate::errors::SearchError;

#[derive(Debug)]
pub struct SearchAfterStrategy {
    original: SearchRequest,
    /// Sort values of the last hit seen. `None` once a page came back empty.
    cursor: Option<Vec<Value>>,
}

impl SearchAfterStrategy {
    /// `original` must be the exact request that produced the first page.
    pub fn new(original: SearchRequest) -> Self {
        Self { original, cursor: None }
    }

    pub fn original(&self) -> &SearchRequest {
        &self.original
    }

    fn continuation(&self, cursor: Vec<Value>) -> SearchRequest {
        let mut request = self.original.clone();
        request.body.search_after = Some(cursor);
        request.body.from = None;
        request
    }
}

#[async_trait]
impl ChunkingStrategy for SearchAfterStrategy {
    fn name(&self) -> &'static str {
        "search-after"
    }

    fn observe(&mut self, response: &SearchResponse) {
        self.cursor = match response.hits.hits.last() {
            Some(hit) => {
                if hit.sort.is_none() {
                    warn!("⚠️ hit {} came back without sort values, search-after cannot continue past it", hit.id);
                }
                hit.sort.clone()
            }
            None => None,
        };
    }

    async fn next_search_result(&mut self, client: &SearchClient) -> Result<Option<SearchResponse>, SearchError> {
        let Some(cursor) = self.cursor.clone() else {
            debug!("🔖 previous page was empty, search-after retrieval is done");
            return Ok(None);
        };

        let request = self.continuation(cursor);
        client
            .execute("Unable to perform search-after pagination search", |c| c.search(&request))
            .await
            .map(Some)
    }

    async fn cancel(&mut self, _client: &SearchClient) {}

    fn holds_server_resources(&self) -> bool {
        false
    }
}
