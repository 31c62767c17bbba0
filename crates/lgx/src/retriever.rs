//! 🎯 The Multi-Chunk Result Retriever — the front door for chunked retrievals.
//!
//! Build the first request, fetch the first page through the gateway, wrap it in the configured
//! strategy. If the first page fails, you get the translated error and no half-built handle.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::app_config::SearchConfig;
use crate::chunked::{ChunkedQueryResult, ChunkedRetrieval, ScrollStrategy, SearchAfterStrategy};
use crate::chunked::scroll::resolve_keep_alive;
use crate::client::SearchClient;
use crate::errors::SearchError;
use crate::messages::{ResultMessageFactory, SourceMessageFactory};
use crate::query::ChunkCommand;
use crate::request::SearchRequestFactory;

/// 🔀 How chunked retrievals continue past the first page. One choice per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingMethod {
    #[default]
    Scroll,
    SearchAfter,
}

#[derive(Debug, Clone)]
pub struct MultiChunkResultRetriever {
    client: SearchClient,
    request_factory: SearchRequestFactory,
    message_factory: Arc<dyn ResultMessageFactory>,
    chunking_method: ChunkingMethod,
    scroll_keep_alive: String,
}

impl MultiChunkResultRetriever {
    pub fn new(
        client: SearchClient,
        request_factory: SearchRequestFactory,
        message_factory: Arc<dyn ResultMessageFactory>,
        chunking_method: ChunkingMethod,
        scroll_keep_alive: Option<&str>,
    ) -> Self {
        Self {
            client,
            request_factory,
            message_factory,
            chunking_method,
            scroll_keep_alive: resolve_keep_alive(scroll_keep_alive),
        }
    }

    /// 🏗️ Wire everything up from config, with the plain `_source` message factory.
    pub fn from_config(config: &SearchConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            SearchClient::new(config)?,
            SearchRequestFactory::new(config.allow_highlighting, config.allow_leading_wildcard_searches),
            Arc::new(SourceMessageFactory),
            config.chunking_method,
            config.scroll_keep_alive.as_deref(),
        ))
    }

    pub fn chunking_method(&self) -> ChunkingMethod {
        self.chunking_method
    }

    /// 🚀 Start a chunked retrieval. The returned handle already holds the first page.
    pub async fn retrieve_chunked_result(&self, command: &ChunkCommand) -> Result<ChunkedRetrieval, SearchError> {
        let mut request = self.request_factory.create_chunk_request(command);
        debug!(
            "🎯 starting {:?} retrieval over {} index(es), batch size {:?}, limit {:?}",
            self.chunking_method,
            request.indices.len(),
            request.body.size,
            command.limit
        );

        let fields = command.fields.clone();
        let client = self.client.clone();
        let message_factory = Arc::clone(&self.message_factory);

        match self.chunking_method {
            ChunkingMethod::Scroll => {
                request.scroll = Some(self.scroll_keep_alive.clone());
                let initial = self
                    .client
                    .execute("Unable to perform scroll search", |c| c.search(&request))
                    .await?;
                Ok(ChunkedRetrieval::Scroll(ChunkedQueryResult::new(
                    client,
                    ScrollStrategy::new(Some(self.scroll_keep_alive.as_str())),
                    initial,
                    fields,
                    command.limit,
                    message_factory,
                )))
            }
            ChunkingMethod::SearchAfter => {
                let initial = self
                    .client
                    .execute("Unable to perform search-after pagination search", |c| c.search(&request))
                    .await?;
                Ok(ChunkedRetrieval::SearchAfter(ChunkedQueryResult::new(
                    client,
                    SearchAfterStrategy::new(request),
                    initial,
                    fields,
                    command.limit,
                    message_factory,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::{ChunkState, ChunkedResult};
    use crate::test_support::page;
    use serde_json::json;
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever(server: &MockServer, method: ChunkingMethod) -> MultiChunkResultRetriever {
        let mut config = SearchConfig::new(server.uri());
        config.chunking_method = method;
        config.scroll_keep_alive = Some("".into());
        MultiChunkResultRetriever::from_config(&config).expect("retriever should build")
    }

    fn command() -> ChunkCommand {
        ChunkCommand {
            indices: BTreeSet::from(["graylog_0".to_owned()]),
            query: "*".to_owned(),
            fields: vec!["message".to_owned()],
            batch_size: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_scroll_mode_opens_a_context_with_the_default_minute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graylog_0/_search"))
            .and(query_param("scroll", "1m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(None, 0..2, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let mut result = retriever(&server, ChunkingMethod::Scroll)
            .retrieve_chunked_result(&command())
            .await
            .expect("retrieval should start");

        assert!(matches!(result, ChunkedRetrieval::Scroll(_)));
        assert_eq!(result.state(), ChunkState::Fresh);
        let chunk = result.next_chunk().await.expect("first").expect("page");
        assert_eq!(chunk.fields, vec!["message".to_owned()]);
        assert_eq!(chunk.messages[0].fields["message"], json!("message 0"));
        result.cancel().await;
    }

    #[tokio::test]
    async fn the_one_where_search_after_mode_keeps_the_original_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graylog_0/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(None, 0..2, 2)))
            .expect(1)
            .mount(&server)
            .await;

        let result = retriever(&server, ChunkingMethod::SearchAfter)
            .retrieve_chunked_result(&command())
            .await
            .expect("retrieval should start");

        match &result {
            ChunkedRetrieval::SearchAfter(inner) => {
                let original = inner.strategy().original();
                assert!(original.scroll.is_none());
                assert_eq!(original.body.size, Some(2));
            }
            other => panic!("💀 expected search-after, got {other:?}"),
        }

        let received = server.received_requests().await.expect("recording enabled");
        assert!(received[0].url.query_pairs().all(|(key, _)| key != "scroll"));
    }

    #[tokio::test]
    async fn the_one_where_a_failed_first_page_means_no_handle_at_all() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "index_not_found_exception", "reason": "no such index [graylog_0]", "index": "graylog_0"},
                "status": 404
            })))
            .mount(&server)
            .await;

        let error = retriever(&server, ChunkingMethod::Scroll)
            .retrieve_chunked_result(&command())
            .await
            .expect_err("first page should fail");

        match error {
            SearchError::IndexNotFound { resource, message } => {
                assert_eq!(resource.as_deref(), Some("graylog_0"));
                assert_eq!(message, "Unable to perform scroll search[graylog_0]");
            }
            other => panic!("💀 expected IndexNotFound, got {other:?}"),
        }
    }
}
