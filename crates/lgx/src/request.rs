//! 🏗️ Request building — a [`ChunkCommand`] goes in, a wire-ready [`SearchRequest`] comes out.
//!
//! Pagination rules live here, not in the chunking strategies:
//! - an explicit batch size beats the limit-derived page size
//! - offsets and slices never share a request (the offset gets dropped, loudly)
//! - highlighting needs both the deployment flag and the per-search flag

use serde_json::{Value, json};
use tracing::warn;

use crate::common::{SearchBody, SearchRequest};
use crate::query::{ChunkCommand, QueryFactory, SearchCommand};

/// 🏭 Builds first-page search requests for chunked retrievals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchRequestFactory {
    pub allow_highlighting: bool,
    pub query_factory: QueryFactory,
}

impl SearchRequestFactory {
    pub fn new(allow_highlighting: bool, allow_leading_wildcard: bool) -> Self {
        Self {
            allow_highlighting,
            query_factory: QueryFactory::new(allow_leading_wildcard),
        }
    }

    /// 📐 Build the initial request. `scroll` is left unset; the retriever decides on that.
    pub fn create_chunk_request(&self, command: &ChunkCommand) -> SearchRequest {
        let search = SearchCommand::from(command);

        let from = match (command.slice, search.offset) {
            (Some(slice), Some(offset)) => {
                // -- ⚠️ slice + from double-count at the server. the slice wins, the offset walks.
                warn!(
                    "⚠️ Dropping offset {} from chunked request because slice {}/{} is set. Offsets and slices do not mix.",
                    offset, slice.id, slice.max
                );
                None
            }
            (_, offset) => offset,
        };

        let body = SearchBody {
            query: self.query_factory.create_query(&search),
            from,
            size: command.batch_size.or(search.limit),
            sort: vec![search.sorting.to_wire()],
            source: (!command.fields.is_empty()).then(|| command.fields.clone()),
            slice: command.slice,
            highlight: (self.allow_highlighting && search.highlight).then(highlight_all_fields),
            search_after: None,
            track_total_hits: true,
        };

        SearchRequest {
            indices: command.indices.iter().cloned().collect(),
            scroll: None,
            ignore_unavailable: true,
            body,
        }
    }
}

/// 🖍️ Highlight every field, whole values, no fragmenting.
fn highlight_all_fields() -> Value {
    json!({
        "require_field_match": false,
        "fields": { "*": { "fragment_size": 0, "number_of_fragments": 0 } }
    })
}
