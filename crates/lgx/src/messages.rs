//! 📨 Messages and chunks — raw hits, dressed up for the caller.
//!
//! A [`ResultMessageFactory`] is called once per hit. A [`ResultChunk`] is one page of the
//! resulting messages, in the order the server returned them.

use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::{Map, Value};

/// 📨 One domain message, built from one hit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultMessage {
    pub id: String,
    pub index: String,
    pub fields: Map<String, Value>,
    /// Highlight fragments per field. Empty when highlighting was not requested.
    pub highlights: HashMap<String, Vec<String>>,
}

impl ResultMessage {
    /// 📝 One NDJSON line: `_id` and `_index` first, then the source fields in source order.
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let mut object = Map::with_capacity(self.fields.len() + 2);
        object.insert("_id".to_owned(), Value::String(self.id.clone()));
        object.insert("_index".to_owned(), Value::String(self.index.clone()));
        for (key, value) in &self.fields {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }
        serde_json::to_string(&Value::Object(object))
    }
}

/// 🏭 Turns raw hit parts into a [`ResultMessage`].
///
/// Must not fail for well-formed hits; hits missing expected fields may produce sparse messages.
pub trait ResultMessageFactory: Send + Sync + Debug {
    fn parse_from_source(
        &self,
        id: &str,
        index: &str,
        source: Map<String, Value>,
        highlight: Option<HashMap<String, Vec<String>>>,
    ) -> ResultMessage;
}

/// The default factory: the `_source` becomes the message fields, untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceMessageFactory;

impl ResultMessageFactory for SourceMessageFactory {
    fn parse_from_source(
        &self,
        id: &str,
        index: &str,
        source: Map<String, Value>,
        highlight: Option<HashMap<String, Vec<String>>>,
    ) -> ResultMessage {
        ResultMessage {
            id: id.to_owned(),
            index: index.to_owned(),
            fields: source,
            highlights: highlight.unwrap_or_default(),
        }
    }
}

/// 📦 One page of messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultChunk {
    /// The field projection this retrieval asked for.
    pub fields: Vec<String>,
    /// Zero-based position of this chunk in the retrieval.
    pub chunk_number: u64,
    pub messages: Vec<ResultMessage>,
}

impl ResultChunk {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_first_chunk(&self) -> bool {
        self.chunk_number == 0
    }
}
