//! 🔎 Query model — what the caller wants, before it becomes what the cluster gets.
//!
//! [`ChunkCommand`] is the caller's logical request. [`SearchCommand`] is the narrowed view that
//! query building actually reads. [`QueryFactory`] turns the latter into the boolean query the
//! cluster understands: a `must` for the query string, `filter`s for time range, filter string
//! and streams.
//!
//! 🦆 No I/O lives here. The duck checked.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// 🕰️ The cluster-side date format for the `timestamp` field.
pub const TIMESTAMP_FIELD: &str = "timestamp";
const CLUSTER_DATE_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.SSS";
const CHRONO_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 📺 The stream every message lands in unless routed elsewhere.
pub const DEFAULT_STREAM_ID: &str = "000000000000000000000001";
const STREAMS_FIELD: &str = "streams";

/// 🔼🔽
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc", alias = "ascending", alias = "ASC")]
    Ascending,
    #[serde(rename = "desc", alias = "descending", alias = "DESC")]
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// 📐 A sort spec. Defaults to `_doc` ascending, the cheapest stable order the cluster offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl Default for Sorting {
    fn default() -> Self {
        Self {
            field: "_doc".to_owned(),
            order: SortOrder::Ascending,
        }
    }
}

impl Sorting {
    pub fn to_wire(&self) -> Value {
        json!({ self.field.clone(): { "order": self.order.as_str() } })
    }
}

/// ⏰ A time range over the `timestamp` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeRange {
    Absolute {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// The last `range` seconds. `0` means all time, so no range filter at all.
    Relative { range: u64 },
}

impl TimeRange {
    /// Resolve into concrete bounds, relative to `now`. `None` means "unbounded".
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            TimeRange::Absolute { from, to } => Some((*from, *to)),
            TimeRange::Relative { range: 0 } => None,
            TimeRange::Relative { range } => {
                let seconds = i64::try_from(*range).unwrap_or(i64::MAX);
                let span = ChronoDuration::try_seconds(seconds).unwrap_or(ChronoDuration::MAX);
                let from = now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
                Some((from, now))
            }
        }
    }
}

/// 🍕 Slice parameters for partitioning one retrieval into `max` parallel sub-retrievals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceParams {
    pub id: u32,
    pub max: u32,
}

/// 📜 The caller's logical request for a chunked retrieval. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ChunkCommand {
    pub indices: BTreeSet<String>,
    pub query: String,
    pub range: Option<TimeRange>,
    pub filter: Option<String>,
    /// Stream ids the messages must belong to. Empty means no stream restriction.
    pub streams: BTreeSet<String>,
    pub fields: Vec<String>,
    pub sorting: Option<Sorting>,
    pub slice: Option<SliceParams>,
    pub batch_size: Option<u64>,
    pub offset: Option<u64>,
    /// Upper bound on delivered hits. `None` is unbounded.
    pub limit: Option<u64>,
    pub highlight: bool,
}

/// 🔬 The part of a [`ChunkCommand`] that query and request building consume.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCommand {
    pub query: String,
    pub range: Option<TimeRange>,
    pub filter: Option<String>,
    pub streams: BTreeSet<String>,
    pub sorting: Sorting,
    pub highlight: bool,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl From<&ChunkCommand> for SearchCommand {
    fn from(command: &ChunkCommand) -> Self {
        Self {
            query: command.query.clone(),
            range: command.range.clone(),
            filter: command.filter.clone(),
            streams: command.streams.clone(),
            sorting: command.sorting.clone().unwrap_or_default(),
            highlight: command.highlight,
            offset: command.offset,
            limit: command.limit,
        }
    }
}

/// 🏭 Builds the logical boolean query from a [`SearchCommand`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFactory {
    pub allow_leading_wildcard: bool,
}

impl QueryFactory {
    pub fn new(allow_leading_wildcard: bool) -> Self {
        Self { allow_leading_wildcard }
    }

    pub fn create_query(&self, command: &SearchCommand) -> Value {
        self.create_query_at(command, Utc::now())
    }

    /// Same as [`QueryFactory::create_query`], with relative ranges resolved against `now`.
    pub fn create_query_at(&self, command: &SearchCommand, now: DateTime<Utc>) -> Value {
        let must = match normalize(&command.query) {
            Some(query) => self.query_string(query),
            None => json!({ "match_all": {} }),
        };

        let mut filters = Vec::new();
        if let Some((from, to)) = command.range.as_ref().and_then(|range| range.bounds(now)) {
            filters.push(range_filter(from, to));
        }
        if let Some(filter) = command.filter.as_deref().and_then(normalize) {
            filters.push(self.query_string(filter));
        }
        if let Some(streams) = streams_filter(&command.streams) {
            filters.push(streams);
        }

        json!({ "bool": { "must": [must], "filter": filters } })
    }

    fn query_string(&self, query: &str) -> Value {
        json!({
            "query_string": {
                "query": query,
                "allow_leading_wildcard": self.allow_leading_wildcard,
            }
        })
    }
}

/// ✂️ Trimmed query, or `None` for the "match everything" spellings (empty and `*`).
fn normalize(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    (!trimmed.is_empty() && trimmed != "*").then_some(trimmed)
}

fn range_filter(from: DateTime<Utc>, to: DateTime<Utc>) -> Value {
    json!({
        "range": {
            TIMESTAMP_FIELD: {
                "gte": from.format(CHRONO_DATE_FORMAT).to_string(),
                "lte": to.format(CHRONO_DATE_FORMAT).to_string(),
                "format": CLUSTER_DATE_FORMAT,
            }
        }
    })
}

fn streams_filter(streams: &BTreeSet<String>) -> Option<Value> {
    if streams.is_empty() {
        return None;
    }
    let mut should = vec![json!({ "terms": { STREAMS_FIELD: streams } })];
    // -- 📺 messages that predate stream routing have no streams field and belong to the default stream
    if streams.contains(DEFAULT_STREAM_ID) {
        should.push(json!({ "bool": { "must_not": { "exists": { "field": STREAMS_FIELD } } } }));
    }
    Some(json!({ "bool": { "should": should, "minimum_should_match": 1 } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn search(query: &str) -> SearchCommand {
        SearchCommand::from(&ChunkCommand {
            query: query.to_owned(),
            ..Default::default()
        })
    }

    #[test]
    fn the_one_where_star_and_nothing_both_mean_everything() {
        let factory = QueryFactory::default();
        for query in ["", "   ", "*", " * "] {
            assert_eq!(
                factory.create_query(&search(query)),
                json!({"bool": {"must": [{"match_all": {}}], "filter": []}}),
                "query {query:?} should be match_all"
            );
        }
    }

    #[test]
    fn the_one_where_the_leading_wildcard_flag_rides_along() {
        let query = QueryFactory::new(true).create_query(&search("  source:*web  "));
        assert_eq!(
            query["bool"]["must"][0],
            json!({"query_string": {"query": "source:*web", "allow_leading_wildcard": true}})
        );
    }

    #[test]
    fn the_one_where_range_filter_and_streams_all_land_in_filter_context() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid date");
        let mut command = search("level:3");
        command.range = Some(TimeRange::Relative { range: 300 });
        command.filter = Some("streams:abc".to_owned());
        command.streams = BTreeSet::from(["abc".to_owned()]);

        let query = QueryFactory::default().create_query_at(&command, now);
        let filters = query["bool"]["filter"].as_array().expect("filters array");

        assert_eq!(filters.len(), 3);
        assert_eq!(
            filters[0],
            json!({"range": {"timestamp": {
                "gte": "2024-03-01 11:55:00.000",
                "lte": "2024-03-01 12:00:00.000",
                "format": "yyyy-MM-dd HH:mm:ss.SSS"
            }}})
        );
        assert_eq!(filters[1]["query_string"]["query"], "streams:abc");
        assert_eq!(
            filters[2],
            json!({"bool": {"should": [{"terms": {"streams": ["abc"]}}], "minimum_should_match": 1}})
        );
    }

    #[test]
    fn the_one_where_the_default_stream_adopts_the_streamless() {
        let mut command = search("*");
        command.streams = BTreeSet::from([DEFAULT_STREAM_ID.to_owned()]);
        let query = QueryFactory::default().create_query(&command);
        let should = &query["bool"]["filter"][0]["bool"]["should"];
        assert_eq!(should[1], json!({"bool": {"must_not": {"exists": {"field": "streams"}}}}));
    }

    #[test]
    fn the_one_where_relative_zero_means_all_of_time() {
        let mut command = search("*");
        command.range = Some(TimeRange::Relative { range: 0 });
        command.filter = Some("*".to_owned());
        let query = QueryFactory::default().create_query(&command);
        assert_eq!(query["bool"]["filter"], json!([]));
    }

    #[test]
    fn the_one_where_sorting_defaults_to_document_order() {
        assert_eq!(search("*").sorting.to_wire(), json!({"_doc": {"order": "asc"}}));
        let sorting: Sorting = serde_json::from_value(json!({"field": "timestamp", "order": "desc"}))
            .expect("sorting should decode");
        assert_eq!(sorting.to_wire(), json!({"timestamp": {"order": "desc"}}));
    }
}
