//! Scan data model: the request, the plan derived from it, slice descriptors
//! and the documents a drained slice produces.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, ScanError};

/// Default number of documents requested per scroll batch.
pub const DEFAULT_SCROLL_SIZE: usize = 10_000;

/// Default lifetime of a scroll context between two batch requests.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// What a scan returns for its index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// The `_source` of every matching document, fetched by sliced scrolls.
    #[default]
    Hits,
    /// The `aggregations` section of a single search over the index.
    Aggregation,
}

/// The index to scan and how to scan it.
///
/// Immutable once handed to [`crate::scan_index`]; the generated units share
/// it read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub index: String,
    pub query: Value,
    pub scroll_size: usize,
    pub keep_alive: Duration,
    pub response_type: ResponseType,
}

impl ScanRequest {
    /// Scan every document of `index` with the default batch size and keep-alive.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: Value::Object(Map::new()),
            scroll_size: DEFAULT_SCROLL_SIZE,
            keep_alive: DEFAULT_KEEP_ALIVE,
            response_type: ResponseType::Hits,
        }
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_scroll_size(mut self, scroll_size: usize) -> Self {
        self.scroll_size = scroll_size;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Check the parameters that can be rejected without talking to the engine.
    pub fn validate(&self) -> Result<()> {
        if self.index.trim().is_empty() {
            return Err(ScanError::InvalidRequest("index name cannot be empty".into()));
        }
        if self.scroll_size == 0 {
            return Err(ScanError::InvalidRequest("scroll size must be positive".into()));
        }
        if self.keep_alive.is_zero() {
            return Err(ScanError::InvalidRequest("scroll keep-alive must be positive".into()));
        }
        let body = self.query.as_object().ok_or_else(|| {
            ScanError::InvalidRequest("query body must be a JSON object".into())
        })?;
        if body.contains_key("slice") {
            return Err(ScanError::InvalidRequest(
                "query body already carries a slice clause".into(),
            ));
        }
        Ok(())
    }

    /// The `query` clause of the body, used for count requests.
    pub fn query_clause(&self) -> Option<&Value> {
        self.query.get("query")
    }
}

/// Number of partitions a scan is split into and the batch size each
/// partition scrolls with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partition_count: usize,
    pub scroll_size: usize,
}

impl PartitionPlan {
    /// One descriptor per partition, in ascending index order.
    pub fn slices(&self) -> impl Iterator<Item = SliceDescriptor> + '_ {
        (0..self.partition_count).map(|i| SliceDescriptor::new(i, self.partition_count))
    }
}

/// Identifies which disjoint subset of the index a unit is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceDescriptor {
    pub partition_index: usize,
    pub partition_count: usize,
}

impl SliceDescriptor {
    pub fn new(partition_index: usize, partition_count: usize) -> Self {
        Self {
            partition_index,
            partition_count,
        }
    }

    /// The `slice` clause to add to the search body, or `None` for a
    /// single-partition scan (engines reject `max` below 2).
    pub fn clause(&self) -> Option<Value> {
        if self.partition_count < 2 {
            return None;
        }
        Some(json!({
            "id": self.partition_index,
            "max": self.partition_count,
        }))
    }

    /// `body` with this slice's clause added.
    pub fn apply(&self, body: &Value) -> Value {
        let mut body = body.clone();
        if let (Some(clause), Some(map)) = (self.clause(), body.as_object_mut()) {
            map.insert("slice".to_string(), clause);
        }
        body
    }
}

impl fmt::Display for SliceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slice {}/{}", self.partition_index, self.partition_count)
    }
}

/// Engine-issued resume point within a scroll.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrollCursor(pub String);

impl ScrollCursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScrollCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One document returned by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// A batch answered by the engine together with the cursor to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollBatch {
    pub cursor: ScrollCursor,
    pub documents: Vec<Document>,
}

/// The documents of one fully drained partition, in scroll order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    pub slice: SliceDescriptor,
    pub documents: Vec<Document>,
}

impl PartitionResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}
