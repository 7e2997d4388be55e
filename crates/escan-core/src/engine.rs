//! The search-engine contract scans are planned and executed against.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{ScrollBatch, ScrollCursor};

/// Count, scroll and aggregate operations of a search engine.
///
/// Implementations map their own failures onto [`crate::ScanError`]: an
/// unreachable engine is `Connection`, a missing index `IndexNotFound`,
/// rejected credentials `Authentication`, and an expired or unknown scroll
/// context `Scroll`.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Number of documents of `index` matching `query` (a `query` clause, or
    /// `None` for every document).
    async fn count(&self, index: &str, query: Option<&Value>) -> Result<u64>;

    /// Open a scroll over `index` for `body` and return the first batch.
    ///
    /// `body` already carries the slice clause when the scan is sliced.
    async fn open_scroll(
        &self,
        index: &str,
        body: &Value,
        size: usize,
        keep_alive: Duration,
    ) -> Result<ScrollBatch>;

    /// Fetch the batch following `cursor`. An empty batch signals exhaustion.
    async fn continue_scroll(
        &self,
        cursor: &ScrollCursor,
        keep_alive: Duration,
    ) -> Result<ScrollBatch>;

    /// Release the resources held by `cursor`.
    async fn clear_scroll(&self, cursor: &ScrollCursor) -> Result<()>;

    /// Run a single search for `body` and return its `aggregations` section.
    async fn aggregate(&self, index: &str, body: &Value) -> Result<Value>;
}
