//! Request and response bodies of the Elasticsearch REST endpoints used by
//! scans, and the mapping of error responses onto [`ScanError`].

use escan_core::{Document, ScanError, ScrollBatch, ScrollCursor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct CountRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ScrollRequest<'a> {
    pub scroll: &'a str,
    pub scroll_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ClearScrollRequest<'a> {
    pub scroll_id: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl SearchResponse {
    /// Turn a scroll answer into a batch; a scroll answer without a scroll id
    /// cannot be continued and is malformed.
    pub fn into_batch(self) -> Result<ScrollBatch, ScanError> {
        let scroll_id = self.scroll_id.ok_or_else(|| {
            ScanError::MalformedResponse("scroll response without _scroll_id".into())
        })?;
        Ok(ScrollBatch {
            cursor: ScrollCursor(scroll_id),
            documents: self
                .hits
                .hits
                .into_iter()
                .map(|hit| Document::new(hit.id, hit.source))
                .collect(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// `error` is an object on current versions and a plain string on very old ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Detailed(ErrorDetail),
    Message(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub root_cause: Vec<ErrorDetail>,
}

impl ErrorDetail {
    fn has_kind(&self, kind: &str) -> bool {
        self.kind == kind || self.root_cause.iter().any(|c| c.has_kind(kind))
    }
}

/// Which endpoint an error answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Count,
    OpenScroll,
    ContinueScroll,
    ClearScroll,
    Aggregate,
}

impl Endpoint {
    fn is_scroll_context(self) -> bool {
        matches!(self, Endpoint::ContinueScroll | Endpoint::ClearScroll)
    }
}

/// Map a non-success answer onto the scan error taxonomy.
pub fn classify_error(status: u16, body: &[u8], endpoint: Endpoint, index: &str) -> ScanError {
    let parsed: ErrorResponse = serde_json::from_slice(body).unwrap_or_default();
    let (detail, message) = match parsed.error {
        Some(ErrorBody::Detailed(detail)) => {
            let message = detail
                .reason
                .clone()
                .unwrap_or_else(|| detail.kind.clone());
            (Some(detail), message)
        }
        Some(ErrorBody::Message(message)) => (None, message),
        None => (None, String::from_utf8_lossy(body).into_owned()),
    };
    let has_kind = |kind: &str| detail.as_ref().is_some_and(|d| d.has_kind(kind));
    let context_missing = has_kind("search_context_missing_exception");
    let index_missing = has_kind("index_not_found_exception");

    match status {
        401 | 403 => ScanError::Authentication(message),
        _ if context_missing => ScanError::scroll(message),
        404 if index_missing => ScanError::IndexNotFound(
            detail
                .and_then(|d| d.index.or_else(|| d.root_cause.into_iter().find_map(|c| c.index)))
                .unwrap_or_else(|| index.to_string()),
        ),
        404 if endpoint.is_scroll_context() => ScanError::scroll(message),
        _ => ScanError::Engine {
            status,
            reason: message,
        },
    }
}
