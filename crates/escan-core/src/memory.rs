//! In-memory search engine.
//!
//! Holds indices as plain document lists and implements the scroll contract
//! with the same observable behaviour as a real engine: a scroll snapshots the
//! matching documents when opened, slices are assigned by a stable hash of the
//! document id, and an empty batch ends the scroll. Faults can be injected to
//! exercise the error paths of scans.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::engine::SearchEngine;
use crate::error::{Result, ScanError};
use crate::model::{Document, ScrollBatch, ScrollCursor};

/// Call counters and open scroll contexts of a [`MemoryEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub count_calls: usize,
    pub open_calls: usize,
    pub continue_calls: usize,
    pub clear_calls: usize,
    pub aggregate_calls: usize,
    pub open_contexts: usize,
}

struct ScrollContext {
    remaining: VecDeque<Document>,
    size: usize,
    slice_id: usize,
}

#[derive(Default)]
struct MemoryState {
    indices: BTreeMap<String, Vec<Document>>,
    contexts: HashMap<String, ScrollContext>,
    next_context: u64,
    unreachable: bool,
    unauthorized: bool,
    expired_slices: HashSet<usize>,
    drop_connection_after: Option<usize>,
    stats: EngineStats,
}

impl MemoryState {
    fn check_access(&self) -> Result<()> {
        if self.unreachable {
            return Err(ScanError::Connection("memory engine is unreachable".into()));
        }
        if self.unauthorized {
            return Err(ScanError::Authentication("credentials rejected".into()));
        }
        Ok(())
    }

    fn index(&self, name: &str) -> Result<&Vec<Document>> {
        self.indices
            .get(name)
            .ok_or_else(|| ScanError::IndexNotFound(name.to_string()))
    }

    fn next_batch(&mut self, cursor: &str) -> Result<ScrollBatch> {
        let context = self
            .contexts
            .get_mut(cursor)
            .ok_or_else(|| ScanError::scroll(format!("no search context found for id [{}]", cursor)))?;
        let take = context.size.min(context.remaining.len());
        let documents = context.remaining.drain(..take).collect();
        Ok(ScrollBatch {
            cursor: ScrollCursor(cursor.to_string()),
            documents,
        })
    }
}

/// A search engine backed by in-process document lists.
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `index` if it does not exist yet.
    pub fn create_index(&self, index: &str) {
        self.state().indices.entry(index.to_string()).or_default();
    }

    /// Append documents to `index`, creating it when needed.
    pub fn insert(&self, index: &str, documents: impl IntoIterator<Item = Document>) {
        self.state()
            .indices
            .entry(index.to_string())
            .or_default()
            .extend(documents);
    }

    /// Make every following call fail as if the engine could not be reached.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Reject (or accept again) the caller's credentials.
    pub fn set_authorized(&self, authorized: bool) {
        self.state().unauthorized = !authorized;
    }

    /// Expire every scroll context opened for slice `slice_id` as soon as its
    /// first batch has been served.
    pub fn expire_slice(&self, slice_id: usize) {
        self.state().expired_slices.insert(slice_id);
    }

    /// Let `calls` more continue requests succeed, then drop the connection
    /// of the next one. Later requests succeed again.
    pub fn drop_connection_after_continues(&self, calls: usize) {
        self.state().drop_connection_after = Some(calls);
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state();
        EngineStats {
            open_contexts: state.contexts.len(),
            ..state.stats
        }
    }
}

/// Stable slice assignment of a document id (FNV-1a, modulo `max`).
pub fn slice_of(id: &str, max: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % max.max(1) as u64) as usize
}

fn matches(query: Option<&Value>, source: &Value) -> Result<bool> {
    let Some(query) = query else {
        return Ok(true);
    };
    if query.get("match_all").is_some() {
        return Ok(true);
    }
    if let Some(term) = query.get("term").and_then(Value::as_object) {
        return Ok(term.iter().all(|(field, expected)| {
            let expected = expected.get("value").unwrap_or(expected);
            source.get(field) == Some(expected)
        }));
    }
    Err(ScanError::Engine {
        status: 400,
        reason: format!("unsupported query: {}", query),
    })
}

fn parse_slice(body: &Value) -> Result<Option<(usize, usize)>> {
    let Some(slice) = body.get("slice") else {
        return Ok(None);
    };
    let id = slice.get("id").and_then(Value::as_u64);
    let max = slice.get("max").and_then(Value::as_u64);
    match (id, max) {
        (Some(id), Some(max)) if max > 1 && id < max => Ok(Some((id as usize, max as usize))),
        _ => Err(ScanError::Engine {
            status: 400,
            reason: format!("invalid slice clause: {}", slice),
        }),
    }
}

fn aggregate_documents(aggs: &Map<String, Value>, documents: &[&Document]) -> Result<Value> {
    let mut out = Map::new();
    for (name, spec) in aggs {
        let (kind, field) = spec
            .as_object()
            .and_then(|spec| spec.iter().next())
            .and_then(|(kind, params)| Some((kind.as_str(), params.get("field")?.as_str()?)))
            .ok_or_else(|| ScanError::Engine {
                status: 400,
                reason: format!("aggregation '{}' needs a field", name),
            })?;
        let values = documents.iter().filter_map(|d| d.source.get(field));
        let result = match kind {
            "value_count" => json!({ "value": values.count() }),
            "terms" => {
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                for value in values {
                    let key = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    *counts.entry(key).or_default() += 1;
                }
                let mut buckets: Vec<_> = counts.into_iter().collect();
                buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                let buckets: Vec<Value> = buckets
                    .into_iter()
                    .map(|(key, doc_count)| json!({ "key": key, "doc_count": doc_count }))
                    .collect();
                json!({ "buckets": buckets })
            }
            other => {
                return Err(ScanError::Engine {
                    status: 400,
                    reason: format!("unsupported aggregation type '{}'", other),
                })
            }
        };
        out.insert(name.clone(), result);
    }
    Ok(Value::Object(out))
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn count(&self, index: &str, query: Option<&Value>) -> Result<u64> {
        let mut state = self.state();
        state.stats.count_calls += 1;
        state.check_access()?;
        let mut count = 0;
        for doc in state.index(index)? {
            if matches(query, &doc.source)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn open_scroll(
        &self,
        index: &str,
        body: &Value,
        size: usize,
        _keep_alive: Duration,
    ) -> Result<ScrollBatch> {
        let mut state = self.state();
        state.stats.open_calls += 1;
        state.check_access()?;
        let slice = parse_slice(body)?;
        let query = body.get("query");

        let mut remaining = VecDeque::new();
        for doc in state.index(index)? {
            let in_slice = slice.map_or(true, |(id, max)| slice_of(&doc.id, max) == id);
            if in_slice && matches(query, &doc.source)? {
                remaining.push_back(doc.clone());
            }
        }

        state.next_context += 1;
        let cursor = format!("memory-scroll-{}", state.next_context);
        state.contexts.insert(
            cursor.clone(),
            ScrollContext {
                remaining,
                size: size.max(1),
                slice_id: slice.map_or(0, |(id, _)| id),
            },
        );
        state.next_batch(&cursor)
    }

    async fn continue_scroll(
        &self,
        cursor: &ScrollCursor,
        _keep_alive: Duration,
    ) -> Result<ScrollBatch> {
        // suspend like a network round trip so a scan can be cancelled between batches
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.stats.continue_calls += 1;
        state.check_access()?;
        match state.drop_connection_after {
            Some(0) => {
                state.drop_connection_after = None;
                return Err(ScanError::Connection(
                    "connection reset while reading a scroll batch".into(),
                ));
            }
            Some(left) => state.drop_connection_after = Some(left - 1),
            None => {}
        }

        let expired = state
            .contexts
            .get(cursor.as_str())
            .is_some_and(|ctx| state.expired_slices.contains(&ctx.slice_id));
        if expired {
            state.contexts.remove(cursor.as_str());
            return Err(ScanError::scroll(format!(
                "search context [{}] expired",
                cursor
            )));
        }
        state.next_batch(cursor.as_str())
    }

    async fn clear_scroll(&self, cursor: &ScrollCursor) -> Result<()> {
        let mut state = self.state();
        state.stats.clear_calls += 1;
        state.check_access()?;
        state.contexts.remove(cursor.as_str());
        Ok(())
    }

    async fn aggregate(&self, index: &str, body: &Value) -> Result<Value> {
        let mut state = self.state();
        state.stats.aggregate_calls += 1;
        state.check_access()?;
        let query = body.get("query");
        let mut matching = Vec::new();
        for doc in state.index(index)? {
            if matches(query, &doc.source)? {
                matching.push(doc);
            }
        }
        let empty = Map::new();
        let aggs = body
            .get("aggs")
            .or_else(|| body.get("aggregations"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        aggregate_documents(aggs, &matching)
    }
}
