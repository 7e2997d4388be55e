//! Scans through `EsClient` against an in-process fake Elasticsearch node.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use escan_connectors::{Credentials, EsClient, EsConfig};
use escan_core::{scan_index, ResponseType, ScanError, ScanRequest, ScrollCursor, SearchEngine};
use serde_json::{json, Value};

const INDEX: &str = "logs";
const BASIC_AUTH: &str = "Basic ZWxhc3RpYzpjaGFuZ2VtZQ==";

#[derive(Default)]
struct FakeNode {
    docs: Vec<(String, Value)>,
    contexts: HashMap<String, (usize, VecDeque<(String, Value)>)>,
    next_context: u64,
    require_auth: bool,
    expire_contexts: bool,
    count_bodies: Vec<Value>,
    search_params: Vec<HashMap<String, String>>,
    cleared: usize,
    clear_status: Option<StatusCode>,
}

type Shared = Arc<Mutex<FakeNode>>;

fn error(status: StatusCode, kind: &str, reason: &str, index: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "type": kind,
                "reason": reason,
                "index": index,
                "root_cause": [{"type": kind, "reason": reason}]
            },
            "status": status.as_u16()
        })),
    )
        .into_response()
}

fn guard(node: &FakeNode, index: Option<&str>, headers: &HeaderMap) -> Option<Response> {
    if node.require_auth {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if auth != Some(BASIC_AUTH) {
            return Some(error(
                StatusCode::UNAUTHORIZED,
                "security_exception",
                "unable to authenticate user",
                index.unwrap_or_default(),
            ));
        }
    }
    if let Some(index) = index {
        if index != INDEX {
            return Some(error(
                StatusCode::NOT_FOUND,
                "index_not_found_exception",
                "no such index",
                index,
            ));
        }
    }
    None
}

fn batch(node: &mut FakeNode, scroll_id: &str) -> Value {
    let (size, remaining) = node.contexts.get_mut(scroll_id).unwrap();
    let take = remaining.len().min(*size);
    let hits: Vec<Value> = remaining
        .drain(..take)
        .map(|(id, source)| json!({"_index": INDEX, "_id": id, "_source": source}))
        .collect();
    json!({"_scroll_id": scroll_id, "hits": {"hits": hits}})
}

async fn count(
    State(node): State<Shared>,
    Path(index): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut node = node.lock().unwrap();
    if let Some(rejection) = guard(&node, Some(&index), &headers) {
        return rejection;
    }
    node.count_bodies.push(body);
    Json(json!({"count": node.docs.len()})).into_response()
}

async fn search(
    State(node): State<Shared>,
    Path(index): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut node = node.lock().unwrap();
    if let Some(rejection) = guard(&node, Some(&index), &headers) {
        return rejection;
    }
    node.search_params.push(params.clone());

    if !params.contains_key("scroll") {
        let total = node.docs.len();
        return Json(json!({"hits": {"hits": []}, "aggregations": {"total": {"value": total}}}))
            .into_response();
    }

    let slice = body
        .get("slice")
        .map(|s| (s["id"].as_u64().unwrap() as usize, s["max"].as_u64().unwrap() as usize));
    let selected = node
        .docs
        .iter()
        .enumerate()
        .filter(|(i, _)| slice.map_or(true, |(id, max)| i % max == id))
        .map(|(_, doc)| doc.clone())
        .collect();
    node.next_context += 1;
    let scroll_id = format!("ctx-{}", node.next_context);
    let size = params.get("size").and_then(|s| s.parse().ok()).unwrap_or(10);
    node.contexts.insert(scroll_id.clone(), (size, selected));
    Json(batch(&mut node, &scroll_id)).into_response()
}

async fn continue_scroll(
    State(node): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut node = node.lock().unwrap();
    if let Some(rejection) = guard(&node, None, &headers) {
        return rejection;
    }
    let scroll_id = body["scroll_id"].as_str().unwrap_or_default().to_string();
    if node.expire_contexts || !node.contexts.contains_key(&scroll_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {
                    "type": "search_phase_execution_exception",
                    "reason": "all shards failed",
                    "root_cause": [{
                        "type": "search_context_missing_exception",
                        "reason": format!("No search context found for id [{}]", scroll_id)
                    }]
                },
                "status": 404
            })),
        )
            .into_response();
    }
    Json(batch(&mut node, &scroll_id)).into_response()
}

async fn clear_scroll(State(node): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut node = node.lock().unwrap();
    let mut freed = 0;
    for id in body["scroll_id"].as_array().into_iter().flatten() {
        if node.contexts.remove(id.as_str().unwrap_or_default()).is_some() {
            freed += 1;
        }
    }
    node.cleared += 1;
    match node.clear_status {
        Some(status) if status == StatusCode::NOT_FOUND => (
            StatusCode::NOT_FOUND,
            Json(json!({"succeeded": true, "num_freed": 0})),
        )
            .into_response(),
        Some(status) => error(status, "exception", "clear failed", ""),
        None => Json(json!({"succeeded": true, "num_freed": freed})).into_response(),
    }
}

async fn spawn_node(node: Shared) -> String {
    let app = Router::new()
        .route("/:index/_count", post(count))
        .route("/:index/_search", post(search))
        .route("/_search/scroll", post(continue_scroll).delete(clear_scroll))
        .with_state(node);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn node_with(docs: usize) -> Shared {
    Arc::new(Mutex::new(FakeNode {
        docs: (0..docs)
            .map(|i| (format!("d{i}"), json!({"n": i})))
            .collect(),
        ..Default::default()
    }))
}

async fn closed_port() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn client(hosts: &[String]) -> Arc<EsClient> {
    let hosts = escan_connectors::config::parse_hosts(&hosts.join(",")).unwrap();
    Arc::new(EsClient::new(EsConfig::new(hosts)).unwrap())
}

#[tokio::test]
async fn full_scan_drains_every_slice() {
    let node = node_with(23);
    let host = spawn_node(node.clone()).await;
    let engine = client(&[host]);

    let request = ScanRequest::new(INDEX)
        .with_query(json!({"query": {"match_all": {}}, "sort": ["_doc"]}))
        .with_scroll_size(5);
    let units = scan_index(engine, request, None).await.unwrap();
    assert_eq!(units.len(), 5);

    let mut ids = HashSet::new();
    for unit in &units {
        for doc in unit.execute().await.unwrap().into_documents() {
            assert!(ids.insert(doc.id));
        }
    }
    assert_eq!(ids.len(), 23);

    let node = node.lock().unwrap();
    // only the query clause is sent to _count
    assert_eq!(node.count_bodies, vec![json!({"query": {"match_all": {}}})]);
    assert_eq!(node.search_params[0].get("scroll").map(String::as_str), Some("60s"));
    assert_eq!(node.search_params[0].get("size").map(String::as_str), Some("5"));
    assert_eq!(node.cleared, 5);
    assert!(node.contexts.is_empty());
}

#[tokio::test]
async fn missing_index_fails_planning() {
    let host = spawn_node(node_with(3)).await;
    let err = scan_index(client(&[host]), ScanRequest::new("metrics"), None)
        .await
        .unwrap_err();
    assert_eq!(err, ScanError::IndexNotFound("metrics".into()));
}

#[tokio::test]
async fn credentials_are_sent() {
    let node = node_with(4);
    node.lock().unwrap().require_auth = true;
    let host = spawn_node(node).await;
    let hosts = escan_connectors::config::parse_hosts(&host).unwrap();

    let anonymous = EsClient::new(EsConfig::new(hosts.clone())).unwrap();
    let err = anonymous.count(INDEX, None).await.unwrap_err();
    assert!(matches!(err, ScanError::Authentication(_)));

    let authorized = EsClient::new(
        EsConfig::new(hosts).with_credentials(Credentials::basic("elastic", "changeme")),
    )
    .unwrap();
    assert_eq!(authorized.count(INDEX, None).await.unwrap(), 4);
}

#[tokio::test]
async fn expired_context_fails_the_unit() {
    let node = node_with(12);
    let host = spawn_node(node.clone()).await;
    let request = ScanRequest::new(INDEX).with_scroll_size(2);
    let units = scan_index(client(&[host]), request, Some(2)).await.unwrap();

    node.lock().unwrap().expire_contexts = true;
    let err = units[0].execute().await.unwrap_err();
    assert!(err.is_scroll(), "unexpected error: {err}");
}

#[tokio::test]
async fn unreachable_host_is_skipped() {
    let host = spawn_node(node_with(6)).await;
    let engine = client(&[closed_port().await, host]);
    assert_eq!(engine.count(INDEX, None).await.unwrap(), 6);
}

#[tokio::test]
async fn no_reachable_host_is_a_connection_error() {
    let engine = client(&[closed_port().await]);
    let err = engine.count(INDEX, None).await.unwrap_err();
    assert!(matches!(err, ScanError::Connection(_)));
}

#[tokio::test]
async fn aggregation_scan() {
    let host = spawn_node(node_with(9)).await;
    let request = ScanRequest::new(INDEX)
        .with_query(json!({"aggs": {"total": {"value_count": {"field": "n"}}}}))
        .with_response_type(ResponseType::Aggregation);
    let units = scan_index(client(&[host]), request, None).await.unwrap();
    assert_eq!(units.len(), 1);

    let result = units[0].execute().await.unwrap();
    assert_eq!(
        result.documents[0].source,
        json!({"index": INDEX, "aggregation": {"total": {"value": 9}}})
    );
}

#[tokio::test]
async fn clearing_a_gone_context_succeeds() {
    let node = node_with(4);
    node.lock().unwrap().clear_status = Some(StatusCode::NOT_FOUND);
    let host = spawn_node(node.clone()).await;
    let engine = client(&[host]);

    engine
        .clear_scroll(&ScrollCursor("ctx-gone".into()))
        .await
        .unwrap();

    let request = ScanRequest::new(INDEX).with_scroll_size(2);
    let units = scan_index(engine, request, Some(1)).await.unwrap();
    assert_eq!(units[0].execute().await.unwrap().len(), 4);
    assert_eq!(node.lock().unwrap().cleared, 2);
}

#[tokio::test]
async fn failed_clear_does_not_fail_the_unit() {
    let node = node_with(5);
    node.lock().unwrap().clear_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let host = spawn_node(node.clone()).await;
    let engine = client(&[host]);

    let err = engine
        .clear_scroll(&ScrollCursor("ctx-1".into()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ScanError::Engine {
            status: 500,
            reason: "clear failed".into()
        }
    );

    // the context is left to expire, the documents are still returned
    let request = ScanRequest::new(INDEX).with_scroll_size(2);
    let units = scan_index(engine, request, Some(1)).await.unwrap();
    let result = units[0].execute().await.unwrap();
    assert_eq!(result.len(), 5);
    assert_eq!(node.lock().unwrap().cleared, 2);
}
