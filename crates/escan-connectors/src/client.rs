//! Elasticsearch REST client implementing the scan engine contract.

use std::time::Duration;

use async_trait::async_trait;
use escan_core::{Result, ScanError, ScrollBatch, ScrollCursor, SearchEngine};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::{Credentials, EsConfig};
use crate::wire::{
    classify_error, ClearScrollRequest, CountRequest, CountResponse, Endpoint, ScrollRequest,
    SearchResponse,
};

/// Keep-alive rendered as an Elasticsearch time value.
fn time_value(keep_alive: Duration) -> String {
    if keep_alive.subsec_millis() == 0 {
        format!("{}s", keep_alive.as_secs())
    } else {
        format!("{}ms", keep_alive.as_millis())
    }
}

/// Client for one Elasticsearch cluster.
///
/// Requests go to the first configured host; when a host cannot be reached
/// the next one is tried. Answers from a reachable host are final.
#[derive(Debug, Clone)]
pub struct EsClient {
    config: EsConfig,
    http: reqwest::Client,
}

impl EsClient {
    pub fn new(config: EsConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.hosts.is_empty(), "no Elasticsearch hosts configured");
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &EsConfig {
        &self.config
    }

    fn endpoint_url(host: &Url, segments: &[&str]) -> Result<Url> {
        let mut url = host.clone();
        url.path_segments_mut()
            .map_err(|_| ScanError::InvalidRequest(format!("host '{}' cannot be a base URL", host)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::ApiKey(key) => {
                request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", key))
            }
        }
    }

    /// Send a request to the first reachable host and return its status and body.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        params: &[(&str, String)],
        body: &B,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let mut last_error = String::from("no hosts configured");
        for host in &self.config.hosts {
            let url = Self::endpoint_url(host, segments)?;
            debug!("{} {}", method, url);
            let request = self
                .http
                .request(method.clone(), url)
                .query(params)
                .json(body);
            let response = match self.authorize(request).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Elasticsearch host {} unreachable: {}", host, e);
                    last_error = e.to_string();
                    continue;
                }
            };
            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ScanError::Connection(e.to_string()))?;
            return Ok((status, bytes.to_vec()));
        }
        Err(ScanError::Connection(last_error))
    }

    async fn call<B, T>(
        &self,
        endpoint: Endpoint,
        index: &str,
        method: Method,
        segments: &[&str],
        params: &[(&str, String)],
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (status, bytes) = self.send(method, segments, params, body).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &bytes, endpoint, index));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SearchEngine for EsClient {
    async fn count(&self, index: &str, query: Option<&Value>) -> Result<u64> {
        let response: CountResponse = self
            .call(
                Endpoint::Count,
                index,
                Method::POST,
                &[index, "_count"],
                &[],
                &CountRequest { query },
            )
            .await?;
        Ok(response.count)
    }

    async fn open_scroll(
        &self,
        index: &str,
        body: &Value,
        size: usize,
        keep_alive: Duration,
    ) -> Result<ScrollBatch> {
        let response: SearchResponse = self
            .call(
                Endpoint::OpenScroll,
                index,
                Method::POST,
                &[index, "_search"],
                &[("scroll", time_value(keep_alive)), ("size", size.to_string())],
                body,
            )
            .await?;
        response.into_batch()
    }

    async fn continue_scroll(
        &self,
        cursor: &ScrollCursor,
        keep_alive: Duration,
    ) -> Result<ScrollBatch> {
        let scroll = time_value(keep_alive);
        let response: SearchResponse = self
            .call(
                Endpoint::ContinueScroll,
                "",
                Method::POST,
                &["_search", "scroll"],
                &[],
                &ScrollRequest {
                    scroll: &scroll,
                    scroll_id: cursor.as_str(),
                },
            )
            .await?;
        response.into_batch()
    }

    async fn clear_scroll(&self, cursor: &ScrollCursor) -> Result<()> {
        let (status, bytes) = self
            .send(
                Method::DELETE,
                &["_search", "scroll"],
                &[],
                &ClearScrollRequest {
                    scroll_id: vec![cursor.as_str()],
                },
            )
            .await?;
        // 404 means the context is already gone
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(classify_error(
            status.as_u16(),
            &bytes,
            Endpoint::ClearScroll,
            "",
        ))
    }

    async fn aggregate(&self, index: &str, body: &Value) -> Result<Value> {
        let response: SearchResponse = self
            .call(
                Endpoint::Aggregate,
                index,
                Method::POST,
                &[index, "_search"],
                &[("size", "0".to_string())],
                body,
            )
            .await?;
        Ok(response
            .aggregations
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}
