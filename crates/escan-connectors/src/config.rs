//! Connection settings for an Elasticsearch cluster.

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

/// How requests authenticate against the cluster.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    /// Base64 encoded `id:api_key`, sent as `Authorization: ApiKey ...`.
    ApiKey(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::ApiKey(_) => f.debug_tuple("ApiKey").field(&"***").finish(),
        }
    }
}

impl Credentials {
    /// Basic credentials, or none when both parts are empty.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        let (username, password) = (username.into(), password.into());
        if username.is_empty() && password.is_empty() {
            Credentials::None
        } else {
            Credentials::Basic { username, password }
        }
    }
}

/// Cluster endpoints, credentials and request timeout.
#[derive(Debug, Clone)]
pub struct EsConfig {
    /// Nodes to send requests to, tried in order.
    pub hosts: Vec<Url>,
    pub credentials: Credentials,
    pub request_timeout: Duration,
}

impl EsConfig {
    pub fn new(hosts: Vec<Url>) -> Self {
        Self {
            hosts,
            credentials: Credentials::None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build an EsConfig from environment variables:
    ///   ES_HOSTS, ES_USERNAME, ES_PASSWORD, ES_API_KEY, ES_REQUEST_TIMEOUT_SECS
    pub fn from_env() -> Result<Self> {
        let hosts = parse_hosts(
            &std::env::var("ES_HOSTS").unwrap_or_else(|_| "http://localhost:9200".to_string()),
        )?;
        let credentials = match std::env::var("ES_API_KEY") {
            Ok(key) if !key.is_empty() => Credentials::ApiKey(key),
            _ => Credentials::basic(
                std::env::var("ES_USERNAME").unwrap_or_default(),
                std::env::var("ES_PASSWORD").unwrap_or_default(),
            ),
        };
        let timeout_secs: u64 = std::env::var("ES_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("Invalid ES_REQUEST_TIMEOUT_SECS")?;

        Ok(Self {
            hosts,
            credentials,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Parse a comma separated host list. Hosts without a scheme get `http://`.
pub fn parse_hosts(hosts: &str) -> Result<Vec<Url>> {
    let parsed = hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|host| {
            let with_scheme = if host.contains("://") {
                host.to_string()
            } else {
                format!("http://{}", host)
            };
            let url = Url::parse(&with_scheme)
                .with_context(|| format!("invalid Elasticsearch host '{}'", host))?;
            anyhow::ensure!(
                matches!(url.scheme(), "http" | "https"),
                "Elasticsearch host '{}' must use http or https",
                host
            );
            Ok(url)
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!parsed.is_empty(), "no Elasticsearch hosts configured");
    Ok(parsed)
}
