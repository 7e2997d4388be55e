//! escan connectors - search engines reachable over the network
//!
//! This crate provides [`EsClient`], an implementation of
//! [`escan_core::SearchEngine`] for Elasticsearch (and compatible) clusters
//! speaking the `_count` / `_search?scroll` / `_search/scroll` REST API.

pub mod client;
pub mod config;
pub mod wire;

pub use client::EsClient;
pub use config::{parse_hosts, Credentials, EsConfig};
