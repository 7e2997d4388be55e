//! Runner and scan configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use escan_core::{ScanRequest, DEFAULT_SCROLL_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum number of units executing at the same time.
    pub concurrency: usize,
    /// Total executions allowed per unit, the first one included.
    pub max_attempts: usize,
    /// Execution nodes units can be assigned to.
    pub nodes: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 1,
            nodes: vec!["local".to_string()],
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        let concurrency: usize = std::env::var("SCAN_CONCURRENCY")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .context("Invalid SCAN_CONCURRENCY")?;
        anyhow::ensure!(concurrency > 0, "SCAN_CONCURRENCY must be positive");

        let max_attempts: usize = std::env::var("SCAN_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("Invalid SCAN_MAX_ATTEMPTS")?;
        anyhow::ensure!(max_attempts > 0, "SCAN_MAX_ATTEMPTS must be positive");

        let nodes: Vec<String> = std::env::var("SCAN_NODES")
            .unwrap_or_else(|_| "local".to_string())
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        anyhow::ensure!(!nodes.is_empty(), "SCAN_NODES must name at least one node");

        Ok(Self {
            concurrency,
            max_attempts,
            nodes,
        })
    }
}

/// Per-scan parameters: batch size, partition count and scroll keep-alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub scroll_size: usize,
    /// None = derive the partition count from the document count.
    pub partitions: Option<usize>,
    pub keep_alive: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scroll_size: DEFAULT_SCROLL_SIZE,
            partitions: None,
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl ScanSettings {
    pub fn from_env() -> Result<Self> {
        let partitions = match std::env::var("SCAN_PARTITIONS") {
            Ok(value) => Some(
                value
                    .parse::<usize>()
                    .context("Invalid SCAN_PARTITIONS")?,
            ),
            Err(_) => None,
        };
        anyhow::ensure!(partitions != Some(0), "SCAN_PARTITIONS must be positive");

        let scroll_size: usize = std::env::var("SCAN_SCROLL_SIZE")
            .unwrap_or_else(|_| DEFAULT_SCROLL_SIZE.to_string())
            .parse()
            .context("Invalid SCAN_SCROLL_SIZE")?;
        anyhow::ensure!(scroll_size > 0, "SCAN_SCROLL_SIZE must be positive");

        let keep_alive_secs: u64 = std::env::var("SCAN_KEEP_ALIVE_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("Invalid SCAN_KEEP_ALIVE_SECS")?;
        anyhow::ensure!(keep_alive_secs > 0, "SCAN_KEEP_ALIVE_SECS must be positive");

        Ok(Self {
            scroll_size,
            partitions,
            keep_alive: Duration::from_secs(keep_alive_secs),
        })
    }

    /// A request for `index` carrying these settings.
    pub fn request(&self, index: impl Into<String>) -> ScanRequest {
        ScanRequest::new(index)
            .with_scroll_size(self.scroll_size)
            .with_keep_alive(self.keep_alive)
    }
}
