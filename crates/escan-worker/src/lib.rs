//! Task-parallel execution of the deferred units produced by `escan-core`.
//!
//! [`PartitionRunner`] executes units on tokio tasks with bounded
//! concurrency, [`rebalance`] spreads planned units over execution nodes,
//! and [`ScanMetrics`] records how the runs went.

pub mod config;
pub mod error;
pub mod metrics;
pub mod rebalance;
pub mod runner;

pub use config::{RunnerConfig, ScanSettings};
pub use error::RunnerError;
pub use metrics::ScanMetrics;
pub use rebalance::{rebalance, NodeAssignment};
pub use runner::{PartitionRunner, UnitOutcome};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing when a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
