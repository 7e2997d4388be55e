//! escan-core - partitioned scans of search indices
//!
//! Splits a full scan of an index into slices that can be fetched
//! independently:
//! - [`planner`] decides how many partitions a scan needs
//! - [`generator`] builds one lazy [`DeferredUnit`] per partition, each of
//!   which drains its slice through a scroll when executed
//! - [`engine::SearchEngine`] is the contract the engine behind a scan must
//!   fulfil; [`memory::MemoryEngine`] implements it in-process

pub mod engine;
pub mod error;
pub mod generator;
pub mod memory;
pub mod model;
pub mod planner;

pub use engine::SearchEngine;
pub use error::{Result, ScanError};
pub use generator::{generate, scan_index, DeferredUnit};
pub use memory::MemoryEngine;
pub use model::{
    Document, PartitionPlan, PartitionResult, ResponseType, ScanRequest, ScrollBatch,
    ScrollCursor, SliceDescriptor, DEFAULT_KEEP_ALIVE, DEFAULT_SCROLL_SIZE,
};
pub use planner::{partition_count_for, plan};
