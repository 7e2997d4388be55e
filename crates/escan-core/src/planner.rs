//! Partition planning: how many slices a scan is split into.

use tracing::info;

use crate::engine::SearchEngine;
use crate::error::{Result, ScanError};
use crate::model::{PartitionPlan, ResponseType, ScanRequest};

/// Number of scroll batches needed to drain `doc_count` documents, which is
/// also the number of partitions. Never less than one.
pub fn partition_count_for(doc_count: u64, scroll_size: usize) -> usize {
    if scroll_size == 0 {
        return 1;
    }
    let batches = doc_count.div_ceil(scroll_size as u64);
    usize::try_from(batches).unwrap_or(usize::MAX).max(1)
}

/// Decide the partition plan for `request`.
///
/// An explicit `requested_partitions` is used as-is and costs no request.
/// Otherwise the engine is asked for the number of matching documents and
/// the scan gets one partition per scroll batch. Aggregation scans always
/// run as a single partition and reject a request for more.
pub async fn plan(
    engine: &dyn SearchEngine,
    request: &ScanRequest,
    requested_partitions: Option<usize>,
) -> Result<PartitionPlan> {
    if request.scroll_size == 0 {
        return Err(ScanError::InvalidRequest("scroll size must be positive".into()));
    }

    let partition_count = match (request.response_type, requested_partitions) {
        (_, Some(0)) => {
            return Err(ScanError::InvalidRequest(
                "requested partition count must be positive".into(),
            ));
        }
        (ResponseType::Aggregation, Some(requested)) if requested > 1 => {
            return Err(ScanError::InvalidRequest(format!(
                "aggregation scans run as a single partition, {} were requested",
                requested
            )));
        }
        (ResponseType::Aggregation, _) => 1,
        (ResponseType::Hits, Some(requested)) => requested,
        (ResponseType::Hits, None) => {
            let doc_count = engine
                .count(&request.index, request.query_clause())
                .await?;
            let partitions = partition_count_for(doc_count, request.scroll_size);
            info!(
                "Scan of '{}' matches {} documents, creating {} partitions of up to {}",
                request.index, doc_count, partitions, request.scroll_size
            );
            partitions
        }
    };

    Ok(PartitionPlan {
        partition_count,
        scroll_size: request.scroll_size,
    })
}
