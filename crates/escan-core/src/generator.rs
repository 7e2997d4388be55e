//! Scroll-slice generation: one deferred unit of work per partition.
//!
//! Building the units performs no I/O. Each [`DeferredUnit`] only talks to
//! the engine when [`DeferredUnit::execute`] is awaited, so a scheduler can
//! place the units before any of them runs.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::SearchEngine;
use crate::error::Result;
use crate::model::{
    Document, PartitionPlan, PartitionResult, ResponseType, ScanRequest, ScrollCursor,
    SliceDescriptor,
};
use crate::planner;

/// A constructed, not yet executed fetch of one partition.
///
/// Units share nothing mutable: each execution opens its own scroll and
/// builds its own result, so a unit can be executed again from scratch.
#[derive(Clone)]
pub struct DeferredUnit {
    engine: Arc<dyn SearchEngine>,
    request: Arc<ScanRequest>,
    slice: SliceDescriptor,
    scroll_size: usize,
}

impl fmt::Debug for DeferredUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredUnit")
            .field("index", &self.request.index)
            .field("slice", &self.slice)
            .field("scroll_size", &self.scroll_size)
            .field("response_type", &self.request.response_type)
            .finish()
    }
}

impl DeferredUnit {
    pub fn slice(&self) -> SliceDescriptor {
        self.slice
    }

    pub fn partition_index(&self) -> usize {
        self.slice.partition_index
    }

    pub fn request(&self) -> &ScanRequest {
        &self.request
    }

    pub fn scroll_size(&self) -> usize {
        self.scroll_size
    }

    /// Fetch the whole partition.
    ///
    /// Either every document of the slice is returned or the unit fails;
    /// a failure after the scroll was opened is reported as
    /// [`crate::ScanError::Scroll`].
    pub async fn execute(&self) -> Result<PartitionResult> {
        let documents = match self.request.response_type {
            ResponseType::Hits => self.drain_slice().await?,
            ResponseType::Aggregation => vec![self.fetch_aggregation().await?],
        };
        info!(
            "Scan of '{}' {} finished with {} documents",
            self.request.index,
            self.slice,
            documents.len()
        );
        Ok(PartitionResult {
            slice: self.slice,
            documents,
        })
    }

    async fn drain_slice(&self) -> Result<Vec<Document>> {
        let body = self.slice.apply(&self.request.query);
        let first = self
            .engine
            .open_scroll(
                &self.request.index,
                &body,
                self.scroll_size,
                self.request.keep_alive,
            )
            .await?;
        debug!(
            "Opened scroll on '{}' {}: {} documents",
            self.request.index,
            self.slice,
            first.documents.len()
        );

        let mut cursor = first.cursor;
        let mut documents = first.documents;
        let drained = if documents.is_empty() {
            Ok(())
        } else {
            self.drain_remaining(&mut cursor, &mut documents).await
        };

        self.release(&cursor).await;

        match drained {
            Ok(()) => Ok(documents),
            Err(e) => Err(e.into_scroll(self.slice)),
        }
    }

    /// Pull batches until the engine answers with an empty one.
    async fn drain_remaining(
        &self,
        cursor: &mut ScrollCursor,
        documents: &mut Vec<Document>,
    ) -> Result<()> {
        loop {
            let batch = self
                .engine
                .continue_scroll(cursor, self.request.keep_alive)
                .await?;
            *cursor = batch.cursor;
            if batch.documents.is_empty() {
                return Ok(());
            }
            debug!(
                "Scroll on '{}' {}: {} more documents",
                self.request.index,
                self.slice,
                batch.documents.len()
            );
            documents.extend(batch.documents);
        }
    }

    async fn release(&self, cursor: &ScrollCursor) {
        if let Err(e) = self.engine.clear_scroll(cursor).await {
            warn!(
                "Failed to clear scroll for '{}' {}, leaving it to expire: {}",
                self.request.index, self.slice, e
            );
        }
    }

    async fn fetch_aggregation(&self) -> Result<Document> {
        let aggregation = self
            .engine
            .aggregate(&self.request.index, &self.request.query)
            .await?;
        Ok(Document::new(
            self.request.index.clone(),
            json!({
                "index": self.request.index,
                "aggregation": aggregation,
            }),
        ))
    }
}

/// Build one unit per partition of `plan`, in partition order.
pub fn generate(
    engine: Arc<dyn SearchEngine>,
    request: Arc<ScanRequest>,
    plan: &PartitionPlan,
) -> Vec<DeferredUnit> {
    plan.slices()
        .map(|slice| DeferredUnit {
            engine: Arc::clone(&engine),
            request: Arc::clone(&request),
            slice,
            scroll_size: plan.scroll_size,
        })
        .collect()
}

/// Plan a scan of `request.index` and return its deferred units.
///
/// Fails before creating any unit when the request is invalid or planning
/// fails. The returned units have not touched the engine.
pub async fn scan_index(
    engine: Arc<dyn SearchEngine>,
    request: ScanRequest,
    requested_partitions: Option<usize>,
) -> Result<Vec<DeferredUnit>> {
    request.validate()?;
    let plan = planner::plan(engine.as_ref(), &request, requested_partitions).await?;
    let units = generate(engine, Arc::new(request), &plan);
    info!("Generated {} deferred scan units", units.len());
    Ok(units)
}
