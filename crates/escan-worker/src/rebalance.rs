//! Placement of planned units onto execution nodes.

use escan_core::DeferredUnit;
use tracing::debug;

use crate::error::RunnerError;

/// The units one node is responsible for.
#[derive(Debug, Clone)]
pub struct NodeAssignment {
    pub node: String,
    pub units: Vec<DeferredUnit>,
}

impl NodeAssignment {
    pub fn partition_indices(&self) -> Vec<usize> {
        self.units.iter().map(DeferredUnit::partition_index).collect()
    }
}

/// Spread `units` over `nodes` round-robin by partition index.
///
/// Units that were already assigned can be passed again (flattened) to move
/// them onto a different set of nodes; none of them has run yet, so moving
/// them costs nothing. Every node gets an entry, even when it receives no
/// unit.
pub fn rebalance(
    units: impl IntoIterator<Item = DeferredUnit>,
    nodes: &[String],
) -> Result<Vec<NodeAssignment>, RunnerError> {
    if nodes.is_empty() {
        return Err(RunnerError::NoNodes);
    }

    let mut units: Vec<DeferredUnit> = units.into_iter().collect();
    units.sort_by_key(DeferredUnit::partition_index);

    let mut assignments: Vec<NodeAssignment> = nodes
        .iter()
        .map(|node| NodeAssignment {
            node: node.clone(),
            units: Vec::new(),
        })
        .collect();
    for (position, unit) in units.into_iter().enumerate() {
        assignments[position % nodes.len()].units.push(unit);
    }

    for assignment in &assignments {
        debug!(
            "Node '{}' assigned partitions {:?}",
            assignment.node,
            assignment.partition_indices()
        );
    }
    Ok(assignments)
}
