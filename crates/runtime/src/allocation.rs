//! Result of a single placement decision.

use std::collections::{BTreeMap, BTreeSet};

use manet_topology::snapshot::NodeId;
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Pairs `(source task, destination node)`.
    pub connections: Vec<(TaskId, NodeId)>,
    /// Number of candidate allocations evaluated by the placer.
    pub eval_count: Option<u64>,
    pub reliability: Option<f64>,
    /// Average number of sources sending to one destination node.
    pub contention: Option<f64>,
    /// Fraction of connections which stay on the source node.
    pub locality_index: Option<f64>,
    /// Ratio of the smallest to the largest number of sources per destination node.
    pub balance_index: Option<f64>,
    /// Fraction of alive nodes which got a destination task.
    pub cluster_utilization: Option<f64>,
}

impl AllocationResult {
    /// Allocation without destinations, used for the last phase.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates allocation and computes its metrics.
    pub fn from_connections(connections: Vec<(TaskId, NodeId)>, sources: &[&Task], node_count: usize) -> Self {
        if connections.is_empty() {
            return Self::empty();
        }
        let src_nodes = sources
            .iter()
            .map(|task| (task.id(), task.node()))
            .collect::<BTreeMap<_, _>>();
        let mut in_degree: BTreeMap<NodeId, BTreeSet<TaskId>> = BTreeMap::new();
        let mut local = 0;
        for &(task, node) in connections.iter() {
            in_degree.entry(node).or_default().insert(task);
            if src_nodes.get(&task) == Some(&node) {
                local += 1;
            }
        }
        let degrees = in_degree.values().map(|tasks| tasks.len()).collect::<Vec<_>>();
        let max_degree = degrees.iter().copied().max().unwrap_or(0);
        let min_degree = degrees.iter().copied().min().unwrap_or(0);

        AllocationResult {
            eval_count: None,
            reliability: None,
            contention: Some(degrees.iter().sum::<usize>() as f64 / degrees.len() as f64),
            locality_index: Some(local as f64 / connections.len() as f64),
            balance_index: Some(if max_degree == 0 {
                0.
            } else {
                min_degree as f64 / max_degree as f64
            }),
            cluster_utilization: Some(if node_count == 0 {
                0.
            } else {
                in_degree.len() as f64 / node_count as f64
            }),
            connections,
        }
    }

    /// Distinct destination nodes in ascending order.
    pub fn dst_nodes(&self) -> Vec<NodeId> {
        self.connections
            .iter()
            .map(|&(_, node)| node)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
