//! Dense renumbering of node ids.

use std::collections::BTreeMap;

use crate::snapshot::{NodeId, Snapshot};

/// Maps node ids of a snapshot to `0..n` in ascending id order and back.
#[derive(Clone, Debug, Default)]
pub struct NodeIdRemap {
    dense: BTreeMap<NodeId, usize>,
    nodes: Vec<NodeId>,
}

impl NodeIdRemap {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let nodes = snapshot.nodes.iter().copied().collect::<Vec<_>>();
        let dense = nodes.iter().enumerate().map(|(i, &node)| (node, i)).collect();
        NodeIdRemap { dense, nodes }
    }

    pub fn to_dense(&self, node: NodeId) -> Option<usize> {
        self.dense.get(&node).copied()
    }

    pub fn to_node(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
