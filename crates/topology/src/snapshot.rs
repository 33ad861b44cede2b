//! Network topology at a single moment of a trace.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Id of a mobile node.
pub type NodeId = u32;

/// Set of alive nodes and undirected links between them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Trace time of the snapshot.
    pub time: u64,
    /// Alive nodes.
    #[serde(default)]
    pub nodes: BTreeSet<NodeId>,
    /// Links, always stored as `(min, max)`.
    #[serde(default)]
    pub links: BTreeSet<(NodeId, NodeId)>,
}

impl Snapshot {
    /// Creates empty snapshot.
    pub fn new(time: u64) -> Self {
        Snapshot {
            time,
            nodes: BTreeSet::new(),
            links: BTreeSet::new(),
        }
    }

    /// Adds node without links.
    pub fn add_node(&mut self, node: NodeId) {
        self.nodes.insert(node);
    }

    /// Adds undirected link, both ends are added as nodes. Self-loops are ignored.
    pub fn add_link(&mut self, a: NodeId, b: NodeId) {
        self.nodes.insert(a);
        self.nodes.insert(b);
        if a != b {
            self.links.insert((a.min(b), a.max(b)));
        }
    }

    /// Whether node is alive in this snapshot.
    pub fn has_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Neighbours of a node in ascending order.
    pub fn neighbours(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = self
            .links
            .iter()
            .filter_map(|&(a, b)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();
        result.sort_unstable();
        result
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.links.iter().filter(|&&(a, b)| a == node || b == node).count()
    }

    /// Adjacency lists of all alive nodes. Neighbours are sorted.
    pub fn adjacency(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> =
            self.nodes.iter().map(|&node| (node, Vec::new())).collect();
        for &(a, b) in self.links.iter() {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        for neighbours in adjacency.values_mut() {
            neighbours.sort_unstable();
        }
        adjacency
    }

    /// Hop distance from `from` to every node reachable from it (including itself).
    pub fn hop_distances(&self, from: NodeId) -> BTreeMap<NodeId, usize> {
        bfs(&self.adjacency(), from)
    }
}

pub(crate) fn bfs(adjacency: &BTreeMap<NodeId, Vec<NodeId>>, from: NodeId) -> BTreeMap<NodeId, usize> {
    let mut distances = BTreeMap::new();
    if !adjacency.contains_key(&from) {
        return distances;
    }
    distances.insert(from, 0);
    let mut queue = VecDeque::from([from]);
    while let Some(node) = queue.pop_front() {
        let distance = distances[&node];
        for &next in adjacency[&node].iter() {
            if !distances.contains_key(&next) {
                distances.insert(next, distance + 1);
                queue.push_back(next);
            }
        }
    }
    distances
}
