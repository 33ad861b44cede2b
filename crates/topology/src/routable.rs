//! Live topology with per-node transmission state.
//!
//! Data is moved hop by hop along shortest paths of the current topology. Every node can send at most
//! `link_bandwidth` per unit time in total, which makes `node_count * link_bandwidth` the upper bound of the
//! throughput of a single tick.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;

use crate::snapshot::{bfs, NodeId, Snapshot};

/// Id of a task which sends or receives data.
pub type TaskId = u64;

/// Amounts below this value are treated as zero.
pub const PENDING_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FlowKey {
    at: NodeId,
    dst_node: NodeId,
    dst_task: TaskId,
}

/// First and last time a node received data during one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CommRecord {
    pub started: u64,
    pub finished: u64,
}

#[derive(Clone, Debug)]
pub struct RoutableSnapshot {
    snapshot: Snapshot,
    adjacency: BTreeMap<NodeId, Vec<NodeId>>,
    link_bandwidth: f64,
    in_flight: BTreeMap<FlowKey, f64>,
    loopback: BTreeMap<(NodeId, TaskId), f64>,
    completed: BTreeMap<(NodeId, TaskId), f64>,
    comm: BTreeMap<NodeId, BTreeMap<&'static str, CommRecord>>,
}

impl RoutableSnapshot {
    pub fn new(snapshot: Snapshot, link_bandwidth: f64) -> Self {
        let adjacency = snapshot.adjacency();
        RoutableSnapshot {
            snapshot,
            adjacency,
            link_bandwidth,
            in_flight: BTreeMap::new(),
            loopback: BTreeMap::new(),
            completed: BTreeMap::new(),
            comm: BTreeMap::new(),
        }
    }

    /// Current topology.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn node_count(&self) -> usize {
        self.snapshot.node_count()
    }

    /// Maximum amount of data a node can send per unit time.
    pub fn link_bandwidth(&self) -> f64 {
        self.link_bandwidth
    }

    /// Replaces current topology and returns ids of nodes which disappeared.
    ///
    /// Data held at or addressed to a departed node is lost.
    pub fn update_topology(&mut self, new_snapshot: &Snapshot) -> Vec<NodeId> {
        let departed = self
            .snapshot
            .nodes
            .difference(&new_snapshot.nodes)
            .copied()
            .collect::<Vec<_>>();
        self.snapshot = new_snapshot.clone();
        self.adjacency = self.snapshot.adjacency();

        if !departed.is_empty() {
            let departed_set = departed.iter().copied().collect::<BTreeSet<_>>();
            let mut lost = 0.;
            self.in_flight.retain(|key, size| {
                let keep = !departed_set.contains(&key.at) && !departed_set.contains(&key.dst_node);
                if !keep {
                    lost += *size;
                }
                keep
            });
            self.loopback.retain(|(node, _), _| !departed_set.contains(node));
            self.completed.retain(|(node, _), _| !departed_set.contains(node));
            debug!(
                "[{}] nodes {:?} departed, {:.3} of in-flight data lost",
                self.snapshot.time, departed, lost
            );
        }
        departed
    }

    /// Queues `size` of data from `src_task` on `src_node` to `dst_task` on `dst_node`.
    ///
    /// Data sent to the same node skips the network and becomes available through
    /// [take_loopback_data](RoutableSnapshot::take_loopback_data).
    pub fn queue_packets(&mut self, src_node: NodeId, dst_node: NodeId, src_task: TaskId, dst_task: TaskId, size: f64) {
        if size <= 0. {
            return;
        }
        if src_node == dst_node {
            *self.loopback.entry((dst_node, dst_task)).or_default() += size;
            return;
        }
        debug!(
            "queued {:.3} from task {} on node {} to task {} on node {}",
            size, src_task, src_node, dst_task, dst_node
        );
        *self
            .in_flight
            .entry(FlowKey {
                at: src_node,
                dst_node,
                dst_task,
            })
            .or_default() += size;
    }

    /// Moves in-flight data by at most one hop. Returns amount of data moved and number of nodes that sent anything.
    pub fn send_by_unit_time(&mut self) -> (f64, usize) {
        let mut distances_to: BTreeMap<NodeId, BTreeMap<NodeId, usize>> = BTreeMap::new();
        let mut capacity: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut moves: Vec<(FlowKey, NodeId, f64)> = Vec::new();

        for (&key, &size) in self.in_flight.iter() {
            let distances = distances_to
                .entry(key.dst_node)
                .or_insert_with(|| bfs(&self.adjacency, key.dst_node));
            let Some(&distance) = distances.get(&key.at) else {
                continue;
            };
            if distance == 0 {
                moves.push((key, key.dst_node, size));
                continue;
            }
            let next_hop = self.adjacency[&key.at]
                .iter()
                .copied()
                .find(|next| distances.get(next) == Some(&(distance - 1)));
            let Some(next_hop) = next_hop else {
                continue;
            };
            let left = capacity.entry(key.at).or_insert(self.link_bandwidth);
            let mut sent = size.min(*left);
            if sent <= 0. {
                continue;
            }
            if size - sent <= PENDING_EPSILON {
                sent = size;
            }
            *left -= sent;
            moves.push((key, next_hop, sent));
        }

        let mut throughput = 0.;
        let mut transmitters = BTreeSet::new();
        for (key, next_hop, sent) in moves.into_iter() {
            throughput += sent;
            transmitters.insert(key.at);
            let remaining = self.in_flight.get_mut(&key).map(|size| {
                *size -= sent;
                *size
            });
            if remaining.is_some_and(|size| size <= PENDING_EPSILON) {
                self.in_flight.remove(&key);
            }
            if next_hop == key.dst_node {
                *self.completed.entry((key.dst_node, key.dst_task)).or_default() += sent;
            } else {
                *self
                    .in_flight
                    .entry(FlowKey {
                        at: next_hop,
                        ..key
                    })
                    .or_default() += sent;
            }
        }
        (throughput, transmitters.len())
    }

    /// Takes all data sent to a task from its own node.
    pub fn take_loopback_data(&mut self, node: NodeId, task: TaskId) -> f64 {
        self.loopback.remove(&(node, task)).unwrap_or(0.)
    }

    /// Takes all data delivered to a task over the network.
    pub fn take_completed_data(&mut self, node: NodeId, task: TaskId) -> f64 {
        self.completed.remove(&(node, task)).unwrap_or(0.)
    }

    /// Whether any data is still travelling through the network.
    pub fn any_pending_packets(&self) -> bool {
        self.in_flight.values().any(|&size| size > PENDING_EPSILON)
    }

    /// Total amount of in-flight data.
    pub fn pending_size(&self) -> f64 {
        self.in_flight.values().sum()
    }

    /// Marks the start of communication for a node in a phase. Only the first mark is kept.
    pub fn mark_comm_started(&mut self, node: NodeId, phase: &'static str, time: u64) {
        self.comm.entry(node).or_default().entry(phase).or_insert(CommRecord {
            started: time,
            finished: time,
        });
    }

    /// Marks the end of communication for a node in a phase. The latest mark is kept.
    pub fn mark_comm_finished(&mut self, node: NodeId, phase: &'static str, time: u64) {
        let record = self.comm.entry(node).or_default().entry(phase).or_insert(CommRecord {
            started: time,
            finished: time,
        });
        record.finished = record.finished.max(time);
    }

    /// Communication records of a node keyed by phase name.
    pub fn comm_records(&self, node: NodeId) -> Option<&BTreeMap<&'static str, CommRecord>> {
        self.comm.get(&node)
    }

    /// Total communication duration per alive node over all phases, both ends inclusive.
    pub fn comm_durations(&self) -> BTreeMap<NodeId, u64> {
        self.comm
            .iter()
            .filter(|(node, _)| self.snapshot.has_node(**node))
            .map(|(&node, records)| {
                (
                    node,
                    records
                        .values()
                        .map(|record| record.finished - record.started + 1)
                        .sum(),
                )
            })
            .collect()
    }
}
