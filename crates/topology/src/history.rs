//! Node failure-rate statistics gathered from a trace.

use std::collections::BTreeMap;

use crate::{snapshot::NodeId, trace::Trace};

/// Source of per-node failure statistics.
pub trait HistoryStat: Send + Sync {
    /// Fraction of observed snapshot transitions up to `time` in which `node` departed.
    fn failure_rate(&self, node: NodeId, time: u64) -> f64;
}

/// [HistoryStat] which counts departures between consecutive snapshots of a trace.
pub struct DepartureHistory {
    transition_times: Vec<u64>,
    departures: BTreeMap<NodeId, Vec<u64>>,
}

impl DepartureHistory {
    pub fn from_trace(trace: &Trace) -> Self {
        let mut transition_times = Vec::new();
        let mut departures: BTreeMap<NodeId, Vec<u64>> = BTreeMap::new();
        for pair in trace.snapshots().windows(2) {
            let (before, after) = (&pair[0], &pair[1]);
            transition_times.push(after.time);
            for &node in before.nodes.difference(&after.nodes) {
                departures.entry(node).or_default().push(after.time);
            }
        }
        DepartureHistory {
            transition_times,
            departures,
        }
    }
}

impl HistoryStat for DepartureHistory {
    fn failure_rate(&self, node: NodeId, time: u64) -> f64 {
        let transitions = self.transition_times.partition_point(|&t| t <= time);
        if transitions == 0 {
            return 0.;
        }
        let departures = self
            .departures
            .get(&node)
            .map(|times| times.partition_point(|&t| t <= time))
            .unwrap_or(0);
        departures as f64 / transitions as f64
    }
}
