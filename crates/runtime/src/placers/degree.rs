use std::cmp::Reverse;

use manet_topology::{history::HistoryStat, remap::NodeIdRemap, routable::RoutableSnapshot, trace::Trace};

use crate::{
    allocation::AllocationResult,
    placement::Placer,
    placers::common::connect_all,
    profile::{JobProfile, PhaseProfile},
    task::Task,
};

/// Sends outputs to the `dst_count` best connected nodes, ties broken by smaller id.
pub struct DegreePlacer {
    dst_count: usize,
}

impl DegreePlacer {
    pub const DEFAULT_DST_COUNT: usize = 3;

    pub fn new(dst_count: usize) -> Self {
        Self { dst_count }
    }
}

impl Placer for DegreePlacer {
    fn name(&self) -> &str {
        "Degree"
    }

    fn allocate_tasks(
        &mut self,
        _trace_id: &str,
        _job: &JobProfile,
        phase: &PhaseProfile,
        _next_phase: &PhaseProfile,
        _trace: &Trace,
        topology: &RoutableSnapshot,
        _time: u64,
        sources: &[&Task],
        _history: &dyn HistoryStat,
        _remap: &NodeIdRemap,
    ) -> AllocationResult {
        let snapshot = topology.snapshot();
        let mut nodes = snapshot.nodes.iter().copied().collect::<Vec<_>>();
        nodes.sort_by_key(|&node| (Reverse(snapshot.degree(node)), node));
        nodes.truncate(self.dst_count);
        nodes.sort_unstable();
        AllocationResult::from_connections(
            connect_all(sources, &nodes, phase.comm_type),
            sources,
            topology.node_count(),
        )
    }
}
