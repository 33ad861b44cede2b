use std::collections::BTreeSet;

use manet_topology::{history::HistoryStat, remap::NodeIdRemap, routable::RoutableSnapshot, trace::Trace};

use crate::{
    allocation::AllocationResult,
    placement::Placer,
    placers::common::connect_all,
    profile::{JobProfile, PhaseProfile},
    task::Task,
};

/// Keeps the next phase on the nodes of the current sources.
pub struct LocalPlacer {}

impl LocalPlacer {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LocalPlacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Placer for LocalPlacer {
    fn name(&self) -> &str {
        "Local"
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
        let dst_nodes = sources
            .iter()
            .map(|task| task.node())
            .filter(|&node| topology.snapshot().has_node(node))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        AllocationResult::from_connections(
            connect_all(sources, &dst_nodes, phase.comm_type),
            sources,
            topology.node_count(),
        )
    }
}
