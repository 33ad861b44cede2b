use log::debug;
use manet_topology::{history::HistoryStat, remap::NodeIdRemap, routable::RoutableSnapshot, trace::Trace};
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::{
    allocation::AllocationResult,
    placement::Placer,
    placers::common::{connect_all, shuffle, trace_seed},
    profile::{JobProfile, PhaseProfile},
    task::Task,
};

/// Sends outputs to `dst_count` nodes picked uniformly at random.
pub struct RandomPlacer {
    seed: u64,
    dst_count: usize,
}

impl RandomPlacer {
    pub const DEFAULT_DST_COUNT: usize = 3;

    pub fn new(seed: u64, dst_count: usize) -> Self {
        Self { seed, dst_count }
    }
}

impl Placer for RandomPlacer {
    fn name(&self) -> &str {
        "Random"
    }

    fn allocate_tasks(
        &mut self,
        trace_id: &str,
        _job: &JobProfile,
        phase: &PhaseProfile,
        _next_phase: &PhaseProfile,
        _trace: &Trace,
        topology: &RoutableSnapshot,
        time: u64,
        sources: &[&Task],
        history: &dyn HistoryStat,
        remap: &NodeIdRemap,
    ) -> AllocationResult {
        let mut rng = Pcg64::seed_from_u64(self.seed ^ trace_seed(trace_id) ^ time);
        let mut indices = (0..remap.len()).collect::<Vec<_>>();
        shuffle(&mut rng, &mut indices);
        let mut dst_nodes = indices
            .into_iter()
            .take(self.dst_count)
            .filter_map(|index| remap.to_node(index))
            .collect::<Vec<_>>();
        dst_nodes.sort_unstable();

        debug!(
            "[{}] random placement for {}: {:?}, failure rates {:?}",
            time,
            phase.phase_type.name(),
            dst_nodes,
            dst_nodes
                .iter()
                .map(|&node| history.failure_rate(node, time))
                .collect::<Vec<_>>()
        );

        AllocationResult::from_connections(
            connect_all(sources, &dst_nodes, phase.comm_type),
            sources,
            topology.node_count(),
        )
    }
}
