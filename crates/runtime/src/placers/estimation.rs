//! Placer which simulates candidate allocations ahead of time and keeps the fastest one.

use log::{debug, error};
use manet_topology::{history::HistoryStat, remap::NodeIdRemap, routable::RoutableSnapshot, trace::Trace};

use crate::{
    allocation::AllocationResult,
    job_tracker::JobTracker,
    placement::Placer,
    placers::{degree::DegreePlacer, local::LocalPlacer, random::RandomPlacer},
    profile::{JobProfile, PhaseProfile},
    runner::{Clock, EstTraceRunner},
    task::{Task, TaskIdGenerator},
};

pub struct EstimationPlacer {
    seed: u64,
    dst_count: usize,
    random_candidates: usize,
    horizon: u64,
    speedup: u64,
}

impl EstimationPlacer {
    pub const DEFAULT_DST_COUNT: usize = 3;
    pub const DEFAULT_RANDOM_CANDIDATES: usize = 4;
    pub const DEFAULT_HORIZON: u64 = 1000;
    pub const DEFAULT_SPEEDUP: u64 = 1;

    pub fn new(seed: u64, dst_count: usize, random_candidates: usize, horizon: u64, speedup: u64) -> Self {
        Self {
            seed,
            dst_count,
            random_candidates,
            horizon,
            speedup,
        }
    }

    /// Simulates `phase` with `allocation` and returns its completion time, `None` if the phase fails.
    #[allow(clippy::too_many_arguments)]
    fn estimate(
        &self,
        phase: &PhaseProfile,
        next_phase: &PhaseProfile,
        trace: &Trace,
        topology: &RoutableSnapshot,
        time: u64,
        sources: &[&Task],
        allocation: &AllocationResult,
    ) -> Option<u64> {
        let first_free_id = sources.iter().map(|task| task.id() + 1).max().unwrap_or(0);
        let mut ids = TaskIdGenerator::starting_at(first_free_id);
        let tracker = match JobTracker::pre_seeded(
            *phase,
            Some(*next_phase),
            sources.iter().map(|&task| task.clone()).collect(),
            allocation.clone(),
            &mut ids,
        ) {
            Ok(tracker) => tracker,
            Err(e) => {
                error!("[{}] can't build estimation: {}", time, e);
                return None;
            }
        };
        let runner = EstTraceRunner::new(
            trace,
            topology.clone(),
            tracker,
            time,
            self.clock(),
            self.horizon,
        );
        match runner.run() {
            Ok(result) => result.completion_time(),
            Err(e) => {
                error!("[{}] estimation aborted: {}", time, e);
                None
            }
        }
    }
}

impl Placer for EstimationPlacer {
    fn name(&self) -> &str {
        "Estimation"
    }

    fn clock(&self) -> Clock {
        Clock::Estimated { speedup: self.speedup }
    }

    fn allocate_tasks(
        &mut self,
        trace_id: &str,
        job: &JobProfile,
        phase: &PhaseProfile,
        next_phase: &PhaseProfile,
        trace: &Trace,
        topology: &RoutableSnapshot,
        time: u64,
        sources: &[&Task],
        history: &dyn HistoryStat,
        remap: &NodeIdRemap,
    ) -> AllocationResult {
        let mut candidates: Vec<Box<dyn Placer>> = vec![
            Box::new(LocalPlacer::new()),
            Box::new(DegreePlacer::new(self.dst_count)),
        ];
        for i in 0..self.random_candidates {
            candidates.push(Box::new(RandomPlacer::new(
                self.seed.wrapping_add(i as u64),
                self.dst_count,
            )));
        }

        let mut best: Option<(u64, AllocationResult)> = None;
        let mut evaluated = 0;
        let mut succeeded = 0;
        for candidate in candidates.iter_mut() {
            let allocation = candidate.allocate_tasks(
                trace_id, job, phase, next_phase, trace, topology, time, sources, history, remap,
            );
            evaluated += 1;
            let estimate = self.estimate(phase, next_phase, trace, topology, time, sources, &allocation);
            debug!(
                "[{}] candidate {} on {:?}: {:?}",
                time,
                candidate.name(),
                allocation.dst_nodes(),
                estimate
            );
            if let Some(completion_time) = estimate {
                succeeded += 1;
                if best.as_ref().map_or(true, |(best_time, _)| completion_time < *best_time) {
                    best = Some((completion_time, allocation));
                }
            }
        }

        let mut result = match best {
            Some((_, allocation)) => allocation,
            None => {
                let mut fallback = DegreePlacer::new(self.dst_count);
                fallback.allocate_tasks(
                    trace_id, job, phase, next_phase, trace, topology, time, sources, history, remap,
                )
            }
        };
        result.eval_count = Some(evaluated);
        result.reliability = Some(succeeded as f64 / evaluated as f64);
        result
    }
}
