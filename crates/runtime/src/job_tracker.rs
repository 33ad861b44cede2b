//! Phase sequencing and the unit-time engine of a job.

use std::collections::{BTreeSet, VecDeque};

use log::{debug, warn};
use manet_topology::{
    history::HistoryStat,
    remap::NodeIdRemap,
    routable::RoutableSnapshot,
    snapshot::{NodeId, Snapshot},
    trace::Trace,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    allocation::AllocationResult,
    error::SimulationError,
    placement::Placer,
    placers::common::{shuffle, trace_seed},
    profile::{CommType, JobProfile, PhaseProfile, PhaseType},
    task::{Task, TaskId, TaskIdGenerator, TaskTable},
    task_phase::TaskPhase,
};

/// Tolerance of the alive fraction comparison.
pub const ALIVE_EPSILON: f64 = 1e-9;

/// Whether `a < b` by more than [ALIVE_EPSILON].
fn definitely_less(a: f64, b: f64) -> bool {
    a < b - ALIVE_EPSILON
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerMode {
    /// Runs all phases of a job and places each of them.
    FullJob,
    /// Runs one phase with an allocation fixed in advance.
    SinglePhase,
}

pub struct JobTracker {
    mode: TrackerMode,
    job: JobProfile,
    tasks: TaskTable,
    input_tasks: BTreeSet<TaskId>,
    phase: Option<TaskPhase>,
    queue: VecDeque<PhaseProfile>,
    throughput_sum: f64,
    bandwidth_utilization_sum: f64,
    comm_duration: u64,
    replicate_duration: u64,
    shuffle_duration: u64,
    total_failed: BTreeSet<TaskId>,
    allocations: Vec<AllocationResult>,
    reliability: Option<f64>,
    contention: Option<f64>,
}

impl JobTracker {
    /// Creates tracker for a whole job. Input tasks are placed by [place_input_tasks](JobTracker::place_input_tasks)
    /// and the first phase by [allocate_next_tasks](JobTracker::allocate_next_tasks).
    pub fn new(job: JobProfile) -> Self {
        let queue = job.phases.iter().copied().collect();
        JobTracker {
            mode: TrackerMode::FullJob,
            job,
            tasks: TaskTable::new(),
            input_tasks: BTreeSet::new(),
            phase: None,
            queue,
            throughput_sum: 0.,
            bandwidth_utilization_sum: 0.,
            comm_duration: 0,
            replicate_duration: 0,
            shuffle_duration: 0,
            total_failed: BTreeSet::new(),
            allocations: Vec::new(),
            reliability: None,
            contention: None,
        }
    }

    /// Creates tracker which runs a single already placed phase.
    pub fn pre_seeded(
        phase: PhaseProfile,
        next_phase: Option<PhaseProfile>,
        sources: Vec<Task>,
        allocation: AllocationResult,
        ids: &mut TaskIdGenerator,
    ) -> Result<Self, SimulationError> {
        let input_size = sources.iter().map(|task| task.target_size()).sum();
        let mut tracker = Self::new(JobProfile::new(
            input_size,
            std::iter::once(phase).chain(next_phase).collect(),
        ));
        tracker.mode = TrackerMode::SinglePhase;
        tracker.queue.clear();

        let src = sources.iter().map(|task| task.id()).collect::<BTreeSet<_>>();
        for task in sources.into_iter() {
            tracker.tasks.insert(task);
        }
        tracker.input_tasks = src.clone();
        let task_phase = TaskPhase::new(
            phase,
            next_phase.as_ref(),
            src,
            &allocation.connections,
            &mut tracker.tasks,
            ids,
        )?;
        task_phase.start(&mut tracker.tasks)?;
        tracker.phase = Some(task_phase);
        tracker.allocations.push(allocation);
        Ok(tracker)
    }

    /// Places job input on randomly chosen nodes of `snapshot`, seeded by the trace id.
    ///
    /// Each input task gets `input_size / node_count` of data.
    pub fn place_input_tasks(&mut self, trace_id: &str, snapshot: &Snapshot, ids: &mut TaskIdGenerator) {
        let mut nodes = snapshot.nodes.iter().copied().collect::<Vec<_>>();
        if nodes.is_empty() {
            warn!("no nodes to place input of trace {} on", trace_id);
            return;
        }
        let mut rng = Pcg64::seed_from_u64(trace_seed(trace_id));
        let count = rng.gen_range(1..=nodes.len());
        let size = self.job.input_size / nodes.len() as f64;
        shuffle(&mut rng, &mut nodes);
        for &node in nodes.iter().take(count) {
            let task = Task::input(ids.next_id(), node, size);
            debug!("[{}] input task {} with size {:.3} placed on node {}", snapshot.time, task.id(), size, node);
            self.input_tasks.insert(task.id());
            self.tasks.insert(task);
        }
    }

    /// Adds an input task placed by the caller.
    pub fn add_input_task(&mut self, task: Task) {
        self.input_tasks.insert(task.id());
        self.tasks.insert(task);
    }

    /// Starts the next phase: its sources are the previous phase destinations (or input tasks for the first phase)
    /// and its destinations are chosen by `placer` unless it is the last phase.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate_next_tasks(
        &mut self,
        trace_id: &str,
        placer: &mut dyn Placer,
        trace: &Trace,
        topology: &RoutableSnapshot,
        time: u64,
        history: &dyn HistoryStat,
        ids: &mut TaskIdGenerator,
    ) -> Result<(), SimulationError> {
        if self.mode == TrackerMode::SinglePhase {
            warn!("[{}] single phase tracker can't allocate further phases", time);
            return Ok(());
        }
        let src = match &self.phase {
            None => self.input_tasks.clone(),
            Some(phase) => phase.dst().clone(),
        };
        let Some(profile) = self.queue.pop_front() else {
            warn!("[{}] no phases left to allocate", time);
            return Ok(());
        };
        let next_profile = self.queue.front().copied();

        let allocation = match &next_profile {
            Some(next_profile) => {
                let sources = src
                    .iter()
                    .map(|&id| self.tasks.get(id))
                    .collect::<Result<Vec<_>, _>>()?;
                let remap = NodeIdRemap::from_snapshot(topology.snapshot());
                let allocation = placer.allocate_tasks(
                    trace_id,
                    &self.job,
                    &profile,
                    next_profile,
                    trace,
                    topology,
                    time,
                    &sources,
                    history,
                    &remap,
                );
                debug!(
                    "[{}] {} placed {} phase on nodes {:?}",
                    time,
                    placer.name(),
                    profile.phase_type.name(),
                    allocation.dst_nodes()
                );
                Some(allocation)
            }
            None => None,
        };

        if profile.phase_type == PhaseType::Map {
            if let Some(allocation) = &allocation {
                self.reliability = allocation.reliability;
                self.contention = allocation.contention;
            }
        }

        let connections = allocation
            .as_ref()
            .map(|allocation| allocation.connections.as_slice())
            .unwrap_or(&[]);
        let phase = TaskPhase::new(
            profile,
            next_profile.as_ref(),
            src,
            connections,
            &mut self.tasks,
            ids,
        )?;
        phase.start(&mut self.tasks)?;
        debug!(
            "[{}] started {} phase with {} sources and {} destinations",
            time,
            profile.phase_type.name(),
            phase.src().len(),
            phase.dst().len()
        );
        self.phase = Some(phase);
        self.allocations.extend(allocation);
        Ok(())
    }

    /// Simulates one unit of time of the current phase.
    ///
    /// While sources still process their input only processing happens, afterwards the network moves queued data.
    /// Destination tasks take delivered data in both cases.
    pub fn update_by_unit_time(&mut self, topology: &mut RoutableSnapshot, time: u64) -> Result<(), SimulationError> {
        let Some(phase) = &self.phase else {
            return Ok(());
        };

        if !phase.is_processing_finished(&self.tasks)? {
            for &id in phase.src().iter() {
                let task = self.tasks.get_mut(id)?;
                task.process_by_unit_time(topology)?;
                if task.pending_input() == 0. {
                    task.mark_proc_finished();
                }
            }
        } else if !phase.is_last() {
            let comm_type = phase.profile().comm_type;
            let (throughput, transmitters) = topology.send_by_unit_time();
            let capacity = topology.node_count() as f64 * topology.link_bandwidth();
            self.record_transfer(throughput, transmitters, capacity, comm_type)?;
        }

        let Some(phase) = &self.phase else {
            return Ok(());
        };
        let phase_type = phase.profile().phase_type;
        for &id in phase.dst().iter() {
            self.tasks.get_mut(id)?.on_receive(topology, phase_type, time);
        }
        Ok(())
    }

    /// Accounts one unit of time of network transfer. `capacity` is the amount the whole network could move.
    ///
    /// Data moved without any transmitting node is rejected before any counter changes.
    pub fn record_transfer(
        &mut self,
        throughput: f64,
        transmitters: usize,
        capacity: f64,
        comm_type: CommType,
    ) -> Result<(), SimulationError> {
        if throughput > 0. && transmitters == 0 {
            return Err(SimulationError::ThroughputWithoutTransmitters { throughput });
        }
        self.throughput_sum += throughput;
        if capacity > 0. {
            self.bandwidth_utilization_sum += throughput / capacity;
        }
        self.comm_duration += 1;
        match comm_type {
            CommType::Replicate => self.replicate_duration += 1,
            CommType::Shuffle => self.shuffle_duration += 1,
            CommType::None => {}
        }
        Ok(())
    }

    /// Moves tasks hosted on departed nodes to the failed set and drops edges to them.
    pub fn update_task_departures(&mut self, departed: &[NodeId]) -> Result<(), SimulationError> {
        if departed.is_empty() {
            return Ok(());
        }
        let Some(phase) = &mut self.phase else {
            return Ok(());
        };
        let departed = departed.iter().copied().collect::<BTreeSet<_>>();

        for id in phase.src().clone() {
            let task = self.tasks.get_mut(id)?;
            if departed.contains(&task.node()) {
                phase.fail_src(id);
                self.total_failed.insert(id);
            }
            task.prune_dst_tasks(&departed);
        }
        for id in phase.dst().clone() {
            if departed.contains(&self.tasks.get(id)?.node()) {
                phase.fail_dst(id);
                self.total_failed.insert(id);
            }
        }
        debug!(
            "nodes {:?} departed, {} tasks of {} phase failed",
            departed,
            phase.failed().len(),
            phase.profile().phase_type.name()
        );
        Ok(())
    }

    /// Whether the current phase lost any task, or has no tasks to run.
    pub fn is_cur_task_phase_failed(&self) -> bool {
        let Some(phase) = &self.phase else {
            return false;
        };
        let src = phase.src().len();
        let dst = phase.dst().len();
        if src == 0 || (!phase.is_last() && dst == 0) {
            return true;
        }
        let alive = (src + dst) as f64 / (src + dst + phase.failed().len()) as f64;
        definitely_less(alive, 1.)
    }

    pub fn is_cur_task_phase_finished(&self, topology: &RoutableSnapshot) -> Result<bool, SimulationError> {
        match &self.phase {
            Some(phase) => phase.is_finished(&self.tasks, topology),
            None => Ok(false),
        }
    }

    /// Whether no phases are left and the current one is finished.
    pub fn is_job_finished(&self, topology: &RoutableSnapshot) -> Result<bool, SimulationError> {
        Ok(self.queue.is_empty() && self.is_cur_task_phase_finished(topology)?)
    }

    pub fn mode(&self) -> TrackerMode {
        self.mode
    }

    pub fn job(&self) -> &JobProfile {
        &self.job
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn current_phase(&self) -> Option<&TaskPhase> {
        self.phase.as_ref()
    }

    /// Phase type of the current phase, or of the first phase if none started yet.
    pub fn current_phase_type(&self) -> Option<PhaseType> {
        self.phase
            .as_ref()
            .map(|phase| phase.profile().phase_type)
            .or_else(|| self.job.phases.first().map(|profile| profile.phase_type))
    }

    pub fn input_tasks(&self) -> &BTreeSet<TaskId> {
        &self.input_tasks
    }

    pub fn remaining_phases(&self) -> usize {
        self.queue.len()
    }

    /// Amount of data moved by the network so far.
    pub fn throughput_sum(&self) -> f64 {
        self.throughput_sum
    }

    pub fn bandwidth_utilization_sum(&self) -> f64 {
        self.bandwidth_utilization_sum
    }

    pub fn comm_duration(&self) -> u64 {
        self.comm_duration
    }

    pub fn replicate_duration(&self) -> u64 {
        self.replicate_duration
    }

    pub fn shuffle_duration(&self) -> u64 {
        self.shuffle_duration
    }

    /// Tasks failed in any phase so far.
    pub fn total_failed(&self) -> &BTreeSet<TaskId> {
        &self.total_failed
    }

    /// Allocations made by the placer, in phase order.
    pub fn allocations(&self) -> &[AllocationResult] {
        &self.allocations
    }

    /// Reliability reported by the placer for the map to reduce transition.
    pub fn reliability(&self) -> Option<f64> {
        self.reliability
    }

    pub fn contention(&self) -> Option<f64> {
        self.contention
    }

    /// Output accumulated by the sources of the current phase.
    pub fn output_size(&self) -> f64 {
        self.phase
            .as_ref()
            .map(|phase| {
                phase
                    .src()
                    .iter()
                    .filter_map(|&id| self.tasks.get(id).ok())
                    .map(|task| task.output_buffer())
                    .sum()
            })
            .unwrap_or(0.)
    }
}
