//! One phase of a job: source tasks, destination tasks and the transfer graph between them.

use std::collections::BTreeSet;

use log::warn;
use manet_topology::{routable::RoutableSnapshot, snapshot::NodeId};

use crate::{
    error::SimulationError,
    profile::PhaseProfile,
    task::{Task, TaskId, TaskIdGenerator, TaskStatus, TaskTable},
};

/// Ids of tasks taking part in one phase. Tasks themselves live in a [TaskTable].
#[derive(Clone, Debug)]
pub struct TaskPhase {
    profile: PhaseProfile,
    src: BTreeSet<TaskId>,
    dst: BTreeSet<TaskId>,
    failed: BTreeSet<TaskId>,
}

impl TaskPhase {
    /// Builds phase from source tasks and `(source task, destination node)` connections.
    ///
    /// One destination task is created per distinct destination node, each expecting an equal share of the phase
    /// output and processing it with the rate of `next_profile`. A phase without sources, or a non-terminal phase
    /// without connections, gets no destination tasks.
    pub fn new(
        profile: PhaseProfile,
        next_profile: Option<&PhaseProfile>,
        src: BTreeSet<TaskId>,
        connections: &[(TaskId, NodeId)],
        tasks: &mut TaskTable,
        ids: &mut TaskIdGenerator,
    ) -> Result<Self, SimulationError> {
        let mut phase = TaskPhase {
            profile,
            src,
            dst: BTreeSet::new(),
            failed: BTreeSet::new(),
        };
        for &id in phase.src.iter() {
            tasks.get_mut(id)?.late_bind(profile);
        }
        if phase.src.is_empty() || (!profile.is_last() && connections.is_empty()) {
            return Ok(phase);
        }

        let dst_nodes = connections
            .iter()
            .map(|&(_, node)| node)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if dst_nodes.is_empty() {
            return Ok(phase);
        }

        let output_size = phase
            .src
            .iter()
            .map(|&id| tasks.get(id).map(|task| task.target_size()))
            .sum::<Result<f64, _>>()?
            * profile.output_multiplier;
        let dst_size = output_size / dst_nodes.len() as f64;
        let rate = next_profile.map(|next| next.bandwidth);

        let mut dst_by_node = Vec::with_capacity(dst_nodes.len());
        for &node in dst_nodes.iter() {
            let task = Task::computed(ids.next_id(), node, rate, dst_size);
            dst_by_node.push((node, task.id()));
            phase.dst.insert(task.id());
            tasks.insert(task);
        }

        for &(src_task, dst_node) in connections.iter() {
            if !phase.src.contains(&src_task) {
                warn!("connection from unknown source task {} to node {} skipped", src_task, dst_node);
                continue;
            }
            let dst_task = dst_by_node
                .iter()
                .find(|(node, _)| *node == dst_node)
                .map(|&(_, id)| id)
                .ok_or(SimulationError::UnknownTask(src_task))?;
            tasks.get_mut(src_task)?.add_dst_task(dst_task, dst_node)?;
        }
        Ok(phase)
    }

    pub fn profile(&self) -> &PhaseProfile {
        &self.profile
    }

    /// Source tasks which are still alive.
    pub fn src(&self) -> &BTreeSet<TaskId> {
        &self.src
    }

    /// Destination tasks which are still alive.
    pub fn dst(&self) -> &BTreeSet<TaskId> {
        &self.dst
    }

    /// Tasks lost during this phase.
    pub fn failed(&self) -> &BTreeSet<TaskId> {
        &self.failed
    }

    pub fn is_last(&self) -> bool {
        self.profile.is_last()
    }

    pub fn is_non_processing(&self) -> bool {
        self.profile.is_non_processing()
    }

    /// Moves a source task to the failed set.
    pub fn fail_src(&mut self, id: TaskId) -> bool {
        self.src.remove(&id) && self.failed.insert(id)
    }

    /// Moves a destination task to the failed set.
    pub fn fail_dst(&mut self, id: TaskId) -> bool {
        self.dst.remove(&id) && self.failed.insert(id)
    }

    /// Marks all source tasks as started.
    pub fn start(&self, tasks: &mut TaskTable) -> Result<(), SimulationError> {
        for &id in self.src.iter() {
            tasks.get_mut(id)?.mark_started();
        }
        Ok(())
    }

    /// Whether every source task has processed all its input.
    pub fn is_processing_finished(&self, tasks: &TaskTable) -> Result<bool, SimulationError> {
        for &id in self.src.iter() {
            if tasks.get(id)?.status() < TaskStatus::ProcFinished {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether processing is finished and the network has delivered everything.
    pub fn is_finished(&self, tasks: &TaskTable, topology: &RoutableSnapshot) -> Result<bool, SimulationError> {
        Ok(self.is_processing_finished(tasks)? && !topology.any_pending_packets())
    }
}
