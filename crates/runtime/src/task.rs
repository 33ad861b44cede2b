//! Tasks bound to nodes and the per-trial task arena.

use std::collections::{BTreeMap, BTreeSet};

use manet_topology::{routable::RoutableSnapshot, snapshot::NodeId};
use serde::Serialize;

use crate::{
    error::SimulationError,
    profile::{PhaseProfile, PhaseType},
};

pub use manet_topology::routable::TaskId;

/// Progress of a task inside its phase. Never goes back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TaskStatus {
    Waiting,
    Started,
    ProcFinished,
}

/// Generates task ids for a single trial.
#[derive(Clone, Debug, Default)]
pub struct TaskIdGenerator {
    next: TaskId,
}

impl TaskIdGenerator {
    /// Creates generator which starts from 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates generator which starts from `first`.
    pub fn starting_at(first: TaskId) -> Self {
        TaskIdGenerator { next: first }
    }

    /// Returns next unused id.
    pub fn next_id(&mut self) -> TaskId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Restarts numbering from 0.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Unit of work of one phase on one node.
#[derive(Clone, Debug)]
pub struct Task {
    id: TaskId,
    node: NodeId,
    rate: Option<f64>,
    pending_input: f64,
    target_size: f64,
    output_buffer: f64,
    status: TaskStatus,
    dst_tasks: Vec<(TaskId, NodeId)>,
    phase: Option<PhaseProfile>,
}

impl Task {
    /// Creates task which holds job input from the start. It has no processing rate.
    pub fn input(id: TaskId, node: NodeId, size: f64) -> Self {
        Task {
            id,
            node,
            rate: None,
            pending_input: size,
            target_size: size,
            output_buffer: 0.,
            status: TaskStatus::Waiting,
            dst_tasks: Vec::new(),
            phase: None,
        }
    }

    /// Creates task which receives `target_size` of input from the previous phase.
    ///
    /// `rate` of `None` means the task processes all its pending input in one unit of time.
    pub fn computed(id: TaskId, node: NodeId, rate: Option<f64>, target_size: f64) -> Self {
        Task {
            id,
            node,
            rate,
            pending_input: 0.,
            target_size,
            output_buffer: 0.,
            status: TaskStatus::Waiting,
            dst_tasks: Vec::new(),
            phase: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Node hosting the task.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Input received but not processed yet.
    pub fn pending_input(&self) -> f64 {
        self.pending_input
    }

    /// Total input the task is expected to get.
    pub fn target_size(&self) -> f64 {
        self.target_size
    }

    /// Output accumulated by a task of the last phase.
    pub fn output_buffer(&self) -> f64 {
        self.output_buffer
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Downstream tasks with their nodes.
    pub fn dst_tasks(&self) -> &[(TaskId, NodeId)] {
        &self.dst_tasks
    }

    /// Profile of the phase the task is bound to.
    pub fn phase(&self) -> Option<&PhaseProfile> {
        self.phase.as_ref()
    }

    /// Binds task to a phase where it is a source and clears its downstream tasks.
    pub fn late_bind(&mut self, phase: PhaseProfile) {
        self.phase = Some(phase);
        self.dst_tasks = Vec::new();
    }

    /// Adds downstream task. Adding the same task twice has no effect.
    pub fn add_dst_task(&mut self, task: TaskId, node: NodeId) -> Result<(), SimulationError> {
        if self.phase.is_none() {
            return Err(SimulationError::UnboundTask(self.id));
        }
        if !self.dst_tasks.iter().any(|&(id, _)| id == task) {
            self.dst_tasks.push((task, node));
        }
        Ok(())
    }

    /// Removes downstream tasks hosted on departed nodes.
    pub fn prune_dst_tasks(&mut self, departed: &BTreeSet<NodeId>) {
        self.dst_tasks.retain(|(_, node)| !departed.contains(node));
    }

    pub fn mark_started(&mut self) {
        self.status = self.status.max(TaskStatus::Started);
    }

    pub fn mark_proc_finished(&mut self) {
        self.status = TaskStatus::ProcFinished;
    }

    /// Processes pending input for one unit of time and queues produced output to downstream tasks.
    pub fn process_by_unit_time(&mut self, topology: &mut RoutableSnapshot) -> Result<(), SimulationError> {
        let phase = self.phase.ok_or(SimulationError::UnboundTask(self.id))?;
        self.check_pending()?;
        if self.pending_input == 0. {
            return Ok(());
        }

        if phase.is_non_processing() {
            let size = self.pending_input;
            self.pending_input = 0.;
            self.send_downstream(topology, size);
            return Ok(());
        }

        let processed = match self.rate {
            Some(rate) => self.pending_input.min(rate),
            None => self.pending_input,
        };
        self.pending_input -= processed;
        self.check_pending()?;

        let output = processed * phase.output_multiplier;
        if phase.is_last() {
            self.output_buffer += output;
        } else {
            self.send_downstream(topology, output);
        }
        Ok(())
    }

    /// Takes the data delivered to this task during the current unit of time.
    pub fn on_receive(&mut self, topology: &mut RoutableSnapshot, phase_type: PhaseType, time: u64) {
        let loopback = topology.take_loopback_data(self.node, self.id);
        let completed = topology.take_completed_data(self.node, self.id);
        self.pending_input += loopback + completed;
        if completed > 0. {
            topology.mark_comm_started(self.node, phase_type.name(), time);
            topology.mark_comm_finished(self.node, phase_type.name(), time);
        }
    }

    fn send_downstream(&self, topology: &mut RoutableSnapshot, size: f64) {
        if self.dst_tasks.is_empty() {
            return;
        }
        let share = size / self.dst_tasks.len() as f64;
        for &(dst_task, dst_node) in self.dst_tasks.iter() {
            topology.queue_packets(self.node, dst_node, self.id, dst_task, share);
        }
    }

    fn check_pending(&self) -> Result<(), SimulationError> {
        if self.pending_input < 0. {
            return Err(SimulationError::NegativePendingInput {
                task: self.id,
                pending: self.pending_input,
            });
        }
        Ok(())
    }
}

/// All tasks of one trial keyed by id.
#[derive(Clone, Debug, Default)]
pub struct TaskTable {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id(), task);
    }

    pub fn get(&self, id: TaskId) -> Result<&Task, SimulationError> {
        self.tasks.get(&id).ok_or(SimulationError::UnknownTask(id))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut Task, SimulationError> {
        self.tasks.get_mut(&id).ok_or(SimulationError::UnknownTask(id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}
