//! Internal invariant violations which abort a trial.

use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("task {task} has negative pending input {pending}")]
    NegativePendingInput { task: TaskId, pending: f64 },
    #[error("network moved {throughput} with no active transmitters")]
    ThroughputWithoutTransmitters { throughput: f64 },
    #[error("task {0} is used before being bound to a phase")]
    UnboundTask(TaskId),
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
}
