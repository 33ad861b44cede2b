//! Outcome of a simulated job.

use std::collections::BTreeMap;

use manet_topology::snapshot::NodeId;
use serde::{Deserialize, Serialize};

use crate::profile::PhaseType;

/// Stats of a successfully completed job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSuccess {
    /// Total amount of data moved by the network.
    pub traffic: f64,
    /// Number of unit-time steps the job took.
    pub completion_time: u64,
    /// Average locality index over all placements.
    pub locality_index: Option<f64>,
    /// Average balance index over all placements.
    pub balance_index: Option<f64>,
    /// Average cluster utilization over all placements.
    pub cluster_utilization: Option<f64>,
    /// Total number of candidate allocations evaluated by the placer.
    pub eval_count: u64,
    /// Communication duration of every node which received data over the network.
    pub comm_durations: BTreeMap<NodeId, u64>,
    pub replicate_duration: u64,
    pub shuffle_duration: u64,
    /// Average share of the network capacity used while communicating.
    pub avg_bandwidth_utilization: f64,
    /// Output accumulated by the last phase.
    pub output_size: f64,
    /// Standard deviation of completion time among successful trials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_stdev: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JobResult {
    /// Placer was not run for this trace.
    Unavailable,
    /// Some task of `phase` was lost at `time`.
    Failed {
        phase: PhaseType,
        reliability: Option<f64>,
        contention: Option<f64>,
        time: u64,
    },
    Succeeded(JobSuccess),
}

impl JobResult {
    pub fn unavailable() -> Self {
        JobResult::Unavailable
    }

    pub fn failed(phase: PhaseType, reliability: Option<f64>, contention: Option<f64>, time: u64) -> Self {
        JobResult::Failed {
            phase,
            reliability,
            contention,
            time,
        }
    }

    pub fn succeeded(success: JobSuccess) -> Self {
        JobResult::Succeeded(success)
    }

    /// Attaches standard deviation of completion time across trials. Has no effect unless succeeded.
    pub fn with_stdev(mut self, stdev: f64) -> Self {
        if let JobResult::Succeeded(success) = &mut self {
            success.completion_time_stdev = Some(stdev);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Succeeded(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }

    pub fn completion_time(&self) -> Option<u64> {
        match self {
            JobResult::Succeeded(success) => Some(success.completion_time),
            _ => None,
        }
    }

    pub fn success(&self) -> Option<&JobSuccess> {
        match self {
            JobResult::Succeeded(success) => Some(success),
            _ => None,
        }
    }
}
