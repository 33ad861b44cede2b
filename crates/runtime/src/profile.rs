//! Job and phase profiles.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stage of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseType {
    /// Distribution of the job input to map nodes. Tasks of this phase do not process data.
    Dist,
    Map,
    Reduce,
}

impl PhaseType {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseType::Dist => "DIST",
            PhaseType::Map => "MAP",
            PhaseType::Reduce => "REDUCE",
        }
    }
}

/// How outputs of a phase reach the next phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommType {
    /// Last phase, outputs stay on the node.
    None,
    Replicate,
    Shuffle,
}

fn default_output_multiplier() -> f64 {
    1.
}

fn default_bandwidth() -> f64 {
    f64::INFINITY
}

/// Parameters of a single phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseProfile {
    pub phase_type: PhaseType,
    pub comm_type: CommType,
    /// Ratio of output size to processed input size.
    #[serde(default = "default_output_multiplier")]
    pub output_multiplier: f64,
    /// Amount of input a task of this phase processes per unit time.
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,
}

impl PhaseProfile {
    pub fn new(phase_type: PhaseType, comm_type: CommType, output_multiplier: f64, bandwidth: f64) -> Self {
        PhaseProfile {
            phase_type,
            comm_type,
            output_multiplier,
            bandwidth,
        }
    }

    /// Whether this is the last phase of a job.
    pub fn is_last(&self) -> bool {
        self.comm_type == CommType::None
    }

    /// Whether tasks of this phase pass their input through without processing.
    pub fn is_non_processing(&self) -> bool {
        self.phase_type == PhaseType::Dist
    }
}

/// Job input size and ordered phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobProfile {
    pub input_size: f64,
    pub phases: Vec<PhaseProfile>,
}

impl JobProfile {
    pub fn new(input_size: f64, phases: Vec<PhaseProfile>) -> Self {
        JobProfile { input_size, phases }
    }

    /// Classic three-phase job: replicate input to mappers, shuffle map outputs to reducers.
    pub fn map_reduce(
        input_size: f64,
        map_rate: f64,
        map_output_multiplier: f64,
        reduce_rate: f64,
        reduce_output_multiplier: f64,
    ) -> Self {
        JobProfile {
            input_size,
            phases: vec![
                PhaseProfile::new(PhaseType::Dist, CommType::Replicate, 1., f64::INFINITY),
                PhaseProfile::new(PhaseType::Map, CommType::Shuffle, map_output_multiplier, map_rate),
                PhaseProfile::new(PhaseType::Reduce, CommType::None, reduce_output_multiplier, reduce_rate),
            ],
        }
    }

    /// Read [JobProfile] from YAML file. Panic on error.
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(&file).unwrap_or_else(|_| panic!("Can't read file {}", file.as_ref().display())),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {e:?}", file.as_ref().display()))
    }
}
