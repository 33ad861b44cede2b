//! Outer time loop driving a [JobTracker] over a replayed trace.

use log::{debug, info, warn};
use manet_topology::{
    history::{DepartureHistory, HistoryStat},
    routable::RoutableSnapshot,
    trace::Trace,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::SimulationError,
    job_result::{JobResult, JobSuccess},
    job_tracker::JobTracker,
    placement::Placer,
    profile::{JobProfile, PhaseType},
    task::TaskIdGenerator,
};

/// Maps simulation time to the trace time snapshots are read at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Clock {
    Real,
    /// Trace advances `speedup` times faster than simulation time since the origin.
    Estimated { speedup: u64 },
}

impl Clock {
    /// Trace time reached `elapsed` steps after trace time `trace_origin`.
    pub fn trace_time(&self, trace_origin: u64, elapsed: u64) -> u64 {
        match *self {
            Clock::Real => trace_origin + elapsed,
            Clock::Estimated { speedup } => trace_origin + elapsed.saturating_mul(speedup),
        }
    }

    /// Trace time at simulation `time` when simulation and trace both start at `origin`.
    pub fn snapshot_time(&self, origin: u64, time: u64) -> u64 {
        self.trace_time(origin, time.saturating_sub(origin))
    }
}

fn default_link_bandwidth() -> f64 {
    10.
}

fn default_max_time() -> u64 {
    100_000
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Amount of data every node can send per unit time.
    #[serde(default = "default_link_bandwidth")]
    pub link_bandwidth: f64,
    /// A job running for this long is considered failed.
    #[serde(default = "default_max_time")]
    pub max_time: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            link_bandwidth: default_link_bandwidth(),
            max_time: default_max_time(),
        }
    }
}

struct Placement<'a> {
    trace_id: &'a str,
    placer: &'a mut dyn Placer,
    history: &'a dyn HistoryStat,
    ids: &'a mut TaskIdGenerator,
}

enum Outcome {
    Finished { time: u64 },
    Failed { phase: PhaseType, time: u64 },
}

/// Loop shared by both runners. Simulation starts at `origin` and reads the trace from `trace_origin` on.
/// Without `placement` the tracker is expected to run a single phase.
#[allow(clippy::too_many_arguments)]
fn drive(
    trace: &Trace,
    clock: Clock,
    origin: u64,
    trace_origin: u64,
    max_time: u64,
    tracker: &mut JobTracker,
    topology: &mut RoutableSnapshot,
    mut placement: Option<Placement<'_>>,
) -> Result<Outcome, SimulationError> {
    let mut time = origin;
    loop {
        let snapshot = trace.closest_snapshot(clock.trace_time(trace_origin, time - origin));
        let departed = topology.update_topology(snapshot);
        tracker.update_task_departures(&departed)?;

        if tracker.is_cur_task_phase_failed() {
            let phase = tracker.current_phase_type().unwrap_or(PhaseType::Dist);
            debug!("[{}] {} phase failed", time, phase.name());
            return Ok(Outcome::Failed { phase, time });
        }
        if tracker.is_job_finished(topology)? {
            return Ok(Outcome::Finished { time });
        }
        if time - origin >= max_time {
            let phase = tracker.current_phase_type().unwrap_or(PhaseType::Dist);
            warn!("[{}] {} phase did not finish in {} steps", time, phase.name(), max_time);
            return Ok(Outcome::Failed { phase, time });
        }

        if let Some(placement) = placement.as_mut() {
            if tracker.is_cur_task_phase_finished(topology)? {
                tracker.allocate_next_tasks(
                    placement.trace_id,
                    placement.placer,
                    trace,
                    topology,
                    time,
                    placement.history,
                    placement.ids,
                )?;
            }
        }

        tracker.update_by_unit_time(topology, time)?;
        time += 1;
    }
}

fn average(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let values = values.flatten().collect::<Vec<_>>();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn summarize(tracker: &JobTracker, topology: &RoutableSnapshot, completion_time: u64) -> JobSuccess {
    let allocations = tracker.allocations();
    JobSuccess {
        traffic: tracker.throughput_sum(),
        completion_time,
        locality_index: average(allocations.iter().map(|allocation| allocation.locality_index)),
        balance_index: average(allocations.iter().map(|allocation| allocation.balance_index)),
        cluster_utilization: average(allocations.iter().map(|allocation| allocation.cluster_utilization)),
        eval_count: allocations.iter().filter_map(|allocation| allocation.eval_count).sum(),
        comm_durations: topology.comm_durations(),
        replicate_duration: tracker.replicate_duration(),
        shuffle_duration: tracker.shuffle_duration(),
        avg_bandwidth_utilization: if tracker.comm_duration() == 0 {
            0.
        } else {
            tracker.bandwidth_utilization_sum() / tracker.comm_duration() as f64
        },
        output_size: tracker.output_size(),
        completion_time_stdev: None,
    }
}

/// Runs a whole job over a trace, placing every phase with a [Placer].
pub struct TraceRunner<'a> {
    trace: &'a Trace,
    job: JobProfile,
    placer: Box<dyn Placer>,
    config: RunnerConfig,
    ids: TaskIdGenerator,
}

impl<'a> TraceRunner<'a> {
    pub fn new(trace: &'a Trace, job: JobProfile, placer: Box<dyn Placer>, config: RunnerConfig) -> Self {
        TraceRunner {
            trace,
            job,
            placer,
            config,
            ids: TaskIdGenerator::new(),
        }
    }

    /// Clock used to read the trace, chosen by the placer.
    pub fn clock(&self) -> Clock {
        self.placer.clock()
    }

    pub fn run(&mut self) -> Result<JobResult, SimulationError> {
        self.ids.reset();
        let clock = self.clock();
        let history = DepartureHistory::from_trace(self.trace);
        let trace_id = self.trace.id().to_string();
        let time = 0;

        let mut topology = self
            .trace
            .closest_routable_snapshot(clock.snapshot_time(0, time), self.config.link_bandwidth);
        let mut tracker = JobTracker::new(self.job.clone());
        tracker.place_input_tasks(&trace_id, topology.snapshot(), &mut self.ids);
        tracker.allocate_next_tasks(
            &trace_id,
            self.placer.as_mut(),
            self.trace,
            &topology,
            time,
            &history,
            &mut self.ids,
        )?;

        let outcome = drive(
            self.trace,
            clock,
            time,
            0,
            self.config.max_time,
            &mut tracker,
            &mut topology,
            Some(Placement {
                trace_id: &trace_id,
                placer: self.placer.as_mut(),
                history: &history,
                ids: &mut self.ids,
            }),
        )?;

        Ok(match outcome {
            Outcome::Failed { phase, time } => {
                info!(
                    "trace {}, placer {}: {} phase failed at {}",
                    trace_id,
                    self.placer.name(),
                    phase.name(),
                    time
                );
                JobResult::failed(phase, tracker.reliability(), tracker.contention(), time)
            }
            Outcome::Finished { time } => {
                info!(
                    "trace {}, placer {}: job finished at {}",
                    trace_id,
                    self.placer.name(),
                    time
                );
                JobResult::succeeded(summarize(&tracker, &topology, time))
            }
        })
    }
}

/// Runs a single pre-placed phase ahead of time on its own copy of the topology.
///
/// The trace is replayed from the time of the topology snapshot, so the first step sees the same nodes.
pub struct EstTraceRunner<'a> {
    trace: &'a Trace,
    topology: RoutableSnapshot,
    tracker: JobTracker,
    start_time: u64,
    clock: Clock,
    max_time: u64,
}

impl<'a> EstTraceRunner<'a> {
    pub fn new(
        trace: &'a Trace,
        topology: RoutableSnapshot,
        tracker: JobTracker,
        start_time: u64,
        clock: Clock,
        max_time: u64,
    ) -> Self {
        EstTraceRunner {
            trace,
            topology,
            tracker,
            start_time,
            clock,
            max_time,
        }
    }

    /// Completion time in the result is counted from `start_time`.
    pub fn run(mut self) -> Result<JobResult, SimulationError> {
        let trace_origin = self.topology.snapshot().time;
        let outcome = drive(
            self.trace,
            self.clock,
            self.start_time,
            trace_origin,
            self.max_time,
            &mut self.tracker,
            &mut self.topology,
            None,
        )?;
        Ok(match outcome {
            Outcome::Failed { phase, time } => JobResult::failed(
                phase,
                self.tracker.reliability(),
                self.tracker.contention(),
                time,
            ),
            Outcome::Finished { time } => {
                JobResult::succeeded(summarize(&self.tracker, &self.topology, time - self.start_time))
            }
        })
    }
}
