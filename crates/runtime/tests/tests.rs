use std::collections::BTreeMap;

use manet_mr::{
    allocation::AllocationResult,
    error::SimulationError,
    experiment::{aggregate_trials, Experiment},
    job_result::{JobResult, JobSuccess},
    job_tracker::JobTracker,
    placement::{read_name, Placer, PlacerRegistry},
    placers::{degree::DegreePlacer, estimation::EstimationPlacer, local::LocalPlacer},
    profile::{CommType, JobProfile, PhaseProfile, PhaseType},
    runner::{Clock, EstTraceRunner, RunnerConfig, TraceRunner},
    task::{Task, TaskIdGenerator, TaskStatus},
};
use manet_topology::{
    history::{DepartureHistory, HistoryStat},
    remap::NodeIdRemap,
    routable::RoutableSnapshot,
    snapshot::{NodeId, Snapshot},
    trace::Trace,
};

fn snapshot(time: u64, nodes: &[NodeId], links: &[(NodeId, NodeId)]) -> Snapshot {
    let mut snapshot = Snapshot::new(time);
    for &node in nodes {
        snapshot.add_node(node);
    }
    for &(a, b) in links {
        snapshot.add_link(a, b);
    }
    snapshot
}

fn full_mesh(time: u64, nodes: u32) -> Snapshot {
    let mut snapshot = Snapshot::new(time);
    for a in 0..nodes {
        snapshot.add_node(a);
        for b in a + 1..nodes {
            snapshot.add_link(a, b);
        }
    }
    snapshot
}

fn dist() -> PhaseProfile {
    PhaseProfile::new(PhaseType::Dist, CommType::Replicate, 1., f64::INFINITY)
}

fn map(rate: f64) -> PhaseProfile {
    PhaseProfile::new(PhaseType::Map, CommType::Shuffle, 1., rate)
}

fn reduce(rate: f64) -> PhaseProfile {
    PhaseProfile::new(PhaseType::Reduce, CommType::None, 1., rate)
}

fn success(completion_time: u64) -> JobResult {
    JobResult::succeeded(JobSuccess {
        traffic: 0.,
        completion_time,
        locality_index: None,
        balance_index: None,
        cluster_utilization: None,
        eval_count: 0,
        comm_durations: BTreeMap::new(),
        replicate_duration: 0,
        shuffle_duration: 0,
        avg_bandwidth_utilization: 0.,
        output_size: 0.,
        completion_time_stdev: None,
    })
}

fn pre_seeded(
    phase: PhaseProfile,
    next_phase: Option<PhaseProfile>,
    sources: Vec<Task>,
    connections: Vec<(u64, NodeId)>,
    node_count: usize,
) -> JobTracker {
    let first_free_id = sources.iter().map(|task| task.id() + 1).max().unwrap_or(0);
    let allocation = AllocationResult::from_connections(connections, &sources.iter().collect::<Vec<_>>(), node_count);
    JobTracker::pre_seeded(
        phase,
        next_phase,
        sources,
        allocation,
        &mut TaskIdGenerator::starting_at(first_free_id),
    )
    .unwrap()
}

#[test]
fn task_ids_are_sequential_after_reset() {
    let mut ids = TaskIdGenerator::new();
    for _ in 0..3 {
        ids.next_id();
    }
    ids.reset();
    let generated = (0..5).map(|_| ids.next_id()).collect::<Vec<_>>();
    assert_eq!(generated, vec![0, 1, 2, 3, 4]);
}

#[test]
fn task_processes_at_its_rate() {
    let mut topology = RoutableSnapshot::new(snapshot(0, &[1], &[]), 1.);
    let mut task = Task::computed(7, 1, Some(4.), 10.);
    assert_eq!(
        task.process_by_unit_time(&mut topology),
        Err(SimulationError::UnboundTask(7))
    );

    task.late_bind(PhaseProfile::new(PhaseType::Reduce, CommType::None, 0.5, 4.));
    topology.queue_packets(1, 1, 0, 7, 10.);
    task.on_receive(&mut topology, PhaseType::Reduce, 0);
    assert_eq!(task.pending_input(), 10.);
    task.mark_started();

    let mut pending = Vec::new();
    for _ in 0..4 {
        task.process_by_unit_time(&mut topology).unwrap();
        pending.push(task.pending_input());
    }
    assert_eq!(pending, vec![6., 2., 0., 0.]);
    assert!((task.output_buffer() - 5.).abs() < 1e-9);
    assert!(!topology.any_pending_packets());
    assert_eq!(task.status(), TaskStatus::Started);
}

#[test]
fn dist_to_single_destination() {
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let mut tracker = pre_seeded(dist(), Some(map(f64::INFINITY)), sources, vec![(0, 3), (1, 3)], 3);
    let mut topology = RoutableSnapshot::new(snapshot(0, &[1, 2, 3], &[(1, 3), (2, 3)]), f64::INFINITY);

    let mut time = 0;
    while !tracker.is_cur_task_phase_finished(&topology).unwrap() {
        assert!(!tracker.is_cur_task_phase_failed());
        tracker.update_by_unit_time(&mut topology, time).unwrap();
        time += 1;
        assert!(time < 10);
    }
    assert_eq!(time, 2);

    let phase = tracker.current_phase().unwrap();
    assert_eq!(phase.dst().len(), 1);
    let dst = tracker.tasks().get(*phase.dst().iter().next().unwrap()).unwrap();
    assert_eq!(dst.node(), 3);
    assert_eq!(dst.rate(), Some(f64::INFINITY));
    assert!((dst.target_size() - 20.).abs() < 1e-9);
    assert!((dst.pending_input() - 20.).abs() < 1e-9);
    assert!((tracker.throughput_sum() - 20.).abs() < 1e-9);
    assert_eq!(tracker.replicate_duration(), 1);
    assert_eq!(tracker.shuffle_duration(), 0);
}

#[test]
fn dist_conserves_data_over_multiple_hops() {
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.), Task::input(2, 3, 10.)];
    let connections = vec![(0, 2), (0, 4), (1, 2), (1, 4), (2, 2), (2, 4)];
    let mut tracker = pre_seeded(dist(), Some(map(1.)), sources, connections, 4);
    let mut topology = RoutableSnapshot::new(snapshot(0, &[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4)]), 4.);

    let mut time = 0;
    let mut last_counters = (0., 0, 0);
    while !tracker.is_cur_task_phase_finished(&topology).unwrap() {
        tracker.update_by_unit_time(&mut topology, time).unwrap();
        time += 1;
        assert!(time < 100);

        let phase = tracker.current_phase().unwrap();
        for task in tracker.tasks().iter() {
            assert!(task.pending_input() >= 0.);
        }
        if phase.is_finished(tracker.tasks(), &topology).unwrap() {
            assert!(phase.is_processing_finished(tracker.tasks()).unwrap());
        }
        if phase.is_processing_finished(tracker.tasks()).unwrap() {
            for &id in phase.src().iter() {
                assert_eq!(tracker.tasks().get(id).unwrap().status(), TaskStatus::ProcFinished);
            }
        }

        let counters = (
            tracker.throughput_sum(),
            tracker.replicate_duration(),
            tracker.shuffle_duration(),
        );
        assert!(counters.0 >= last_counters.0);
        assert!(counters.1 >= last_counters.1);
        assert!(counters.2 >= last_counters.2);
        last_counters = counters;
    }

    let phase = tracker.current_phase().unwrap();
    assert_eq!(phase.dst().len(), 2);
    let received = phase
        .dst()
        .iter()
        .map(|&id| tracker.tasks().get(id).unwrap())
        .inspect(|task| assert!((task.target_size() - 15.).abs() < 1e-9))
        .map(|task| task.pending_input())
        .sum::<f64>();
    assert!((received - 30.).abs() < 1e-9);
    assert!(tracker.bandwidth_utilization_sum() > 0.);
    assert!(topology.comm_durations().contains_key(&4));
}

#[test]
fn alive_fraction_below_one_fails_phase() {
    let sources = (0..4).map(|i| Task::input(i, i as NodeId + 1, 1.)).collect::<Vec<_>>();
    let mut tracker = pre_seeded(reduce(1.), None, sources, Vec::new(), 4);
    assert!(!tracker.is_cur_task_phase_failed());

    tracker.update_task_departures(&[1]).unwrap();
    let phase = tracker.current_phase().unwrap();
    assert_eq!((phase.src().len(), phase.dst().len(), phase.failed().len()), (3, 0, 1));
    assert!(tracker.is_cur_task_phase_failed());
    assert_eq!(tracker.total_failed().len(), 1);
}

#[test]
fn non_terminal_phase_without_destinations_fails() {
    let sources = (0..4).map(|i| Task::input(i, i as NodeId + 1, 1.)).collect::<Vec<_>>();
    let mut tracker = pre_seeded(map(1.), Some(reduce(1.)), sources, Vec::new(), 4);
    assert!(tracker.current_phase().unwrap().dst().is_empty());
    assert!(tracker.is_cur_task_phase_failed());

    tracker.update_task_departures(&[1]).unwrap();
    assert!(tracker.is_cur_task_phase_failed());
}

#[test]
fn departure_fails_map_phase() {
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let mut tracker = pre_seeded(map(5.), Some(reduce(5.)), sources, vec![(0, 3), (1, 3)], 3);
    let mut topology = RoutableSnapshot::new(snapshot(0, &[1, 2, 3], &[(1, 3), (2, 3)]), 1.);
    assert!(!tracker.is_cur_task_phase_failed());

    let departed = topology.update_topology(&snapshot(1, &[1, 3], &[(1, 3)]));
    assert_eq!(departed, vec![2]);
    tracker.update_task_departures(&departed).unwrap();
    assert!(tracker.is_cur_task_phase_failed());
    let src = tracker.current_phase().unwrap().src();
    assert_eq!(src.iter().copied().collect::<Vec<_>>(), vec![0]);
    assert!(tracker
        .tasks()
        .get(0)
        .unwrap()
        .dst_tasks()
        .iter()
        .all(|&(_, node)| node == 3));
}

#[test]
fn departed_destination_is_pruned_and_failed() {
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let mut tracker = pre_seeded(dist(), Some(map(1.)), sources, vec![(0, 3), (0, 4), (1, 3), (1, 4)], 4);
    tracker.update_task_departures(&[4]).unwrap();

    let phase = tracker.current_phase().unwrap();
    assert_eq!(phase.src().len(), 2);
    assert_eq!(phase.dst().len(), 1);
    assert_eq!(phase.failed().len(), 1);
    for &id in phase.src().iter() {
        assert_eq!(tracker.tasks().get(id).unwrap().dst_tasks().len(), 1);
    }
    assert!(tracker.is_cur_task_phase_failed());
}

#[test]
fn estimator_reports_failure_time() {
    let trace = Trace::new(
        "departure",
        vec![
            snapshot(0, &[1, 2, 3], &[(1, 3), (2, 3)]),
            snapshot(1, &[1, 3], &[(1, 3)]),
        ],
    )
    .unwrap();
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let tracker = pre_seeded(map(5.), Some(reduce(5.)), sources, vec![(0, 3), (1, 3)], 3);
    let runner = EstTraceRunner::new(
        &trace,
        trace.closest_routable_snapshot(0, 1.),
        tracker,
        0,
        Clock::Estimated { speedup: 1 },
        100,
    );
    let result = runner.run().unwrap();
    assert!(matches!(
        result,
        JobResult::Failed {
            phase: PhaseType::Map,
            time: 1,
            ..
        }
    ));
}

#[test]
fn estimator_counts_time_from_start() {
    let trace = Trace::new("static", vec![snapshot(0, &[1, 2, 3], &[(1, 3), (2, 3)])]).unwrap();
    let sources = vec![Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let tracker = pre_seeded(dist(), Some(map(1.)), sources, vec![(0, 3), (1, 3)], 3);
    let runner = EstTraceRunner::new(
        &trace,
        trace.closest_routable_snapshot(50, 10.),
        tracker,
        50,
        Clock::Estimated { speedup: 2 },
        100,
    );
    let success = runner.run().unwrap().success().cloned().unwrap();
    assert_eq!(success.completion_time, 2);
    assert!((success.traffic - 20.).abs() < 1e-9);
    assert_eq!(success.comm_durations.get(&3), Some(&1));
}

#[test]
fn clock_maps_simulation_time() {
    assert_eq!(Clock::Real.snapshot_time(10, 15), 15);
    assert_eq!(Clock::Estimated { speedup: 3 }.snapshot_time(10, 15), 25);
    assert_eq!(Clock::Estimated { speedup: 3 }.snapshot_time(10, 10), 10);
    assert_eq!(Clock::Estimated { speedup: 3 }.trace_time(20, 2), 26);
    assert_eq!(Clock::Real.trace_time(20, 2), 22);
}

#[test]
fn full_job_on_static_network() {
    let trace = Trace::new("static", vec![full_mesh(0, 4)]).unwrap();
    let job = JobProfile::map_reduce(40., 5., 0.5, 5., 1.);

    let result = TraceRunner::new(&trace, job.clone(), Box::new(DegreePlacer::new(2)), RunnerConfig::default())
        .run()
        .unwrap();
    let success = result.success().cloned().unwrap();
    assert!(success.completion_time > 0);
    assert!(success.output_size > 0.);
    assert_eq!(success.cluster_utilization, Some(0.5));
    assert_eq!(success.eval_count, 0);

    let again = TraceRunner::new(&trace, job, Box::new(DegreePlacer::new(2)), RunnerConfig::default())
        .run()
        .unwrap();
    assert_eq!(result, again);
}

/// Local placement which reports a fixed reliability.
struct ReliableLocalPlacer {
    inner: LocalPlacer,
    reliability: f64,
}

impl Placer for ReliableLocalPlacer {
    fn name(&self) -> &str {
        "ReliableLocal"
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
        let mut allocation = self.inner.allocate_tasks(
            trace_id, job, phase, next_phase, trace, topology, time, sources, history, remap,
        );
        allocation.reliability = Some(self.reliability);
        allocation
    }
}

fn leaving_trace() -> Trace {
    Trace::new("leaving", vec![full_mesh(0, 4), full_mesh(3, 2)]).unwrap()
}

#[test]
fn full_job_fails_when_mappers_leave() {
    let trace = leaving_trace();
    let job = JobProfile::map_reduce(40., 1., 1., 1., 1.);
    let result = TraceRunner::new(&trace, job, Box::new(LocalPlacer::new()), RunnerConfig::default())
        .run()
        .unwrap();
    assert_eq!(result, JobResult::failed(PhaseType::Map, None, Some(2.), 3));
}

#[test]
fn failure_carries_map_placement_reliability() {
    let trace = leaving_trace();
    let job = JobProfile::map_reduce(40., 1., 1., 1., 1.);
    let placer = ReliableLocalPlacer {
        inner: LocalPlacer::new(),
        reliability: 0.75,
    };
    let result = TraceRunner::new(&trace, job, Box::new(placer), RunnerConfig::default())
        .run()
        .unwrap();
    assert_eq!(result, JobResult::failed(PhaseType::Map, Some(0.75), Some(2.), 3));
}

#[test]
fn estimation_replays_trace_from_live_topology() {
    let trace = Trace::new(
        "hub",
        vec![
            snapshot(0, &[1, 2, 3], &[(1, 3), (2, 3)]),
            snapshot(20, &[1, 2, 3, 4], &[(1, 3), (1, 4), (2, 4), (3, 4)]),
        ],
    )
    .unwrap();
    let job = JobProfile::map_reduce(20., 5., 1., 5., 1.);
    let topology = trace.closest_routable_snapshot(20, 10.);
    let remap = NodeIdRemap::from_snapshot(topology.snapshot());
    let history = DepartureHistory::from_trace(&trace);
    let inputs = [Task::input(0, 1, 10.), Task::input(1, 2, 10.)];
    let sources = inputs.iter().collect::<Vec<_>>();

    let mut placer = EstimationPlacer::new(0, 1, 0, 100, 2);
    assert_eq!(placer.clock(), Clock::Estimated { speedup: 2 });
    let allocation = placer.allocate_tasks(
        trace.id(),
        &job,
        &job.phases[0],
        &job.phases[1],
        &trace,
        &topology,
        10,
        &sources,
        &history,
        &remap,
    );
    assert_eq!(allocation.dst_nodes(), vec![4]);
    assert_eq!(allocation.eval_count, Some(2));
    assert_eq!(allocation.reliability, Some(1.));
}

#[test]
fn transfer_without_transmitters_is_not_counted() {
    let mut tracker = JobTracker::new(JobProfile::map_reduce(10., 1., 1., 1., 1.));
    assert_eq!(
        tracker.record_transfer(5., 0, 10., CommType::Replicate),
        Err(SimulationError::ThroughputWithoutTransmitters { throughput: 5. })
    );
    assert_eq!(tracker.throughput_sum(), 0.);
    assert_eq!(tracker.bandwidth_utilization_sum(), 0.);
    assert_eq!((tracker.comm_duration(), tracker.replicate_duration()), (0, 0));

    tracker.record_transfer(5., 1, 10., CommType::Shuffle).unwrap();
    assert_eq!(tracker.throughput_sum(), 5.);
    assert_eq!(tracker.bandwidth_utilization_sum(), 0.5);
    assert_eq!((tracker.comm_duration(), tracker.shuffle_duration()), (1, 1));
}

#[test]
fn estimation_placer_evaluates_candidates() {
    let trace = Trace::new("static", vec![full_mesh(0, 5)]).unwrap();
    let job = JobProfile::map_reduce(50., 5., 1., 5., 1.);
    let mut runner = TraceRunner::new(
        &trace,
        job,
        Box::new(EstimationPlacer::new(1, 2, 2, 100, 2)),
        RunnerConfig::default(),
    );
    assert_eq!(runner.clock(), Clock::Estimated { speedup: 2 });
    let success = runner.run().unwrap().success().cloned().unwrap();
    assert_eq!(success.eval_count, 8);
}

#[test]
fn majority_of_successes_picks_closest_to_mean() {
    let results = [10, 12, 11, 9].map(success);
    let aggregated = aggregate_trials(&results);
    let success = aggregated.success().unwrap();
    assert_eq!(success.completion_time, 10);
    assert!((success.completion_time_stdev.unwrap() - 1.118).abs() < 1e-3);
}

#[test]
fn minority_of_successes_reports_failure() {
    let failure = JobResult::failed(PhaseType::Reduce, Some(0.5), None, 4);
    let results = vec![
        success(10),
        failure.clone(),
        JobResult::failed(PhaseType::Map, None, None, 2),
    ];
    assert_eq!(aggregate_trials(&results), failure);
    assert_eq!(aggregate_trials(&[]), JobResult::Unavailable);
}

#[test]
fn registry_resolves_names_with_parameters() {
    let (name, args) = read_name("Random[dst_count=4, other=x]");
    assert_eq!(name, "Random");
    assert_eq!(args.get("dst_count"), Some(&"4"));
    assert_eq!(args.get("other"), Some(&"x"));

    let registry = PlacerRegistry::with_defaults();
    assert_eq!(registry.resolve("Degree[dst_count=2]", 0).unwrap().name(), "Degree");
    assert!(registry.resolve("Estimation", 0).unwrap().estimation_aware());
    assert!(!registry.resolve("Local", 0).unwrap().estimation_aware());
    assert_eq!(
        registry.resolve("Estimation[speedup=3]", 0).unwrap().clock(),
        Clock::Estimated { speedup: 3 }
    );
    assert!(registry.resolve("Genetic", 0).is_none());
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["Degree", "Estimation", "Local", "Random"]
    );
}

#[test]
fn experiment_aggregates_trials() {
    let trace = Trace::new("static", vec![full_mesh(0, 4)]).unwrap();
    let job = JobProfile::map_reduce(40., 5., 0.5, 5., 1.);
    let results = Experiment::new(
        7,
        vec![trace],
        vec![("job".to_string(), job)],
        vec!["Degree[dst_count=2]".to_string(), "Genetic".to_string()],
        2,
        RunnerConfig::default(),
        PlacerRegistry::with_defaults(),
    )
    .run(1);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].placer, "Degree[dst_count=2]");
    assert_eq!(results[0].successes, 2);
    assert_eq!(
        results[0].result.success().unwrap().completion_time_stdev,
        Some(0.)
    );
    assert_eq!(results[1].result, JobResult::Unavailable);
}
