use manet_topology::{
    history::{DepartureHistory, HistoryStat},
    remap::NodeIdRemap,
    routable::RoutableSnapshot,
    snapshot::{NodeId, Snapshot},
    trace::{Trace, TraceError},
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

fn line(time: u64, nodes: u32) -> Snapshot {
    let mut snapshot = Snapshot::new(time);
    snapshot.add_node(0);
    for node in 1..nodes {
        snapshot.add_link(node - 1, node);
    }
    snapshot
}

#[test]
fn links_are_normalized() {
    let snapshot = snapshot(0, &[5], &[(3, 1), (1, 3), (2, 2)]);
    assert_eq!(snapshot.links.iter().copied().collect::<Vec<_>>(), vec![(1, 3)]);
    assert_eq!(snapshot.node_count(), 4);
    assert_eq!(snapshot.neighbours(1), vec![3]);
    assert_eq!(snapshot.degree(5), 0);
    assert_eq!(line(0, 4).hop_distances(0).get(&3), Some(&3));
}

#[test]
fn closest_snapshot_is_latest_not_after_time() {
    let trace = Trace::new("t", vec![line(10, 2), line(0, 3), line(20, 4)]).unwrap();
    assert_eq!(trace.closest_snapshot(0).time, 0);
    assert_eq!(trace.closest_snapshot(15).time, 10);
    assert_eq!(trace.closest_snapshot(20).time, 20);
    assert_eq!(trace.closest_snapshot(1000).time, 20);
    assert_eq!(trace.end_time(), 20);

    let late = Trace::new("late", vec![line(5, 2)]).unwrap();
    assert_eq!(late.closest_snapshot(0).time, 5);

    assert!(matches!(Trace::new("empty", Vec::new()), Err(TraceError::Empty(_))));
}

#[test]
fn loopback_skips_network() {
    let mut topology = RoutableSnapshot::new(line(0, 2), 1.);
    topology.queue_packets(0, 0, 1, 2, 5.);
    assert!(!topology.any_pending_packets());
    assert_eq!(topology.take_loopback_data(0, 2), 5.);
    assert_eq!(topology.take_loopback_data(0, 2), 0.);
}

#[test]
fn data_moves_one_hop_per_tick() {
    let mut topology = RoutableSnapshot::new(line(0, 3), 10.);
    topology.queue_packets(0, 2, 1, 7, 10.);

    assert_eq!(topology.send_by_unit_time(), (10., 1));
    assert_eq!(topology.take_completed_data(2, 7), 0.);
    assert!(topology.any_pending_packets());

    assert_eq!(topology.send_by_unit_time(), (10., 1));
    assert!(!topology.any_pending_packets());
    assert_eq!(topology.take_completed_data(2, 7), 10.);
    assert_eq!(topology.send_by_unit_time(), (0., 0));
}

#[test]
fn node_bandwidth_is_shared_between_flows() {
    let mut topology = RoutableSnapshot::new(snapshot(0, &[0, 1, 2], &[(0, 1), (0, 2)]), 4.);
    topology.queue_packets(0, 1, 1, 10, 3.);
    topology.queue_packets(0, 2, 1, 20, 3.);

    assert_eq!(topology.send_by_unit_time(), (4., 1));
    assert_eq!(topology.take_completed_data(1, 10), 3.);
    assert_eq!(topology.take_completed_data(2, 20), 1.);
    assert!((topology.pending_size() - 2.).abs() < 1e-9);

    assert_eq!(topology.send_by_unit_time(), (2., 1));
    assert_eq!(topology.take_completed_data(2, 20), 2.);
}

#[test]
fn unreachable_data_waits_for_link() {
    let mut topology = RoutableSnapshot::new(snapshot(0, &[0, 1], &[]), 5.);
    topology.queue_packets(0, 1, 1, 2, 5.);
    assert_eq!(topology.send_by_unit_time(), (0., 0));
    assert!(topology.any_pending_packets());

    assert!(topology.update_topology(&snapshot(1, &[0, 1], &[(0, 1)])).is_empty());
    assert_eq!(topology.send_by_unit_time(), (5., 1));
    assert_eq!(topology.take_completed_data(1, 2), 5.);
}

#[test]
fn departure_drops_data() {
    let mut topology = RoutableSnapshot::new(line(0, 3), 1.);
    topology.queue_packets(0, 2, 1, 2, 5.);
    topology.queue_packets(1, 0, 3, 4, 5.);
    let departed = topology.update_topology(&line(1, 2));
    assert_eq!(departed, vec![2]);
    assert!((topology.pending_size() - 5.).abs() < 1e-9);
    assert_eq!(topology.node_count(), 2);
}

#[test]
fn comm_durations_cover_all_phases() {
    let mut topology = RoutableSnapshot::new(line(0, 2), 1.);
    topology.mark_comm_started(1, "DIST", 2);
    topology.mark_comm_finished(1, "DIST", 2);
    topology.mark_comm_started(1, "DIST", 5);
    topology.mark_comm_finished(1, "DIST", 5);
    topology.mark_comm_started(1, "MAP", 10);
    topology.mark_comm_finished(1, "MAP", 11);

    let record = topology.comm_records(1).unwrap()["DIST"];
    assert_eq!((record.started, record.finished), (2, 5));
    assert_eq!(topology.comm_durations().get(&1), Some(&(4 + 2)));
    assert!(topology.comm_records(0).is_none());
}

#[test]
fn comm_durations_skip_departed_nodes() {
    let mut topology = RoutableSnapshot::new(line(0, 3), 1.);
    topology.mark_comm_started(1, "DIST", 1);
    topology.mark_comm_finished(1, "DIST", 2);
    topology.mark_comm_started(2, "DIST", 1);
    topology.mark_comm_finished(2, "DIST", 3);

    assert_eq!(topology.update_topology(&line(4, 2)), vec![2]);
    assert_eq!(topology.comm_durations().into_iter().collect::<Vec<_>>(), vec![(1, 2)]);
    assert!(topology.comm_records(2).is_some());
}

#[test]
fn failure_rate_counts_departures() {
    let trace = Trace::new(
        "history",
        vec![
            snapshot(0, &[1, 2], &[]),
            snapshot(1, &[1], &[]),
            snapshot(2, &[1, 2], &[]),
            snapshot(3, &[2], &[]),
        ],
    )
    .unwrap();
    let history = DepartureHistory::from_trace(&trace);
    assert_eq!(history.failure_rate(2, 0), 0.);
    assert_eq!(history.failure_rate(2, 1), 1.);
    assert_eq!(history.failure_rate(2, 3), 1. / 3.);
    assert_eq!(history.failure_rate(1, 3), 1. / 3.);
    assert_eq!(history.failure_rate(7, 3), 0.);
}

#[test]
fn remap_is_dense_and_ordered() {
    let remap = NodeIdRemap::from_snapshot(&snapshot(0, &[30, 10, 20], &[]));
    assert_eq!(remap.len(), 3);
    assert_eq!(remap.to_dense(20), Some(1));
    assert_eq!(remap.to_node(2), Some(30));
    assert_eq!(remap.to_dense(40), None);
}
