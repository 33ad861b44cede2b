use manet_topology::snapshot::NodeId;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::{
    profile::CommType,
    task::{Task, TaskId},
};

/// Stable seed derived from a trace id (FNV-1a).
pub fn trace_seed(trace_id: &str) -> u64 {
    trace_id
        .bytes()
        .fold(0xcbf29ce484222325, |hash, byte| (hash ^ byte as u64).wrapping_mul(0x100000001b3))
}

pub fn shuffle<T>(rng: &mut Pcg64, data: &mut [T]) {
    for i in 1..data.len() {
        data.swap(i, rng.gen_range(0..=i));
    }
}

/// Connects every source to every destination node unless the phase is the last one.
pub fn connect_all(sources: &[&Task], dst_nodes: &[NodeId], comm_type: CommType) -> Vec<(TaskId, NodeId)> {
    if comm_type == CommType::None {
        return Vec::new();
    }
    sources
        .iter()
        .flat_map(|task| dst_nodes.iter().map(move |&node| (task.id(), node)))
        .collect()
}
