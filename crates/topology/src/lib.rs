//! Mobile multi-hop network substrate: topology snapshots, replayed traces and data transfer between nodes.

pub mod history;
pub mod remap;
pub mod routable;
pub mod snapshot;
pub mod trace;
