//! Mobility trace: time-ordered sequence of topology snapshots.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{routable::RoutableSnapshot, snapshot::Snapshot};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace {0} has no snapshots")]
    Empty(String),
}

/// YAML representation of a [Trace].
#[derive(Serialize, Deserialize)]
pub struct YamlTrace {
    pub id: String,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
}

/// Replayed sequence of snapshots.
#[derive(Clone, Debug)]
pub struct Trace {
    id: String,
    snapshots: Vec<Snapshot>,
}

impl Trace {
    /// Creates trace from snapshots in any order. Links are normalized and snapshots are sorted by time.
    pub fn new(id: impl Into<String>, snapshots: Vec<Snapshot>) -> Result<Self, TraceError> {
        let id = id.into();
        if snapshots.is_empty() {
            return Err(TraceError::Empty(id));
        }
        let mut snapshots = snapshots
            .into_iter()
            .map(|snapshot| {
                let mut normalized = Snapshot::new(snapshot.time);
                normalized.nodes = snapshot.nodes;
                for (a, b) in snapshot.links {
                    normalized.add_link(a, b);
                }
                normalized
            })
            .collect::<Vec<_>>();
        snapshots.sort_by_key(|snapshot| snapshot.time);
        Ok(Trace { id, snapshots })
    }

    /// Read [Trace] from YAML file. Panic on error.
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Self {
        let yaml: YamlTrace = serde_yaml::from_str(
            &std::fs::read_to_string(&file).unwrap_or_else(|_| panic!("Can't read file {}", file.as_ref().display())),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {e:?}", file.as_ref().display()));
        Trace::new(yaml.id, yaml.snapshots).unwrap_or_else(|e| panic!("Invalid trace {}: {e}", file.as_ref().display()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Latest snapshot taken not later than `time`, or the first one if `time` precedes the whole trace.
    pub fn closest_snapshot(&self, time: u64) -> &Snapshot {
        let index = self.snapshots.partition_point(|snapshot| snapshot.time <= time);
        &self.snapshots[index.saturating_sub(1)]
    }

    /// Fresh routable topology built from [closest_snapshot](Trace::closest_snapshot).
    pub fn closest_routable_snapshot(&self, time: u64, link_bandwidth: f64) -> RoutableSnapshot {
        RoutableSnapshot::new(self.closest_snapshot(time).clone(), link_bandwidth)
    }

    /// Time of the last snapshot.
    pub fn end_time(&self) -> u64 {
        self.snapshots.last().map(|snapshot| snapshot.time).unwrap_or(0)
    }
}
