//! Interface of task placement heuristics and the registry resolving them by name.

use std::collections::{BTreeMap, HashMap};

use manet_topology::{history::HistoryStat, remap::NodeIdRemap, routable::RoutableSnapshot, trace::Trace};

use crate::{
    allocation::AllocationResult,
    placers::{
        degree::DegreePlacer, estimation::EstimationPlacer, local::LocalPlacer, random::RandomPlacer,
    },
    profile::{JobProfile, PhaseProfile},
    runner::Clock,
    task::Task,
};

/// Decides which nodes receive the output of each source task of a phase.
///
/// Must return the same allocation for identical inputs.
pub trait Placer: Send {
    /// Name used in logs and results.
    fn name(&self) -> &str;

    /// Clock the runner reads the trace with. Placers which simulate candidate allocations ahead run on the
    /// estimated clock they simulate with.
    fn clock(&self) -> Clock {
        Clock::Real
    }

    fn estimation_aware(&self) -> bool {
        self.clock() != Clock::Real
    }

    #[allow(clippy::too_many_arguments)]
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
    ) -> AllocationResult;
}

/// Creates a placer from parsed parameters and a seed.
pub type PlacerFactory = fn(&HashMap<&str, &str>, u64) -> Box<dyn Placer>;

/// Splits `Name[key=value,...]` into the name and parameters.
pub fn read_name(name: &str) -> (&str, HashMap<&str, &str>) {
    let Some(open) = name.find('[') else {
        return (name, HashMap::new());
    };
    let close = name.rfind(']').filter(|&close| close > open).unwrap_or(name.len());
    (
        &name[..open],
        name[open + 1..close]
            .split(',')
            .filter_map(|s| s.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect(),
    )
}

/// Parses parameter `key` or returns `default` if it is missing or malformed.
pub fn param<T: std::str::FromStr>(args: &HashMap<&str, &str>, key: &str, default: T) -> T {
    args.get(key).and_then(|value| value.parse().ok()).unwrap_or(default)
}

/// Maps placer names to factories.
#[derive(Clone, Default)]
pub struct PlacerRegistry {
    factories: BTreeMap<String, PlacerFactory>,
}

impl PlacerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in placers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Random", |args, seed| {
            Box::new(RandomPlacer::new(seed, param(args, "dst_count", RandomPlacer::DEFAULT_DST_COUNT)))
        });
        registry.register("Local", |_args, _seed| Box::new(LocalPlacer::new()));
        registry.register("Degree", |args, _seed| {
            Box::new(DegreePlacer::new(param(args, "dst_count", DegreePlacer::DEFAULT_DST_COUNT)))
        });
        registry.register("Estimation", |args, seed| {
            Box::new(EstimationPlacer::new(
                seed,
                param(args, "dst_count", EstimationPlacer::DEFAULT_DST_COUNT),
                param(args, "random_candidates", EstimationPlacer::DEFAULT_RANDOM_CANDIDATES),
                param(args, "horizon", EstimationPlacer::DEFAULT_HORIZON),
                param(args, "speedup", EstimationPlacer::DEFAULT_SPEEDUP),
            ))
        });
        registry
    }

    pub fn register(&mut self, name: &str, factory: PlacerFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Creates placer from `Name[key=value,...]`. Returns `None` for unknown names.
    pub fn resolve(&self, name: &str, seed: u64) -> Option<Box<dyn Placer>> {
        let (name, args) = read_name(name);
        self.factories.get(name).map(|factory| factory(&args, seed))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|name| name.as_str())
    }
}
