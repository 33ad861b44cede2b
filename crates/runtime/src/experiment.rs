use std::{
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use itertools::Itertools;
use log::error;
use manet_topology::trace::Trace;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::{
    job_result::JobResult,
    placement::PlacerRegistry,
    profile::JobProfile,
    runner::{RunnerConfig, TraceRunner},
};

struct Run {
    cell: usize,
    trial: usize,
    trace: Arc<Trace>,
    job: Arc<(String, JobProfile)>,
    placer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub trace: String,
    pub job: String,
    pub placer: String,
    pub trials: usize,
    pub successes: usize,
    pub result: JobResult,
}

/// Picks one result to represent repeated trials of the same setup.
///
/// If at least half of the trials succeeded, returns the success whose completion time is closest to the mean
/// completion time of successes (first one on ties) with the standard deviation attached. Otherwise returns the
/// first failure.
pub fn aggregate_trials(results: &[JobResult]) -> JobResult {
    let successes = results
        .iter()
        .filter_map(|result| result.completion_time().map(|time| (time as f64, result)))
        .collect::<Vec<_>>();
    if !successes.is_empty() && 2 * successes.len() >= results.len() {
        let mean = successes.iter().map(|(time, _)| time).sum::<f64>() / successes.len() as f64;
        let variance =
            successes.iter().map(|(time, _)| (time - mean).powi(2)).sum::<f64>() / successes.len() as f64;
        let mut closest = &successes[0];
        for candidate in successes.iter().skip(1) {
            if (candidate.0 - mean).abs() < (closest.0 - mean).abs() {
                closest = candidate;
            }
        }
        return closest.1.clone().with_stdev(variance.sqrt());
    }
    results
        .iter()
        .find(|result| result.is_failure())
        .cloned()
        .unwrap_or_else(JobResult::unavailable)
}

/// Runs every placer on every trace and job several times.
pub struct Experiment {
    seed: u64,
    traces: Vec<Arc<Trace>>,
    jobs: Vec<Arc<(String, JobProfile)>>,
    placers: Vec<String>,
    trials: usize,
    config: RunnerConfig,
    registry: Arc<PlacerRegistry>,
}

impl Experiment {
    pub fn new(
        seed: u64,
        traces: Vec<Trace>,
        jobs: Vec<(String, JobProfile)>,
        placers: Vec<String>,
        trials: usize,
        config: RunnerConfig,
        registry: PlacerRegistry,
    ) -> Self {
        Self {
            seed,
            traces: traces.into_iter().map(Arc::new).collect(),
            jobs: jobs.into_iter().map(Arc::new).collect(),
            placers,
            trials: trials.max(1),
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn run(self, threads: usize) -> Vec<RunResult> {
        let cells = self
            .traces
            .iter()
            .cartesian_product(self.jobs.iter())
            .cartesian_product(self.placers.iter())
            .map(|((trace, job), placer)| (trace.clone(), job.clone(), placer.clone()))
            .collect::<Vec<_>>();

        let runs = cells
            .iter()
            .enumerate()
            .cartesian_product(0..self.trials)
            .map(|((cell, (trace, job, placer)), trial)| Run {
                cell,
                trial,
                trace: trace.clone(),
                job: job.clone(),
                placer: placer.clone(),
            })
            .collect::<Vec<_>>();

        let total_runs = runs.len();

        let finished_run_atomic = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let pool = ThreadPool::new(threads.max(1));
        let start_time = Instant::now();
        for run in runs.into_iter() {
            let finished_run_atomic = finished_run_atomic.clone();
            let results = results.clone();
            let registry = self.registry.clone();
            let seed = self.seed;
            let config = self.config;
            pool.execute(move || {
                let result = match registry.resolve(&run.placer, seed.wrapping_add(run.trial as u64)) {
                    None => JobResult::unavailable(),
                    Some(placer) => {
                        let mut runner = TraceRunner::new(&run.trace, run.job.1.clone(), placer, config);
                        runner.run().unwrap_or_else(|e| {
                            error!(
                                "trial {} of {} on trace {} aborted: {}",
                                run.trial,
                                run.placer,
                                run.trace.id(),
                                e
                            );
                            JobResult::unavailable()
                        })
                    }
                };

                results.lock().unwrap().push((run.cell, run.trial, result));

                finished_run_atomic.fetch_add(1, Ordering::SeqCst);
                let finished_runs = finished_run_atomic.load(Ordering::SeqCst);

                let elapsed = start_time.elapsed();
                let remaining = Duration::from_secs_f64(
                    elapsed.as_secs_f64() / finished_runs as f64 * (total_runs - finished_runs) as f64,
                );
                print!("\r{}", " ".repeat(70));
                print!(
                    "\rFinished {}/{} [{}%] runs in {:.2?}, remaining time: {:.2?}",
                    finished_runs,
                    total_runs,
                    (finished_runs as f64 * 100. / total_runs as f64).round() as i32,
                    elapsed,
                    remaining
                );
                std::io::stdout().flush().unwrap();
            });
        }

        pool.join();

        print!("\r{}", " ".repeat(70));
        println!("\rFinished {} runs in {:.2?}", total_runs, start_time.elapsed());

        let mut trial_results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
        trial_results.sort_by_key(|(cell, trial, _)| (*cell, *trial));

        let mut grouped = vec![Vec::new(); cells.len()];
        for (cell, _trial, result) in trial_results.into_iter() {
            grouped[cell].push(result);
        }

        cells
            .into_iter()
            .zip(grouped)
            .map(|((trace, job, placer), results)| RunResult {
                trace: trace.id().to_string(),
                job: job.0.clone(),
                placer,
                trials: results.len(),
                successes: results.iter().filter(|result| result.is_success()).count(),
                result: aggregate_trials(&results),
            })
            .collect()
    }
}
