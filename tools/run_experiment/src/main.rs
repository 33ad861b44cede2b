use std::{
    collections::BTreeMap,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use env_logger::Builder;
use manet_mr::{
    experiment::{Experiment, RunResult},
    job_result::JobResult,
    placement::PlacerRegistry,
    profile::JobProfile,
    runner::RunnerConfig,
};
use manet_topology::trace::Trace;
use serde::Deserialize;

fn default_trials() -> usize {
    1
}

#[derive(Deserialize)]
struct Config {
    #[serde(default)]
    seed: u64,
    #[serde(default = "default_trials")]
    trials: usize,
    #[serde(default)]
    runner: RunnerConfig,
    traces: Vec<PathBuf>,
    jobs: Vec<PathBuf>,
    placers: Vec<String>,
}

/// Runs placement heuristics over mobility traces.
#[derive(Parser, Debug)]
struct Args {
    /// Path to config.
    #[arg(short, long)]
    config: PathBuf,

    /// Path to file with results.
    #[arg(short, long)]
    output: PathBuf,

    /// Do not run experiments, just read results from --output.
    #[arg(long)]
    precalculated: bool,

    /// Number of threads.
    #[arg(long, default_value_t = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))]
    threads: usize,
}

fn filename(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

#[derive(Default)]
struct ResultRow {
    runs: usize,
    successes: usize,
    unavailable: usize,
    completion_times: Vec<f64>,
    traffic: Vec<f64>,
    failed_phases: BTreeMap<&'static str, usize>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config: Config = serde_yaml::from_str(&std::fs::read_to_string(args.config).expect("Can't read config file"))
        .expect("Can't parse config file");

    let result: Vec<RunResult> = if args.precalculated {
        serde_json::from_str(&std::fs::read_to_string(args.output).expect("Can't read file with result"))
            .expect("Can't parse file with result")
    } else {
        let experiment = Experiment::new(
            config.seed,
            config.traces.iter().map(Trace::from_yaml).collect(),
            config
                .jobs
                .iter()
                .enumerate()
                .map(|(i, path)| (format!("{}_{}", i, filename(path)), JobProfile::from_yaml(path)))
                .collect(),
            config.placers,
            config.trials,
            config.runner,
            PlacerRegistry::with_defaults(),
        );

        let result = experiment.run(args.threads);
        File::create(args.output)
            .expect("Can't create output file")
            .write_all(serde_json::to_string_pretty(&result).unwrap().as_bytes())
            .expect("Can't write to output file");
        result
    };

    let mut rows: BTreeMap<String, ResultRow> = BTreeMap::new();
    for run in result.iter() {
        let row = rows.entry(run.placer.clone()).or_default();
        row.runs += 1;
        match &run.result {
            JobResult::Succeeded(success) => {
                row.successes += 1;
                row.completion_times.push(success.completion_time as f64);
                row.traffic.push(success.traffic);
            }
            JobResult::Failed { phase, .. } => *row.failed_phases.entry(phase.name()).or_default() += 1,
            JobResult::Unavailable => row.unavailable += 1,
        }
    }

    let width = rows.keys().map(|name| name.len()).max().unwrap_or(0).max("placer".len());
    println!(
        "| {: <width$} | success | avg completion time | avg traffic | failures by phase |",
        "placer",
        width = width
    );
    println!(
        "|-{:-<width$}-|---------|---------------------|-------------|-------------------|",
        "",
        width = width
    );
    for (name, row) in rows.into_iter() {
        let available = row.runs - row.unavailable;
        println!(
            "| {: <width$} | {: >6.1}% | {: >19.2} | {: >11.2} | {: <17} |",
            name,
            if available == 0 {
                0.
            } else {
                row.successes as f64 * 100. / available as f64
            },
            mean(&row.completion_times),
            mean(&row.traffic),
            row.failed_phases
                .iter()
                .map(|(phase, count)| format!("{}={}", phase, count))
                .collect::<Vec<_>>()
                .join(","),
            width = width
        );
    }
}
