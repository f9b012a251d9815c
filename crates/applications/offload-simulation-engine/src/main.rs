//! Offload Simulation CLI
//!
//! Command-line interface for comparing dispatch policies on a
//! battery-constrained robot
//!
//! Binary: offload-sim

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offload_core::Task;
use offload_simulation_engine::{
    metrics::{RuleValidation, SummaryStatistics},
    policy::policy_from_name,
    sweep::{self, SweepPoint, SweepSpec},
    FixedCountDiscipline, RunOutcome, Simulation, SimulationConfig,
};

#[derive(Parser)]
#[command(name = "offload-sim")]
#[command(about = "Simulate battery-aware LOCAL/EDGE/CLOUD task offloading", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Random seed for the task generator
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Initial battery SoC (%)
    #[arg(long, global = true)]
    initial_soc: Option<f64>,

    /// Policies to compare (comma-separated: threshold,local,edge,cloud)
    #[arg(short, long, global = true, default_value = "threshold")]
    policies: String,

    /// Output JSON file, or a directory to write a timestamped file into
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a fixed number of generated tasks
    Run {
        /// Number of tasks
        #[arg(short, long)]
        tasks: Option<usize>,

        /// JSON array of tasks to run instead of generated ones
        #[arg(long)]
        tasks_file: Option<PathBuf>,

        /// How tasks are fed to the dispatcher
        #[arg(short, long, value_enum, default_value_t = Discipline::ClosedLoop)]
        discipline: Discipline,
    },

    /// Poisson arrivals over a time window
    Arrivals {
        /// Arrival window in simulated seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Sweep initial SoC for every policy
    Sweep {
        /// Initial SoC levels (comma-separated)
        #[arg(long, default_value = "10,20,30,40,50,60,70,80,90")]
        socs: String,

        /// Tasks per point
        #[arg(short, long)]
        tasks: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = Discipline::ClosedLoop)]
        discipline: Discipline,
    },

    /// Sweep labelled configuration overrides from a JSON sweep file
    Params {
        /// Sweep file: base configuration plus per-section overrides
        spec: PathBuf,

        /// Tasks per point
        #[arg(short, long)]
        tasks: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = Discipline::ClosedLoop)]
        discipline: Discipline,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Discipline {
    Open,
    ClosedLoop,
}

impl From<Discipline> for FixedCountDiscipline {
    fn from(d: Discipline) -> Self {
        match d {
            Discipline::Open => FixedCountDiscipline::Open,
            Discipline::ClosedLoop => FixedCountDiscipline::ClosedLoop,
        }
    }
}

/// One policy's run as written to JSON
#[derive(Serialize)]
struct RunReport {
    summary: SummaryStatistics,
    validation: RuleValidation,
    outcome: RunOutcome,
}

#[derive(Serialize)]
struct RunFile<'a> {
    generated_at: String,
    config: &'a SimulationConfig,
    runs: &'a [RunReport],
}

#[derive(Serialize)]
struct SweepFile<'a> {
    generated_at: String,
    config: &'a SimulationConfig,
    points: &'a [SweepPoint],
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offload_sim=info,offload_simulation_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(soc) = cli.initial_soc {
        config.battery.initial_soc = soc;
    }

    let policies: Vec<String> = cli
        .policies
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if policies.is_empty() {
        bail!("No policies given");
    }

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Offload Simulation Engine                               ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    match cli.command {
        Commands::Run { tasks, tasks_file, discipline } => {
            if let Some(tasks) = tasks {
                config.num_tasks = tasks;
            }
            config.validate()?;
            print_configuration(&config);

            let task_list = match &tasks_file {
                Some(path) => {
                    let json = fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let list: Vec<Task> = serde_json::from_str(&json)
                        .with_context(|| format!("Invalid task list {}", path.display()))?;
                    println!("Loaded {} tasks from {}\n", list.len(), path.display());
                    Some(list)
                }
                None => None,
            };

            let mut reports = Vec::new();
            for name in &policies {
                let sim = Simulation::new(&config, policy_from_name(name)?)?;
                let outcome = match &task_list {
                    Some(list) => {
                        print!("Running {} tasks with {} policy... ", list.len(), name);
                        sim.run_fixed_count(list.clone(), discipline.into())?
                    }
                    None => {
                        print!("Running {} tasks with {} policy... ", config.num_tasks, name);
                        sim.run_generated(config.num_tasks, discipline.into())?
                    }
                };
                println!("Done");
                reports.push(report(outcome));
            }

            print_results(&reports);
            write_runs(cli.output.as_deref(), "run", &config, &reports)?;
            check_rules(&reports)?;
        }
        Commands::Arrivals { duration } => {
            if let Some(duration) = duration {
                config.duration_s = duration;
            }
            config.validate()?;
            print_configuration(&config);

            let mut reports = Vec::new();
            for name in &policies {
                print!("Running {:.1}s of arrivals with {} policy... ", config.duration_s, name);
                let sim = Simulation::new(&config, policy_from_name(name)?)?;
                let outcome = sim.run_arrivals(config.duration_s)?;
                println!("Done");
                reports.push(report(outcome));
            }

            print_results(&reports);
            write_runs(cli.output.as_deref(), "arrivals", &config, &reports)?;
            check_rules(&reports)?;
        }
        Commands::Sweep { socs, tasks, discipline } => {
            if let Some(tasks) = tasks {
                config.num_tasks = tasks;
            }
            config.validate()?;
            let socs = sweep::parse_soc_levels(&socs)?;
            sweep::check_sweep_inputs(&socs, &policies)?;
            print_configuration(&config);

            println!("Sweeping {} SoC levels × {} policies...", socs.len(), policies.len());
            let points = run_sweep(&config, socs, policies, discipline.into())?;

            print_sweep(&points);
            write_sweep(cli.output.as_deref(), "sweep", &config, &points)?;
            check_points(&points)?;
        }
        Commands::Params { spec, tasks, discipline } => {
            let mut sweep_spec = SweepSpec::from_json_file(&spec)
                .with_context(|| format!("Failed to load sweep file {}", spec.display()))?;
            if let Some(seed) = cli.seed {
                sweep_spec.base.seed = seed;
            }
            if let Some(soc) = cli.initial_soc {
                sweep_spec.base.battery.initial_soc = soc;
            }
            if let Some(tasks) = tasks {
                sweep_spec.base.num_tasks = tasks;
            }
            sweep_spec.base.validate()?;
            print_configuration(&sweep_spec.base);

            if let Some(name) = &sweep_spec.name {
                println!("Sweep: {name}");
            }
            if let Some(description) = &sweep_spec.description {
                println!("  {description}");
            }
            let points = sweep::run_parameter_sweep(&sweep_spec, &policies, discipline.into())?;

            print_sweep(&points);
            write_sweep(cli.output.as_deref(), "params", &sweep_spec.base, &points)?;
            check_points(&points)?;
        }
    }

    println!("\n✅ Simulation complete!\n");
    Ok(())
}

#[cfg(feature = "async")]
fn run_sweep(
    config: &SimulationConfig,
    socs: Vec<f64>,
    policies: Vec<String>,
    discipline: FixedCountDiscipline,
) -> anyhow::Result<Vec<SweepPoint>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let points = runtime.block_on(sweep::run_soc_sweep_async(
        config.clone(),
        socs,
        policies,
        discipline,
    ))?;
    Ok(points)
}

#[cfg(not(feature = "async"))]
fn run_sweep(
    config: &SimulationConfig,
    socs: Vec<f64>,
    policies: Vec<String>,
    discipline: FixedCountDiscipline,
) -> anyhow::Result<Vec<SweepPoint>> {
    Ok(sweep::run_soc_sweep(config, &socs, &policies, discipline)?)
}

fn report(outcome: RunOutcome) -> RunReport {
    let metrics = outcome.metrics();
    RunReport {
        summary: metrics.summary(),
        validation: metrics.validate_hard_rules(outcome.cloud_threshold),
        outcome,
    }
}

fn print_configuration(config: &SimulationConfig) {
    println!("Configuration:");
    println!("  Seed: {}", config.seed);
    println!(
        "  Battery: {:.1} Wh at {:.1}%",
        config.battery.capacity_wh, config.battery.initial_soc
    );
    println!(
        "  Service rates: local {:.2e}, edge {:.2e}, cloud {:.2e} ops/s",
        config.local.service_rate, config.edge.service_rate, config.cloud.service_rate
    );
    println!(
        "  Edge link: {}/{} Mbps, {} ms RTT",
        config.edge_link.bw_up_mbps, config.edge_link.bw_down_mbps, config.edge_link.rtt_ms
    );
    println!(
        "  Cloud link: {}/{} Mbps, {} ms RTT",
        config.cloud_link.bw_up_mbps, config.cloud_link.bw_down_mbps, config.cloud_link.rtt_ms
    );
    println!("  Arrival rate: {:.2} tasks/s\n", config.workload.arrival_rate);
}

fn print_results(reports: &[RunReport]) {
    println!("\n╔══════════════════════════════════════════════════════════╗");
    println!("║  Simulation Results                                      ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    println!(
        "{:<18} {:>7} {:>7} {:>17} {:>10} {:>10} {:>11} {:>9} {:>7} {:>6}",
        "Policy", "Tasks", "Skipped", "Local/Edge/Cloud", "Mean (ms)", "P95 (ms)", "Energy (Wh)",
        "Final SoC", "Misses", "Rules"
    );
    println!("{}", "-".repeat(112));

    for r in reports {
        let s = &r.summary;
        println!(
            "{:<18} {:>7} {:>7} {:>17} {:>10.1} {:>10.1} {:>11.5} {:>8.2}% {:>7} {:>6}",
            r.outcome.policy_name,
            s.total_tasks,
            r.outcome.skipped,
            format!("{}/{}/{}", s.local_count, s.edge_count, s.cloud_count),
            s.latency_mean_ms,
            s.latency_p95_ms,
            s.total_energy_wh,
            s.final_soc,
            s.deadline_misses,
            if r.validation.passed() { "OK" } else { "FAIL" },
        );
    }
}

fn print_sweep(points: &[SweepPoint]) {
    println!("\n{:<16} {:>8} {:<18} {:>10} {:>10} {:>11} {:>9} {:>6}",
        "Label", "SoC (%)", "Policy", "Mean (ms)", "P95 (ms)", "Energy (Wh)", "Final SoC", "Rules");
    println!("{}", "-".repeat(97));

    for p in points {
        match &p.summary {
            Some(s) => println!(
                "{:<16} {:>8.1} {:<18} {:>10.1} {:>10.1} {:>11.5} {:>8.2}% {:>6}",
                p.label,
                p.initial_soc,
                p.policy,
                s.latency_mean_ms,
                s.latency_p95_ms,
                s.total_energy_wh,
                s.final_soc,
                if p.rules_valid { "OK" } else { "FAIL" },
            ),
            None => println!(
                "{:<16} {:>8.1} {:<18} FAILED: {}",
                p.label,
                p.initial_soc,
                p.policy,
                p.error.as_deref().unwrap_or("unknown error"),
            ),
        }
    }
}

/// Resolve `--output`: a directory gets `<prefix>_<timestamp>.json` inside it
fn output_path(output: &Path, prefix: &str) -> PathBuf {
    if output.is_dir() {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        output.join(format!("{prefix}_{stamp}.json"))
    } else {
        output.to_path_buf()
    }
}

fn write_json(path: &Path, json: String) -> anyhow::Result<()> {
    println!("\nWriting results to {}...", path.display());
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Results saved");
    Ok(())
}

fn write_runs(
    output: Option<&Path>,
    prefix: &str,
    config: &SimulationConfig,
    reports: &[RunReport],
) -> anyhow::Result<()> {
    let Some(output) = output else {
        return Ok(());
    };
    let file = RunFile {
        generated_at: chrono::Local::now().to_rfc3339(),
        config,
        runs: reports,
    };
    write_json(&output_path(output, prefix), serde_json::to_string_pretty(&file)?)
}

fn write_sweep(
    output: Option<&Path>,
    prefix: &str,
    config: &SimulationConfig,
    points: &[SweepPoint],
) -> anyhow::Result<()> {
    let Some(output) = output else {
        return Ok(());
    };
    let file = SweepFile {
        generated_at: chrono::Local::now().to_rfc3339(),
        config,
        points,
    };
    write_json(&output_path(output, prefix), serde_json::to_string_pretty(&file)?)
}

fn check_points(points: &[SweepPoint]) -> anyhow::Result<()> {
    let failed: Vec<&SweepPoint> = points.iter().filter(|p| !p.succeeded()).collect();
    for p in &failed {
        warn!(label = %p.label, policy = %p.policy, error = p.error.as_deref().unwrap_or(""), "Sweep point failed");
    }
    if !failed.is_empty() {
        bail!("{} of {} sweep points failed", failed.len(), points.len());
    }
    if let Some(p) = points.iter().find(|p| !p.rules_valid) {
        bail!("Hard rules failed for {} under policy {}", p.label, p.policy);
    }
    Ok(())
}

fn check_rules(reports: &[RunReport]) -> anyhow::Result<()> {
    for r in reports {
        if !r.validation.passed() {
            for violation in &r.validation.violations {
                warn!(policy = %r.outcome.policy_name, "{violation}");
            }
            bail!("Hard rules failed for policy {}", r.outcome.policy_name);
        }
    }
    Ok(())
}
