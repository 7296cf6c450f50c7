//! `atc` - resolve en-route conflicts from the command line.
//!
//! Scenarios are an airspace document plus recorded traffic; see
//! `atc --help` for the subcommands.

use anyhow::{bail, Context, Result};
use atc_cli::{Config, RunReport, Scenario};
use atc_core::{
    populate, run_clock, AirspaceConfig, DynamicTraffic, RecordedTraffic, SimulationClock,
    TrafficGenerator, DEFAULT_SPEEDS,
};
use atc_optim::registry::Registry;
use atc_optim::{AlgorithmRegistry, AlgorithmWorker, ObjectiveRegistry, Params};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// En-route conflict resolution
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Conflict threshold in seconds (overrides ATC_TIME_THRESHOLD)
    #[arg(long, global = true)]
    time_threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List algorithms and objectives with their parameters
    List,

    /// Generate Poisson traffic on every airway of an airspace
    Generate {
        /// Airspace document (JSON)
        #[arg(long)]
        airspace: PathBuf,

        /// Departure window in seconds
        #[arg(long, default_value_t = 3600.0)]
        duration: f64,

        /// Mean seconds between departures on one airway
        #[arg(long, default_value_t = 600.0)]
        mean_interval: f64,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Fly every airway in its published direction only
        #[arg(long)]
        one_way: bool,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Search for a conflict-free schedule
    Optimize {
        #[arg(long)]
        airspace: PathBuf,

        /// Recorded traffic (JSON)
        #[arg(long)]
        traffic: PathBuf,

        #[arg(long, default_value = "AlgorithmRecuit")]
        algorithm: String,

        #[arg(long, default_value = "AbsoluteNumberConflict")]
        objective: String,

        /// Algorithm hyperparameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Objective parameters as a JSON object
        #[arg(long)]
        objective_params: Option<String>,

        /// Wall-clock budget in seconds (overrides ATC_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<f64>,

        /// Write the optimized traffic here
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write the run report (JSON) here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Play a scenario on the simulation clock
    Simulate {
        #[arg(long)]
        airspace: PathBuf,

        #[arg(long)]
        traffic: PathBuf,

        /// Jump straight to this simulation time instead of playing in real time
        #[arg(long)]
        until: Option<f64>,

        /// Simulation seconds per wall-clock second (overrides ATC_SPEED_FACTOR)
        #[arg(long)]
        speed_factor: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("atc=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let threshold = args.time_threshold.unwrap_or(config.time_threshold);

    match args.command {
        Commands::List => list(),
        Commands::Generate {
            airspace,
            duration,
            mean_interval,
            seed,
            one_way,
            out,
        } => {
            if !(mean_interval > 0.0) {
                bail!("--mean-interval must be positive");
            }
            let airspace = AirspaceConfig::load(&airspace)
                .and_then(AirspaceConfig::build)
                .with_context(|| format!("loading airspace {}", airspace.display()))?;
            let generator = DynamicTraffic {
                simulation_duration: duration,
                arrival_rate: 1.0 / mean_interval,
                speeds: DEFAULT_SPEEDS.to_vec(),
                both_directions: !one_way,
                seed,
            };
            let fleet = populate(generator.generate(&airspace)?, threshold)?;
            tracing::info!(
                aircraft = fleet.len(),
                conflicts = fleet.total_unique_conflicts(),
                "traffic generated"
            );

            let recorded = RecordedTraffic::capture(fleet.fleet(), false);
            match out {
                Some(path) => recorded
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", recorded.to_json()?),
            }
            Ok(())
        }
        Commands::Optimize {
            airspace,
            traffic,
            algorithm,
            objective,
            params,
            objective_params,
            timeout,
            out,
            report,
        } => {
            let mut scenario = Scenario::load(&airspace, &traffic, threshold)?;
            let mut params = parse_params(params.as_deref()).context("--params")?;
            let objective_params =
                parse_params(objective_params.as_deref()).context("--objective-params")?;
            if let Some(secs) = timeout.or(config.timeout.map(|d| d.as_secs_f64())) {
                params.entry("timeout").or_insert(secs.into());
            }

            let mut search = AlgorithmRegistry::with_defaults()
                .instantiate(&algorithm, &scenario.fleet, &params)
                .with_context(|| format!("building {algorithm}"))?;
            let goal = ObjectiveRegistry::with_defaults()
                .instantiate(&objective, &scenario.fleet, &objective_params)
                .with_context(|| format!("building {objective}"))?;
            search.set_objective(goal);

            let fleet = scenario.fleet.clone();
            let mut worker = AlgorithmWorker::spawn(search, fleet);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            let mut stopping = false;
            let outcome = loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(outcome) = worker.poll()? {
                            break outcome;
                        }
                        tracing::info!(progress = worker.progress(), "optimizing");
                    }
                    _ = tokio::signal::ctrl_c(), if !stopping => {
                        tracing::warn!("interrupt received, stopping search");
                        worker.stop();
                        stopping = true;
                    }
                }
            };

            scenario.fleet = outcome.fleet;
            let solution = outcome
                .result
                .with_context(|| format!("running {algorithm}"))?;
            let summary = RunReport::new(
                &algorithm,
                &objective,
                &scenario.fleet,
                solution,
                outcome.process_time,
            )?;
            println!("{}", summary.summary());

            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if let Some(path) = out {
                scenario.fleet.apply_schedule(&summary.schedule)?;
                scenario.save_traffic(&path)?;
            }
            Ok(())
        }
        Commands::Simulate {
            airspace,
            traffic,
            until,
            speed_factor,
        } => {
            let mut scenario = Scenario::load(&airspace, &traffic, threshold)?;
            let mut clock = SimulationClock::new(
                config.clock_period,
                speed_factor.unwrap_or(config.speed_factor),
            );

            let state = match until {
                Some(t) => clock.set_time(&mut scenario.fleet, t),
                None => {
                    let (stop_tx, stop_rx) = watch::channel(false);
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            let _ = stop_tx.send(true);
                        }
                    });
                    run_clock(&mut clock, &mut scenario.fleet, stop_rx).await
                }
            };

            let live = scenario.fleet.conflicts();
            println!("t = {:.1} ({state:?}), {} upcoming conflicts", clock.time(), live.len());
            for record in live {
                println!(
                    "  {} / {} over {} at {:.1} and {:.1} ({:.1} s apart)",
                    record.aircraft_one,
                    record.aircraft_two,
                    record.waypoint,
                    record.t1,
                    record.t2,
                    record.time_gap().abs()
                );
            }
            Ok(())
        }
    }
}

fn parse_params(raw: Option<&str>) -> Result<Params> {
    match raw {
        None => Ok(Params::new()),
        Some(raw) => serde_json::from_str(raw).context("expected a JSON object"),
    }
}

fn list() -> Result<()> {
    print_registry("Algorithms", &AlgorithmRegistry::with_defaults());
    print_registry("Objectives", &ObjectiveRegistry::with_defaults());
    Ok(())
}

fn print_registry<C: Copy>(title: &str, registry: &Registry<C>) {
    println!("{title}:");
    for name in registry.list_available() {
        println!("  {name}");
        for spec in registry.constructor_params(name).unwrap_or_default() {
            match &spec.default {
                Some(default) => println!("    {} ({:?}) = {default}", spec.name, spec.kind),
                None => println!("    {} ({:?}), unset", spec.name, spec.kind),
            }
        }
    }
}
