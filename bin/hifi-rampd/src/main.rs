//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "binary"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Binary entrypoint for the ramp controller daemon."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hifi_ramp_common::config::RampConfig;
use hifi_ramp_common::logging::init_tracing;
use hifi_ramp_core::{PvNames, RampController, RampRuntime, SimulatedSupply};
use hifi_ramp_metrics::{new_registry, spawn_exporter, ControllerMetrics, DaemonMetrics};
use hifi_ramp_table::{load_table, BreakpointTable, RampTableError, SCALE};
use tokio::signal;
use tracing::{info, warn};

const SIMULATION_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "HiFi cryomagnet ramp controller daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Override the ramp table path")]
    ramp_table: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the controller against the simulated supply")]
    Run,
    #[command(about = "Load the ramp table and print its breakpoints")]
    ShowTable {
        #[arg(long, help = "Print the table as JSON")]
        json: bool,
    },
    #[command(about = "Estimate the ramp time from an output to a final target")]
    Estimate {
        #[arg(long, help = "Current output in Tesla")]
        output: f64,
        #[arg(long, help = "Final target in Tesla")]
        target: f64,
        #[arg(long, help = "Calibration constant; defaults to the configured value")]
        constant: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/hifi-ramp.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = RampConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(path) = cli.ramp_table {
        config.supply.ramp_table_path = path;
    }
    let load_duration = load_started.elapsed();

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());

    let log_file = init_tracing(&config.supply.prefix, &config.logging)?;
    info!(config_path = %loaded.source.display(), log_file = %log_file.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            daemon_metrics.inc_start();
            run_daemon(config, daemon_metrics).await?
        }
        Commands::ShowTable { json } => {
            let table = load(&config)?;
            render_table(&table, json)?;
        }
        Commands::Estimate {
            output,
            target,
            constant,
        } => {
            let table = load(&config)?;
            let constant = constant.unwrap_or(config.defaults.constant);
            render_estimate(&table, output, target, constant)?;
        }
    }

    Ok(())
}

async fn run_daemon(config: RampConfig, daemon_metrics: DaemonMetrics) -> Result<()> {
    let registry = daemon_metrics.registry();
    let exporter = spawn_exporter(registry.clone(), &config.metrics, &config.supply.prefix)?;
    if let Some(exporter) = &exporter {
        info!(url = %format!("http://{}{}", exporter.addr(), exporter.route()), "scrape endpoint ready");
    }

    let (supply, events) = SimulatedSupply::new(PvNames::new(&config.supply.prefix));
    let supply = Arc::new(supply);
    let controller = RampController::new(supply.clone(), &config)
        .with_metrics(ControllerMetrics::new(registry)?);
    let handle = RampRuntime::new(controller, events, config.ramp.evaluation_interval).spawn();

    let simulation = {
        let supply = supply.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SIMULATION_STEP);
            loop {
                interval.tick().await;
                supply.advance(SIMULATION_STEP);
            }
        })
    };

    info!(device = %config.supply.prefix, "daemon running; waiting for termination signal");
    let mut state = handle.subscribe_state();
    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("ctrl-c received; shutting down");
        }
        _ = async { while state.changed().await.is_ok() {} } => {
            warn!("ramp runtime exited");
        }
    }
    simulation.abort();
    let outcome = handle.shutdown().await;

    if let Some(exporter) = exporter {
        exporter.shutdown().await?;
    }
    outcome
}

fn load(config: &RampConfig) -> Result<BreakpointTable> {
    let path = &config.supply.ramp_table_path;
    load_table(path).with_context(|| format!("failed to load ramp table {}", path.display()))
}

fn render_table(table: &BreakpointTable, json: bool) -> Result<()> {
    if json {
        let rows: Vec<_> = table.valid().map(|(_, row)| row).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    println!("{:>5} {:>12} {:>12} {:>10}", "index", "target", "tesla", "rate");
    for (index, row) in table.valid() {
        println!(
            "{:>5} {:>12} {:>12.4} {:>10}",
            index,
            row.target,
            row.target / SCALE,
            row.rate
        );
    }
    Ok(())
}

fn render_estimate(table: &BreakpointTable, output: f64, target: f64, constant: f64) -> Result<()> {
    let final_target = target * SCALE;
    let seconds = table.duration_to_target(output * SCALE, final_target, constant)?;
    match table.find_nearest_breakpoint(output, final_target) {
        Ok(index) => {
            let next = table.entries()[index];
            println!("next breakpoint: #{index} target {} rate {}", next.target, next.rate);
        }
        Err(RampTableError::TableOutOfRange) => {
            println!("next breakpoint: none (target beyond table)");
        }
        Err(err) => return Err(err.into()),
    }
    println!("estimated ramp time: {seconds:.1}");
    Ok(())
}
