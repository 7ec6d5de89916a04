use std::env;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use log::info;

use kubernetriks_planner::config::SimulationConfig;
use kubernetriks_planner::metrics::occupancy::ResourceAccountant;
use kubernetriks_planner::metrics::printer::{
    print_outcome_as_json, print_outcome_as_pretty_table,
};
use kubernetriks_planner::planner::capacity_planner::CapacityPlanner;
use kubernetriks_planner::planner::interface::{DecisionMaker, PlanOutcome};
use kubernetriks_planner::planner::prompt::{AbortOnFailure, InteractivePrompt};

const LOG_FILE_SIZE_LIMIT: usize = 100 * 1024 * 1024;

#[derive(Parser)]
struct Args {
    #[clap(short, long)]
    config_file: PathBuf,
    /// Write the report as JSON into this file instead of printing tables.
    #[clap(short, long)]
    output_file: Option<PathBuf>,
    /// Abort on the first run with unscheduled pods or a violated policy.
    #[clap(long)]
    non_interactive: bool,
    /// Extended resource shown in the report next to cpu and memory.
    #[clap(long)]
    extended_resource: Option<String>,
}

fn init_logger(logs_filepath: Option<&str>) {
    // log level INFO by default
    let mut env_logger_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        env_logger_builder.filter_level(log::LevelFilter::Info);
    }
    if let Some(path) = logs_filepath {
        let log_file = FileRotate::new(
            path,
            AppendCount::new(3),
            ContentLimit::Bytes(LOG_FILE_SIZE_LIMIT),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        env_logger_builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    env_logger_builder.init();
}

async fn plan<D: DecisionMaker>(
    config: &SimulationConfig,
    decision_maker: D,
) -> anyhow::Result<PlanOutcome> {
    let policy = config.policy().context("invalid utilization policy")?;
    let mut planner = CapacityPlanner::new(
        config.cluster_resources(),
        config.app_resources(),
        Box::new(config.scheduler_algorithm()),
        decision_maker,
    )
    .with_new_node(config.new_node.clone())
    .with_policy(policy);

    let outcome = planner.run().await.context("capacity planning failed")?;
    Ok(outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = SimulationConfig::from_file(&args.config_file)
        .with_context(|| format!("could not load config {:?}", args.config_file))?;
    init_logger(config.logs_filepath.as_deref());

    info!("Simulation {:?}", config.sim_name);
    info!("Path to config file: {:?}", args.config_file);

    let outcome = if args.non_interactive {
        plan(&config, AbortOnFailure::default()).await?
    } else {
        plan(&config, InteractivePrompt::stdio()).await?
    };

    let extended_resource = args.extended_resource.as_deref().or(config
        .policy
        .extended
        .as_ref()
        .map(|extended| extended.resource.as_str()));
    let accountant = ResourceAccountant::new(extended_resource);

    match &args.output_file {
        Some(output_file) => print_outcome_as_json(output_file, &outcome, &accountant)
            .with_context(|| format!("could not write report {:?}", output_file))?,
        None => print_outcome_as_pretty_table(&mut std::io::stdout(), &outcome, &accountant)
            .context("could not print report")?,
    }
    Ok(())
}
