//! txplan - Solana transaction planner
//!
//! Reads a JSON instruction plan document, packs it into the fewest
//! size-valid transactions and prints the resulting transaction plan.
//!
//! ## Features
//!
//! - **Packing**: sequential, non-divisible and parallel instruction groups
//! - **Message packers**: instruction lists spread over as many messages as needed
//! - **Compute budget**: provisory compute unit limits, optionally estimated by simulation

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txplan::config::Config;
use txplan::metrics::metrics;
use txplan::tx_planner::{
    compute_unit_limit_instruction_index_and_units, fill_provisory_compute_unit_limit,
    CapacityOracle, ComputeUnitEstimator, PlanDocument, RpcSimulator, StaticMessageFactory,
    TransactionMessage, TransactionPlan, TransactionPlanner, WireSizeOracle,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan an instruction plan document into transactions
    Plan {
        /// Path to the JSON instruction plan document
        #[arg(short, long)]
        input: String,

        /// Estimate compute unit limits by simulating every planned transaction
        #[arg(long)]
        estimate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;

    match args.command {
        Command::Plan { input, estimate } => {
            if estimate {
                config.compute_budget.fill_provisory_limit = true;
                config.compute_budget.estimate = true;
            }
            let report = run_plan(&config, &input).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if config.monitoring.enable_metrics {
        eprintln!("{}", metrics().export_text()?);
    }
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "txplan=debug,info"
    } else {
        "txplan=info,warn,error"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}

async fn run_plan(config: &Config, input: &str) -> Result<Value> {
    info!("Loading instruction plan from: {}", input);
    let document = PlanDocument::from_file(input)?;
    let instruction_plan = document.instruction_plan()?;

    let mut template = document.message_template(config.planner.transaction_version)?;
    if config.compute_budget.fill_provisory_limit {
        template = fill_provisory_compute_unit_limit(&template);
    }

    let oracle = WireSizeOracle::with_size_limit(config.planner.size_limit);
    let planner =
        TransactionPlanner::new(StaticMessageFactory::new(template)).with_oracle(oracle);

    let abort = CancellationToken::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, aborting");
            ctrl_c.cancel();
        }
    });

    let plan = planner
        .plan_with_abort(&instruction_plan, &abort)
        .await
        .context("Failed to plan instructions")?;

    let mut messages: Vec<TransactionMessage> = plan.messages().into_iter().cloned().collect();
    if config.compute_budget.estimate {
        let client = Arc::new(RpcClient::new_with_timeout(
            config.rpc.endpoint.clone(),
            Duration::from_secs(config.rpc.timeout_secs),
        ));
        let estimator = ComputeUnitEstimator::new(RpcSimulator::new(client));
        for message in messages.iter_mut() {
            *message = estimator
                .estimate_and_update_provisory_compute_unit_limit(message, &abort)
                .await
                .context("Failed to estimate compute unit limit")?;
        }
    }

    let mut leaves = messages.iter();
    let tree = describe(&plan, &mut leaves, &oracle)?;
    Ok(json!({
        "transactions": plan.transaction_count(),
        "instructions": plan.instructions().len(),
        "plan": tree,
    }))
}

/// JSON shape of the plan, taking leaf messages in traversal order from `leaves`
fn describe<'a>(
    plan: &TransactionPlan,
    leaves: &mut impl Iterator<Item = &'a TransactionMessage>,
    oracle: &dyn CapacityOracle,
) -> Result<Value> {
    Ok(match plan {
        TransactionPlan::Single(_) => {
            let message = leaves
                .next()
                .context("transaction plan has more leaves than messages")?;
            json!({
                "kind": "single",
                "instructions": message.instructions().len(),
                "size": oracle.message_size(message)?,
                "compute_unit_limit": compute_unit_limit_instruction_index_and_units(message)
                    .map(|(_, units)| units),
            })
        }
        TransactionPlan::Sequential { divisible, plans } => json!({
            "kind": "sequential",
            "divisible": divisible,
            "plans": plans
                .iter()
                .map(|child| describe(child, leaves, oracle))
                .collect::<Result<Vec<_>>>()?,
        }),
        TransactionPlan::Parallel { plans } => json!({
            "kind": "parallel",
            "plans": plans
                .iter()
                .map(|child| describe(child, leaves, oracle))
                .collect::<Result<Vec<_>>>()?,
        }),
    })
}
