use anyhow::Result;
use clap::Parser;
use eth_metrics_rs::{Config, Error, Network, Service};
use std::{future::Future, time::Duration};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[clap(version, about = "staking pool performance metrics", long_about = None)]
struct Cli {
    /// Key file of a pool to monitor (.txt or .csv); repeatable.
    #[clap(long = "pool-name")]
    pool_name: Vec<String>,

    /// csv file with entities and their validator keys
    #[clap(long = "validators-file")]
    validators_file: Option<String>,

    /// Ethereum execution layer http endpoint
    #[clap(long)]
    eth1address: String,

    /// Ethereum consensus layer http endpoint
    #[clap(long)]
    eth2address: String,

    /// Database path, e.g. metrics.db; persistence is disabled when omitted
    #[clap(long = "database-path")]
    database_path: Option<String>,

    /// Number of epochs to backfill
    #[clap(long = "backfill-epochs", default_value_t = 0)]
    backfill_epochs: u64,

    /// Timeout in seconds for fetching the beacon state
    #[clap(long = "state-timeout", default_value_t = 60)]
    state_timeout: u64,

    /// Calculates the stats for a given epoch and exits, useful for debugging
    #[clap(long = "epoch-debug")]
    epoch_debug: Option<String>,

    /// Credentials for the consensus http client (username:password)
    #[clap(long)]
    credentials: Option<String>,

    /// ethereum|gnosis
    #[clap(long, default_value = "ethereum")]
    network: String,

    /// Logging verbosity (trace, debug, info, warn, error)
    #[clap(long, default_value = "info")]
    verbosity: String,
}

fn setup_logging(verbosity: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| verbosity.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_task_until_signal(task: impl Future<Output = Result<(), Error>>) -> Result<()> {
    tokio::select! {
        result = task => result.map_err(Into::into),
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down...");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity);

    let network: Network = cli.network.parse()?;
    let config = Config {
        pool_names: cli.pool_name,
        validators_file: cli.validators_file,
        database_path: cli.database_path,
        eth1_address: cli.eth1address,
        eth2_address: cli.eth2address,
        epoch_debug: cli.epoch_debug,
        network,
        credentials: cli.credentials,
        backfill_epochs: cli.backfill_epochs,
        state_timeout: Duration::from_secs(cli.state_timeout),
        ..Default::default()
    };

    let mut service = Service::new(config).await?;
    run_task_until_signal(service.run()).await
}
