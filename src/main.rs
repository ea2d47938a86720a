use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chain::MemoryChain;
use clap::Parser;
use metrics::{run_metrics_server, Metrics};
use networking::NetworkService;
use node::{Configuration, FullNode};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod executor;
mod simulation;

use executor::Executor;
use simulation::{LoopbackPeers, SourceChain};

#[derive(Parser, Debug)]
#[command(version, about = "Full node block synchronization")]
struct Args {
    /// YAML configuration file; defaults apply to every missing field.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sync an in-memory chain of this many blocks from loopback peers, then exit.
    #[arg(short, long)]
    simulate: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let configuration = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Using config file");
            Configuration::load(path)?
        }
        None => Configuration::default(),
    };

    let metrics = configuration.metrics.clone().map(|config| {
        let metrics = Arc::new(Metrics::new());
        let served = metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = run_metrics_server(config, served).await {
                warn!("Metrics server exited with error: {err:#}");
            }
        });
        metrics
    });

    let genesis = configuration.chain.genesis_block();
    let source = SourceChain::new(&genesis, args.simulate.unwrap_or_default());
    let chain = Arc::new(MemoryChain::new(genesis));

    let mut network = NetworkService::new(
        configuration.network.clone(),
        Arc::new(LoopbackPeers::new(&source)),
    );
    if let Some(metrics) = &metrics {
        network = network.with_metrics(metrics.clone());
    }

    let shutdown = CancellationToken::new();
    let node = FullNode::new(
        configuration,
        chain.clone(),
        network,
        shutdown.clone(),
        metrics,
    );

    let executor = Executor::new(node, shutdown).stop_when_synchronized(args.simulate.is_some());
    executor
        .run(|| {
            if !source.is_empty() {
                source.announce(&chain)?;
            }
            Ok(())
        })
        .await
}
