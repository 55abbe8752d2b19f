//! Solvent dispatch service entry point

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use solvent_dispatch::api::{self, AppState};
use solvent_dispatch::compiler::JobCompiler;
use solvent_dispatch::config::Config;
use solvent_dispatch::dispatcher::Dispatcher;
use solvent_dispatch::notifier::{HttpNotifier, Notifier};
use solvent_dispatch::orchestrator::{KubeOrchestrator, Orchestrator};
use solvent_dispatch::watcher::ComputationWatcher;

/// Dispatches solver computations onto the cluster and reports their termination
#[derive(Parser, Debug)]
#[command(name = "solvent-dispatch", version, about, long_about = None)]
struct Cli {
    /// Override the listen address from the environment
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!(namespace = %config.namespace, "initializing orchestrator client");
    let client = Client::try_default().await?;

    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(KubeOrchestrator::new(client, &config.namespace));
    let dispatcher = Arc::new(Dispatcher::new(
        orchestrator.clone(),
        JobCompiler::new(&config.job_prefix, &config.sidecar_image),
        &config.job_prefix,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(
        &config.scheduler_host,
        config.notify_attempts,
        config.notify_interval,
    ));
    let watcher = Arc::new(ComputationWatcher::new(
        orchestrator,
        dispatcher.clone(),
        notifier,
    ));

    let addr = cli.bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "dispatch service listening");
    axum::serve(listener, api::router(AppState { dispatcher, watcher })).await?;

    Ok(())
}
