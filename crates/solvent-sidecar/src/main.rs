//! Solver sidecar entry point
//!
//! Runs inside every solver pod, next to the solve container. Waits for the
//! solve container to terminate, classifies the artifact files it left on
//! the shared volume, and uploads the result record to the solution service.

use kube::Client;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::SidecarConfig;
use crate::solution::{build_record, solver_image};
use crate::upload::upload_record;
use crate::watch::{await_solver_termination, KubePodSource};

mod config;
mod solution;
mod upload;
mod watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = SidecarConfig::from_env()?;
    let client = Client::try_default().await?;
    let source = KubePodSource::new(client, &config.namespace, &config.pod_name);

    info!(pod = %config.pod_name, "waiting for solver container to terminate");
    let pod = await_solver_termination(&source).await?;
    info!(pod = %config.pod_name, "detected solver finish");

    let record = build_record(&config, solver_image(&pod))?;
    let http = reqwest::Client::new();
    if let Err(e) = upload_record(&http, &config.solution_service, &record).await {
        error!(error = %e, "failed to upload solve result");
    }

    Ok(())
}
