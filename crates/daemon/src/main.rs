// atelierd: workspace versioning and change-notification daemon.

use anyhow::Context;
use tracing::info;

use atelier_daemon::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load();
    info!("starting atelier daemon");
    atelier_daemon::runtime::run(config).await.context("daemon terminated unexpectedly")
}
