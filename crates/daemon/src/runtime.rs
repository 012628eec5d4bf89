// Daemon lifecycle: wire the pieces together, serve until ctrl-c, then
// shut the watcher and hub down in order.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::events::debounce::DebounceConfig;
use crate::events::{watcher, EventHub};
use crate::http::{self, AppState};
use crate::ops::Ops;
use crate::workspace::Manager;

pub async fn run(config: Config) -> Result<()> {
    let manager = Manager::new(&config.workspaces_root).with_context(|| {
        format!("failed to open workspaces root: {}", config.workspaces_root.display())
    })?;
    let hub = EventHub::new(config.ring_capacity);

    let watcher_handle = watcher::start(
        manager.root(),
        hub.clone(),
        DebounceConfig::with_millis(config.debounce_ms),
        Duration::from_millis(config.sweep_ms),
    )
    .context("failed to start filesystem watcher")?;

    let ops = Ops::new(manager, hub.clone());
    let state = AppState::new(ops, config.auth_tokens.clone());
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        root = %config.workspaces_root.display(),
        auth = !config.auth_tokens.is_empty(),
        "atelier daemon listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server terminated unexpectedly")?;

    watcher_handle.stop().await;
    hub.close();
    Ok(())
}
