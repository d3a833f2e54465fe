mod config;
mod web;

use anyhow::{Context, Result};
use heatpump_core::{HttpBackend, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{BackendConfig, ConsoleConfig};
use crate::web::{create_web_server, Connector, WebState};

const BOOTSTRAP_RETRY: Duration = Duration::from_secs(30);

fn connector(backend: BackendConfig, coverage_days: u32) -> Connector {
    Arc::new(move |token: Option<String>| -> Result<Arc<Session>> {
        let http = HttpBackend::new(&backend.base_url, token, Duration::from_secs(backend.timeout_secs))
            .context("Failed to create backend client")?;
        Ok(Arc::new(Session::with_backend(Arc::new(http), coverage_days)))
    })
}

// Keeps retrying the initial load until the backend answers or rejects the token.
async fn bootstrap(session: Arc<Session>) {
    loop {
        match session.bootstrap().await {
            Ok(()) => {
                info!("telemetry history and circuit state loaded");
                return;
            }
            Err(e) if e.is_session_expired() => {
                warn!("backend rejected the configured token, waiting for login");
                session.end().await;
                return;
            }
            Err(e) => {
                warn!("initial load failed, retrying in {:?}: {}", BOOTSTRAP_RETRY, e);
                tokio::time::sleep(BOOTSTRAP_RETRY).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ConsoleConfig::load().await.context("Failed to load configuration")?;
    let connect = connector(config.backend.clone(), config.telemetry.coverage_days);
    let poll_interval = Duration::from_secs(config.telemetry.poll_interval_secs);

    let session = connect(config.backend.token.clone())?;
    // Live samples arriving before the history are buffered by the window.
    session.start_live(poll_interval).await;
    tokio::spawn(bootstrap(session.clone()));

    let state = WebState {
        session: Arc::new(RwLock::new(session)),
        connect,
        poll_interval,
        static_dir: config.static_dir.clone(),
    };
    create_web_server(&config.listen, state)
        .await
        .with_context(|| format!("Web console on {} failed", config.listen))
}
