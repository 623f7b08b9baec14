//! Serve command - HTTP API plus background tasks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::create_router_with_state;
use crate::config::AppConfig;
use crate::infrastructure::{create_metrics_router, init_metrics, logging, SyncOrchestrator};

/// Run the API server.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config);

    let prometheus = init_metrics(config.metrics.enabled);
    let services = crate::create_app_state_with_config(&config).await?;

    let mut app: Router = create_router_with_state(services.state.clone());

    if let Some(metrics) = prometheus {
        app = app.merge(create_metrics_router(metrics));
    }

    services
        .optimizer
        .clone()
        .spawn_maintenance(Duration::from_secs(config.cache.sweep_interval_secs));

    spawn_sync_schedules(&config, services.orchestrator.clone());

    let addr = build_socket_addr(&config)?;
    info!("Starting content pipeline server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &AppConfig) {
    logging::init_logging(&logging::LoggingConfig {
        level: config.logging.level.clone(),
        format: config.logging.format.clone(),
    });
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

/// Spawns interval-driven sync runs for environments without an external
/// scheduler. Runs go through the same single-flight gate as HTTP triggers,
/// so an overlapping tick is rejected and logged, never run twice.
fn spawn_sync_schedules(config: &AppConfig, orchestrator: Arc<SyncOrchestrator>) {
    if let Some(secs) = config.sync.incremental_interval_secs {
        let orchestrator = orchestrator.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup stays quiet
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match orchestrator.run_incremental().await {
                    Ok(summary) => {
                        info!(status = ?summary.status, "Scheduled incremental sync finished")
                    }
                    Err(err) => warn!(error = %err, "Scheduled incremental sync rejected"),
                }
            }
        });

        info!(interval_secs = secs, "Incremental sync schedule enabled");
    }

    if let Some(secs) = config.sync.full_interval_secs {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match orchestrator.run_full(false).await {
                    Ok(summary) => {
                        info!(status = ?summary.status, "Scheduled full sync finished")
                    }
                    Err(err) => warn!(error = %err, "Scheduled full sync rejected"),
                }
            }
        });

        info!(interval_secs = secs, "Full sync schedule enabled");
    }
}
