/**
 * SENSOR MONITOR - process entry point
 *
 * ROLE : wires config, network worker, presentation cycle and HTTP API.
 * The cycle runs on the main task until the process is stopped.
 */

use anyhow::{Context, Result};
use sensor_monitor::http::{build_router, AppState};
use sensor_monitor::{load_config, MonitorContext, PresentationCycle};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sensor_monitor=info")),
        )
        .init();

    let config = load_config().await.context("loading monitor configuration")?;
    info!(
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        topic = %config.mqtt.topic,
        capacity = config.dashboard.history_capacity,
        "sensor monitor starting"
    );

    let (ctx, drain) = MonitorContext::new(config);
    let worker = ctx.start_worker().context("starting network worker")?;
    tokio::spawn(async move {
        match worker.await {
            Ok(Ok(())) => info!("network worker finished"),
            Ok(Err(e)) => error!("network worker stopped: {e}"),
            Err(e) => error!("network worker panicked: {e}"),
        }
    });

    let (cycle, handles) = PresentationCycle::new(ctx.config(), drain);

    let http = &ctx.config().http;
    if http.enabled {
        let app = build_router(AppState::new(handles, ctx.health().clone()));
        let listener = TcpListener::bind(http.bind.as_str())
            .await
            .with_context(|| format!("binding HTTP listener on {}", http.bind))?;
        info!("listening on http://{}", http.bind);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server stopped: {e}");
            }
        });
    } else {
        warn!("HTTP API disabled; dashboard is terminal-only");
    }

    cycle.run().await;
    Ok(())
}
