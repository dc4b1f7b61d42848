//! Nudge Server - push-wakeup dispatch service.

use std::net::SocketAddr;

use color_eyre::eyre::WrapErr as _;
use nudge_dispatch::{DispatchMetrics, WakeupSender};
use nudge_gateway::{FcmClient, GatewayConfig};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("nudge-server starting");

    // Optional Prometheus scrape endpoint
    if let Ok(addr) = std::env::var("NUDGE_METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().wrap_err("invalid NUDGE_METRICS_ADDR")?;

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .wrap_err("failed to install Prometheus exporter")?;

        tracing::info!(addr = %addr, "metrics exporter listening");
    }

    // Initialize storage
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "nudge.db".to_string());

    let storage = nudge_storage::SqliteStorage::new(&database_url)
        .wrap_err("failed to initialize storage")?;

    storage
        .run_migrations()
        .wrap_err("failed to run migrations")?;

    // Create the wakeup sender
    let metrics = DispatchMetrics::new();
    let sender = match GatewayConfig::from_env() {
        GatewayConfig::Disabled => {
            tracing::warn!("push gateway unconfigured, device wakeup will not work");
            WakeupSender::disabled(metrics)
        }
        GatewayConfig::Enabled { api_key } => {
            let gateway = FcmClient::new(api_key).wrap_err("failed to build gateway client")?;
            WakeupSender::new(storage.clone(), gateway, metrics)
        }
    };

    // Build router
    let app = nudge_http::wakeup_router(storage, sender.clone()).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = std::env::var("NUDGE_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .wrap_err("invalid NUDGE_LISTEN_ADDR")?;
    tracing::info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err("failed to bind")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .wrap_err("server error")?;

    sender.shutdown().await;

    Ok(())
}
