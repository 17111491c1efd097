use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::{error, info};

use gateway_app::api::state::AppState;
use gateway_app::config::GatewayConfig;
use gateway_app::{api, bootstrap, shutdown, spawn_poller};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::load().context("load configuration")?;
    init_tracing(&config.log_level, config.log_json);

    info!(database_url = %config.database_url, "starting modbus gateway");

    let runtime = bootstrap(&config).await.context("bootstrap runtime")?;
    let poller_handle = spawn_poller(&runtime, config.poll_interval);

    let app = api::build_router(AppState::from(&runtime));
    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!(%addr, "http surface listening");
    notify_systemd_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("http server error")?;

    shutdown(&runtime, &poller_handle).await;
    Ok(())
}

fn init_tracing(log_level: &str, log_json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(target_os = "linux")]
fn notify_systemd_ready() {
    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        error!(error = %err, "sd_notify READY failed, ignoring");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_systemd_ready() {}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
