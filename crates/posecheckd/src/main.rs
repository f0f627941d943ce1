use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod recorder;
mod throttle;

use config::Config;
use dbus_interface::{PoseCheckService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("posecheckd starting");

    let config = Config::from_env();
    tracing::info!(
        recordings = %config.recordings_dir.display(),
        capture_delay_ms = config.capture_delay.as_millis() as u64,
        frame_rate = config.frame_rate,
        face_policy = %config.face_policy,
        session_bus = config.session_bus,
        "configuration loaded"
    );

    let (engine, events) = engine::spawn_engine(&config)?;

    let service = PoseCheckService {
        engine: engine.clone(),
        face_policy: config.face_policy,
        frame_rate: config.frame_rate,
    };

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tokio::spawn(dbus_interface::forward_events(conn.clone(), events));

    tracing::info!(bus = BUS_NAME, "posecheckd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("posecheckd shutting down");

    // Like leaving the capture screen: a live session is cancelled, never kept.
    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "session task already gone");
    }

    Ok(())
}
