use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use ulid::Ulid;

use roomd::api::{self, AppState};
use roomd::auth::{self, SessionStore};
use roomd::compactor;
use roomd::engine::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("ROOMD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    roomd::observability::init(metrics_port);

    let port = std::env::var("ROOMD_PORT").unwrap_or_else(|_| "8000".into());
    let bind = std::env::var("ROOMD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("ROOMD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("ROOMD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let engine = Arc::new(Engine::new(PathBuf::from(&data_dir).join("roomd.wal"))?);
    bootstrap_admin(&engine).await?;
    tokio::spawn(compactor::run_compactor(engine.clone(), compact_threshold));

    let sessions = Arc::new(SessionStore::new());
    let app = api::app(AppState { engine, sessions });

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("roomd listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("roomd stopped");
    Ok(())
}

/// Create the bootstrap superuser named by ROOMD_ADMIN_USER /
/// ROOMD_ADMIN_PASSWORD, unless it already exists.
async fn bootstrap_admin(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let (Ok(username), Ok(password)) = (
        std::env::var("ROOMD_ADMIN_USER"),
        std::env::var("ROOMD_ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };
    if engine.find_user(&username).is_some() {
        return Ok(());
    }
    engine
        .register_user(Ulid::new(), username.clone(), auth::hash_password(&password), true)
        .await?;
    info!("created superuser {username}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, stopping accept loop");
}
