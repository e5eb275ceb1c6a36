use tracing::{info, warn};

use warden_api::app::{build_app, services::build_in_memory_service};
use warden_api::config::AuthConfig;
use warden_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_format = std::env::var("WARDEN_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    warden_observability::init(log_format);

    let config = AuthConfig::from_env()?;
    let bind_addr = config.bind_addr;

    let (service, _handles) = build_in_memory_service(config);
    warn!("running with in-memory collaborators; users and sessions are lost on restart");

    let app = build_app(service);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
