use std::net::SocketAddr;
use std::sync::Arc;

use bitbucket_gateway::config::DEFAULT_CONFIG_PATH;
use bitbucket_gateway::error::GatewayError;
use bitbucket_gateway::{AppState, GatewayConfig, HttpEventPublisher, api, logging};
use tracing::{self, error, info, warn};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match GatewayConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = match logging::setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, &config_path).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig, config_path: &str) -> Result<(), GatewayError> {
    info!(
        "Starting Bitbucket gateway -- version {}",
        env!("CARGO_PKG_VERSION")
    );

    let publisher = HttpEventPublisher::new(&config.api_client_options()?)?;
    let state = Arc::new(AppState::from_config(&config, Arc::new(publisher))?);

    if state.service.policy().is_empty() {
        warn!("No emitted events configured; deliveries will be accepted but never published");
    } else {
        info!("Emitting events matching {:?}", state.service.policy().patterns());
    }
    if !state.ip_filter.ranges().is_empty() {
        info!("Accepting deliveries only from {:?}", state.ip_filter.ranges());
    }

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on {}", config.server.bind_address);
    info!("Using config at {:?}", config_path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
