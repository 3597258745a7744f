use campus_functions::{build_state, router, AppConfig, StartupError};
use campus_realtime::{Hub, RealtimeServer};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = match AppConfig::load_validated() {
        Ok(config) => config,
        Err(e) => {
            env_logger::init();
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let hub = Arc::new(Hub::new(config.realtime.broadcast_capacity));
    let state = build_state(&config, hub.clone())?;

    let realtime = RealtimeServer::with_hub(config.realtime.clone(), hub);
    tokio::spawn(async move {
        if let Err(e) = realtime.run().await {
            error!("Realtime server stopped: {e}");
        }
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    info!("Function routes listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
