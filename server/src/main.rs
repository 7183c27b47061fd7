use std::{fs::OpenOptions, net::SocketAddr, sync::Arc};

use server::{auth::TokenSigner, config::Config, server_state::ServerState};
use taxi_dispatch_data_management::DataManager;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::fs::create_dir_all("server/log")?;
    let log_file = "server/log/server.log";

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=debug,taxi_dispatch_data_management=debug", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();

    tracing::info!("Starting server...");

    let config = Config::from_env()?;

    let data_manager = DataManager::start().await?;

    let reporter = data_manager
        .reporter(
            &config.regulator_base_url,
            &config.regulator_api_key,
            config.regulator_timeout,
        )?
        .spawn();

    // Set up application state for use with with_state().
    let (tx, _rx) = broadcast::channel(100);

    let server_state = Arc::new(ServerState {
        tx,
        data_manager,
        signer: TokenSigner::new(&config.token_secret),
        reporter,
    });

    let app = server::build_router(server_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
