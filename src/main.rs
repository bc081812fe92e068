use std::sync::Arc;

use proctor_server::config::{lan_ipv4, Config};
use proctor_server::persistence::JsonFileStore;
use proctor_server::{api, build_state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let store = Arc::new(JsonFileStore::new(config.storage.data_file.clone()));

    let state = match build_state(&config, store).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %config.storage.data_file.display(),
                "Failed to restore session registry"
            );
            std::process::exit(1);
        }
    };
    let registry = state.registry.clone();

    let (addr, server) = warp::serve(api::routes(state)).bind_with_graceful_shutdown(
        config.bind_address(),
        async {
            tokio::signal::ctrl_c().await.ok();
        },
    );
    tracing::info!(%addr, "Proctor server listening");
    match lan_ipv4().await {
        Some(ip) => tracing::info!(
            lan = %ip,
            port = addr.port(),
            "Participants can reach this server on the local network"
        ),
        None => tracing::warn!("No LAN IPv4 address found"),
    }

    server.await;

    tracing::info!("Shutting down, flushing session registry");
    if let Err(e) = registry.flush().await {
        tracing::error!(error = %e, "Final registry save failed");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("proctor_server=info,warp=warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
