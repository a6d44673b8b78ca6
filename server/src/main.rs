use std::sync::Arc;

use tokio::net::TcpListener;

use pigeon_server::auth;
use pigeon_server::config::{generate_config_template, Config};
use pigeon_server::messages;
use pigeon_server::routes;
use pigeon_server::state::AppState;
use pigeon_server::store::memory::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pigeon_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pigeon_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Pigeon server v{} starting", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let store = Arc::new(MemoryStore::new());
    let app_state = AppState::new(store.clone(), jwt_secret);

    messages::spawn_ephemeral_sweep(store, config.ephemeral_sweep_interval_secs);

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
