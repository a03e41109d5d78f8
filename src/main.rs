//! taskboard server
//!
//! Usage:
//!   TASKBOARD_SECRET=... cargo run --bin taskboard
//!   # Then use taskboard-cli or curl against http://localhost:8000

use tokio::net::TcpListener;

use taskboard::auth::TokenService;
use taskboard::config::Config;
use taskboard::logging;
use taskboard::rest::create_router;
use taskboard::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let _log_guard = logging::init(&config);

    let storage = Storage::open(&config.data_dir)?;
    let tokens = TokenService::new(config.secret.as_bytes())?;
    let app = create_router(storage.clone(), tokens);

    let listener = TcpListener::bind(config.addr).await?;
    tracing::info!(
        addr = %config.addr,
        data_dir = %config.data_dir.display(),
        "taskboard listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush().await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}
