mod config;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring unreadable .env: {e}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env();

    // A missing or corrupt scene file only means viewers start empty.
    let stored = match services::scene::load_current(&config.scenes_dir).await {
        Ok(scene) => scene,
        Err(e) => {
            tracing::warn!(error = %e, dir = %config.scenes_dir.display(), "stored scene unreadable; starting empty");
            None
        }
    };
    tracing::info!(dir = %config.scenes_dir.display(), restored = stored.is_some(), "scene store ready");

    let state = state::AppState::new(config.scenes_dir.clone(), stored);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

    tracing::info!(port = config.port, "scenesync relay listening");
    axum::serve(listener, app).await
}
