mod auth;
mod error;
mod handlers;
mod routes;
mod scheduler;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use lexi_rag::Settings;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env()?;
    let bind_addr = settings.bind_addr.clone();
    let scheduler_interval = settings.scheduler_interval;
    let state = AppState::from_settings(settings)?;
    log::info!("Services initialized");

    let _scheduler = scheduler_interval.map(|every| scheduler::spawn(state.clone(), every));

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("could not bind {bind_addr}"))?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
