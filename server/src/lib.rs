use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use deskpilot_core::{EXECUTE_PATH, SCREENSHOT_PATH, SETUP_EXECUTE_PATH};
use tower_http::trace::TraceLayer;

mod executor;
mod handlers;
mod state;

pub mod args;

pub use crate::{args::BindAddress, executor::CommandExecutor, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(EXECUTE_PATH, post(handlers::execute))
        .route(SETUP_EXECUTE_PATH, post(handlers::execute))
        .route(SCREENSHOT_PATH, get(handlers::screenshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: AppState, bind_addr: BindAddress) -> anyhow::Result<()> {
    let listener = bind_addr
        .bind()
        .await
        .context("failed to bind to address")?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        "server listening on http://{local_addr}, commands time out after {:?}",
        state.executor().timeout()
    );

    axum::serve(listener, router(state)).await?;

    Ok(())
}
