pub mod dispatch;
pub mod error;
pub mod routes;
pub mod signature;
pub mod state;

use axum::routing::post;
use axum::Router;

pub use dispatch::{Dispatch, Dispatcher};
pub use state::AppState;

/// Path GitHub is configured to deliver `registry_package` events to.
pub const WEBHOOK_PATH: &str = "/version/1";

/// Build the axum Router. Used by `serve()` and available for integration
/// testing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(routes::webhook::receive))
        .with_state(state)
}

/// Serve webhooks on a pre-bound listener until Ctrl-C.
///
/// Runs already started keep going on the blocking pool; shutdown only stops
/// accepting new deliveries.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("listening for webhooks on http://{addr}{WEBHOOK_PATH}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
