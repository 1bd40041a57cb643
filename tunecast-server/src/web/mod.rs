//! HTTP API for a single tuner.

pub mod api;
pub mod peer_socket;
pub mod state;
pub mod status_socket;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::tuner::Tuner;
use state::WebState;

/// Build the API router.
pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/api/config/channels", get(api::get_channels))
        // RPC handlers answer every method, so they can reject non-POST
        // requests with their own error shape.
        .route("/api/rpc/stop", any(api::rpc_stop).layer(api::rpc_body_limit()))
        .route("/api/rpc/tune", any(api::rpc_tune).layer(api::rpc_body_limit()))
        .route("/api/socket/webrtc-peer", get(peer_socket::webrtc_peer_socket))
        .route("/api/socket/tuner-status", get(status_socket::tuner_status_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves.
pub async fn start_web_server<F>(
    listen_addr: SocketAddr,
    tuner: Arc<Tuner>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(WebState::new(tuner)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("[Web] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    log::info!("[Web] Server stopped");
    Ok(())
}
