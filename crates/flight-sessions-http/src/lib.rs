//! HTTP front-end for the session pool.
//!
//! Exposes the GetSession / CloseSession surface over REST with bearer
//! token authentication.

pub mod auth;
pub mod error;
pub mod routes;
mod state;

use axum::{
    handler::Handler,
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use state::SharedState;

/// Build the router with all session routes.
pub fn router(state: Arc<SharedState>) -> Router {
    let authenticated = routes::get_session.layer(middleware::from_fn_with_state(
        Arc::clone(&state),
        auth::session_middleware,
    ));

    Router::new()
        .route("/api/handshake", post(routes::handshake))
        .route(
            "/api/session",
            get(authenticated).delete(routes::close_session),
        )
        .route("/api/pool", get(routes::pool_stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<SharedState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("HTTP server listening on http://{}", addr);
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        log::info!("HTTP server shutting down");
    })
    .await
}

// ============================================================================
// TESTS
// ============================================================================
