pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    // Leave room above the configured limit so oversized uploads reach the
    // size check and get a JSON error.
    let upload_limit = usize::try_from(app_state.config.storage.max_file_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1024);

    let authenticated = Router::new()
        // RPC
        .route("/api/rpc/{procedure}", post(routes::rpc::call))
        // Events (SSE)
        .route(
            "/api/notifications/stream",
            get(routes::events::notification_stream),
        )
        // Files
        .route(
            "/api/tasks/{id}/files/{name}",
            put(routes::files::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files/{id}", get(routes::files::download_file))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::identity_middleware,
        ));

    let public = Router::new()
        .route("/api/health", get(routes::health::health))
        .route(
            "/api/cron/deadline-reminders",
            post(routes::cron::deadline_reminders),
        )
        .route("/api/auth/sync", post(routes::auth_sync::auth_sync));

    let mut router = authenticated
        .merge(public)
        .layer(TraceLayer::new_for_http());
    if app_state.config.server.cors_allow_any {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }
    router.with_state(app_state)
}

/// Start the taskhub API server.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("taskhub API listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
