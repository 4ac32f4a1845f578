//! Dashboard — Axum web server for real-time monitoring.
//!
//! Serves a read-only REST API over the game service plus a minimal
//! HTML landing page. CORS enabled for local development.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

const DASHBOARD_HTML: &str = r#"<!doctype html>
<html>
<head><title>DICEPOT Dashboard</title></head>
<body>
<h1>DICEPOT Dashboard</h1>
<p>Read-only monitoring API:</p>
<ul>
<li><a href="/api/status">/api/status</a></li>
<li><a href="/api/rounds">/api/rounds</a></li>
<li><a href="/api/settlements">/api/settlements</a></li>
</ul>
</body>
</html>
"#;

/// Start the dashboard web server.
///
/// This spawns a background task — it doesn't block.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Dashboard server starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind dashboard port");

        axum::serve(listener, app)
            .await
            .expect("Dashboard server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/rounds", get(routes::get_rounds))
        .route("/api/settlements", get(routes::get_settlements))
        .route("/health", get(routes::health))
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
