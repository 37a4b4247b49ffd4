pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use aquarium_core::Engine;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let app_state = state::AppState::new(engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Feeder
        .route("/api/v1/feeder/manual", post(routes::feeder::manual_feed))
        .route("/api/v1/feeder/last-feed", get(routes::feeder::last_feed))
        .route("/api/v1/feeder/status", get(routes::feeder::status))
        .route(
            "/api/v1/feeder/schedules",
            get(routes::feeder::list_schedules).post(routes::feeder::create_schedule),
        )
        .route(
            "/api/v1/feeder/schedules/{id}",
            put(routes::feeder::update_schedule).delete(routes::feeder::delete_schedule),
        )
        // UV
        .route("/api/v1/uv/manual", post(routes::uv::manual_uv))
        .route("/api/v1/uv/manual/stop", post(routes::uv::stop_uv))
        .route("/api/v1/uv/status", get(routes::uv::status))
        .route(
            "/api/v1/uv/schedules",
            get(routes::uv::list_schedules).post(routes::uv::create_schedule),
        )
        .route(
            "/api/v1/uv/schedules/{id}",
            put(routes::uv::update_schedule).delete(routes::uv::delete_schedule),
        )
        // Reads
        .route("/api/v1/history", get(routes::history::list_history))
        .route(
            "/api/v1/stock",
            get(routes::stock::get_stock).put(routes::stock::set_stock),
        )
        .route("/api/v1/dashboard", get(routes::dashboard::get_dashboard))
        // Sensors
        .route("/api/v1/sensors/current", get(routes::sensors::current))
        .route("/api/v1/sensors/history", get(routes::sensors::history))
        .route("/api/v1/sensors/inject", post(routes::sensors::inject))
        // Demo data
        .route("/api/v1/demo/seed", post(routes::demo::seed))
        .route("/api/v1/demo/clear", post(routes::demo::clear))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Bind `0.0.0.0:{port}` and serve until the process exits.
pub async fn serve(engine: Arc<Engine>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(engine, listener).await
}

/// Serve on an already-bound listener.
///
/// The caller can read the actual port before starting, which matters when
/// `port = 0` and the OS picks a free one.
pub async fn serve_on(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(engine);

    tracing::info!("aquarium API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
