//! Application setup and router composition (§6 "This surface is served by
//! an axum router... layered with tower-http's tracing and timeout
//! middleware").

use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::Kernel;
use crate::server::routes;

/// Builds the HTTP router over `Kernel`. Handlers are thin: parse/serialize
/// JSON and delegate to Admission / the Durable Store / the Runtime Catalogue
/// (§6 "no business logic lives in the HTTP layer").
pub fn build_app(kernel: Kernel) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_handler))
        .route("/languages", get(routes::languages::list_languages))
        .route("/languages/:id", get(routes::languages::get_language))
        .route("/code-sessions", post(routes::sessions::create_session))
        .route("/code-sessions/:id", get(routes::sessions::get_session))
        .route("/code-sessions/:id", patch(routes::sessions::update_session))
        .route("/code-sessions/:id/run", post(routes::sessions::run_session))
        .route(
            "/code-sessions/:id/close",
            patch(routes::sessions::close_session),
        )
        .route(
            "/code-sessions/:id/executions",
            get(routes::sessions::list_executions),
        )
        .route("/executions/:id", get(routes::executions::get_execution))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(kernel)
}
