use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::Kernel;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health` (§6): 200 `{status:"ok"}`.
pub async fn health_handler(State(kernel): State<Kernel>) -> (StatusCode, Json<HealthResponse>) {
    match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&kernel.db),
    )
    .await
    {
        Ok(Ok(_)) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "unhealthy" }),
        ),
    }
}
