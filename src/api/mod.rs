/// Operational HTTP routes
pub mod health;

use crate::{context::AppContext, metrics};
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

/// Build ops routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .route("/metrics", get(metrics_handler))
}

/// Prometheus text exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
