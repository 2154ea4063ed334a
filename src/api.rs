pub(crate) mod admin;
pub(crate) mod health;
pub(crate) mod keywords;
pub(crate) mod metrics;

use axum::{
    Router,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/admin/cache", delete(admin::drop_cache))
        .route("/v1/keywords/{year}/{month}", get(keywords::month_keywords))
        .route("/v1/articles/{year}/{month}", get(keywords::month_articles))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
