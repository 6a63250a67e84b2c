//! HTTP surface: routes, handlers and shared middleware.

mod error;
pub mod handlers;
mod middleware;
pub mod models;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::application::crawl::CrawlService;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::REQUEST_ID_HEADER;

#[derive(Clone)]
pub struct HttpState {
    pub crawler: Arc<CrawlService>,
}

impl HttpState {
    pub fn new(crawler: Arc<CrawlService>) -> Self {
        Self { crawler }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(crate::infra::assets::serve_index))
        .route("/static/{*path}", get(crate::infra::assets::serve_asset))
        .route("/health", get(handlers::health))
        .route("/_health/session", get(handlers::session_health))
        .route("/crawl", post(handlers::crawl))
        .route("/crawl/batch", post(handlers::crawl_batch))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .layer(CorsLayer::permissive())
}
