use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    application::error::{AppError, ErrorReport},
    domain::types::{BatchRequest, CrawlRecord, FetchOptions},
};

use super::{
    HttpState,
    error::ApiError,
    models::{CrawlRequest, HealthResponse},
};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Readiness check: 204 once the fetch session accepts work.
pub async fn session_health(State(state): State<HttpState>) -> Response {
    let session = state.crawler.session();
    if session.is_ready() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_message(
        "infra::http::session_health",
        StatusCode::SERVICE_UNAVAILABLE,
        format!("fetch session is {}", session.state()),
    )
    .attach(&mut response);
    response
}

pub async fn crawl(
    State(state): State<HttpState>,
    payload: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Json<CrawlRecord>, ApiError> {
    let Json(request) = payload?;
    let options = FetchOptions::try_from(request).map_err(AppError::from)?;
    let record = state.crawler.crawl(options).await?;
    Ok(Json(record))
}

pub async fn crawl_batch(
    State(state): State<HttpState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<Vec<CrawlRecord>>, ApiError> {
    let Json(urls) = payload?;
    let batch = BatchRequest::parse(&urls).map_err(AppError::from)?;
    let records = state.crawler.crawl_batch(batch).await?;
    Ok(Json(records))
}
