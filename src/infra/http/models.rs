use serde::{Deserialize, Serialize};

use crate::domain::{
    error::DomainError,
    types::{DEFAULT_FILTER_THRESHOLD, FetchOptions, FilterThreshold, parse_target_url},
};

pub const SERVICE_NAME: &str = "pagefit";

fn default_filter_threshold() -> f64 {
    DEFAULT_FILTER_THRESHOLD
}

/// Body of `POST /crawl`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlRequest {
    pub url: String,
    #[serde(default)]
    pub include_raw: bool,
    #[serde(default = "default_filter_threshold")]
    pub filter_threshold: f64,
    #[serde(default)]
    pub wait_for_selector: Option<String>,
    #[serde(default)]
    pub js_code: Option<String>,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            include_raw: false,
            filter_threshold: DEFAULT_FILTER_THRESHOLD,
            wait_for_selector: None,
            js_code: None,
        }
    }
}

impl TryFrom<CrawlRequest> for FetchOptions {
    type Error = DomainError;

    fn try_from(request: CrawlRequest) -> Result<Self, Self::Error> {
        let target_url = parse_target_url(&request.url)?;
        let threshold = FilterThreshold::new(request.filter_threshold)?;

        Ok(FetchOptions::new(target_url)
            .with_threshold(threshold)
            .with_raw_text(request.include_raw)
            .with_wait_for_selector(request.wait_for_selector)
            .with_injected_script(request.js_code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
