//! Seam between the orchestration layer and the page-rendering engine.
//!
//! The engine is treated as an opaque capability: given a URL and a run
//! configuration it produces a [`RenderedPage`]. Ordinary navigation failures
//! are reported inside the page (`success == false`); only faults of the
//! engine itself surface as [`BackendError`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use thiserror::Error;
use url::Url;

use crate::domain::types::{FilterThreshold, RenderedPage};

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;
pub const DEFAULT_USER_AGENT: &str = concat!("pagefit/", env!("CARGO_PKG_VERSION"));

/// Fixed launch configuration for the shared session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    pub headless: bool,
    pub javascript_enabled: bool,
    pub navigation_timeout: Duration,
    pub user_agent: String,
    pub batch_concurrency: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            javascript_enabled: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Always re-fetch; nothing is served from or written to a cache.
    #[default]
    Bypass,
}

/// Per-fetch configuration handed to the backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunConfig {
    pub cache_mode: CacheMode,
    pub filter_threshold: FilterThreshold,
    pub wait_for: Option<String>,
    pub scripts: Vec<String>,
}

impl RunConfig {
    pub fn new(filter_threshold: FilterThreshold) -> Self {
        Self {
            filter_threshold,
            ..Self::default()
        }
    }

    pub fn with_wait_for(mut self, selector: Option<String>) -> Self {
        self.wait_for = selector;
        self
    }

    pub fn with_script(mut self, script: Option<String>) -> Self {
        self.scripts.extend(script);
        self
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("rendering backend is not running")]
    NotRunning,
    #[error("rendering backend failed to launch: {0}")]
    Launch(String),
    #[error("rendering backend crashed: {0}")]
    Crashed(String),
}

#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<(), BackendError>;

    async fn fetch(&self, url: &Url, config: &RunConfig) -> Result<RenderedPage, BackendError>;

    /// Fetch several URLs with at most `concurrency` in flight.
    ///
    /// The provided implementation keeps results in input order. Backends with a
    /// native bulk primitive may override it and return pages in any order.
    async fn fetch_many(
        &self,
        urls: &[Url],
        config: &RunConfig,
        concurrency: usize,
    ) -> Result<Vec<RenderedPage>, BackendError> {
        let pending: Vec<_> = urls.iter().map(|url| self.fetch(url, config)).collect();
        stream::iter(pending)
            .buffered(concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    async fn close(&self) -> Result<(), BackendError>;
}
