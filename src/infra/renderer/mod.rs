//! Static HTTP rendering backend.
//!
//! Fetches pages over plain HTTP and extracts their text with `lol_html`. It
//! does not run JavaScript: injected scripts are ignored and `js:` wait
//! conditions fail the page. Useful as the default backend and for pages that
//! render server-side.

mod extract;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{
    application::backend::{BackendError, BrowserBackend, BrowserConfig, RunConfig},
    domain::types::RenderedPage,
};

use self::extract::{extract_text, selector_matches};

#[derive(Default)]
pub struct StaticRenderer {
    running: RwLock<Option<Running>>,
}

struct Running {
    client: Client,
    config: BrowserConfig,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe_request_error(err: &reqwest::Error, config: &BrowserConfig) -> String {
        if err.is_timeout() {
            format!(
                "navigation timeout after {}s: {err}",
                config.navigation_timeout.as_secs()
            )
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("navigation failed: {err}")
        }
    }

    fn render_body(
        url: &Url,
        content_type: &str,
        body: &str,
        run: &RunConfig,
    ) -> RenderedPage {
        let is_html = content_type.contains("html") || content_type.is_empty();

        if let Some(wait_for) = run.wait_for.as_deref()
            && let Some(detail) = Self::check_wait_for(is_html, body, wait_for)
        {
            return RenderedPage::failed(url.clone(), detail);
        }

        if is_html {
            return match extract_text(body) {
                Ok(page) => RenderedPage::succeeded(url.clone(), page.text).with_title(page.title),
                Err(err) => {
                    RenderedPage::failed(url.clone(), format!("failed to extract page text: {err}"))
                }
            };
        }

        if content_type.starts_with("text/") || content_type.contains("json") {
            return RenderedPage::succeeded(url.clone(), body.trim());
        }

        RenderedPage::failed(
            url.clone(),
            format!("unsupported content type `{content_type}`"),
        )
    }

    /// Returns a failure detail when the wait condition cannot be satisfied.
    fn check_wait_for(is_html: bool, body: &str, wait_for: &str) -> Option<String> {
        if wait_for.starts_with("js:") {
            return Some("wait_for JavaScript conditions need a scripting backend".to_string());
        }
        let selector = wait_for.strip_prefix("css:").unwrap_or(wait_for).trim();
        if !is_html {
            return Some(format!(
                "wait_for selector `{selector}` cannot match a non-HTML document"
            ));
        }
        match selector_matches(body, selector) {
            Ok(true) => None,
            Ok(false) => Some(format!(
                "wait_for selector `{selector}` did not match any element"
            )),
            Err(err) => Some(err),
        }
    }
}

#[async_trait]
impl BrowserBackend for StaticRenderer {
    async fn launch(&self, config: &BrowserConfig) -> Result<(), BackendError> {
        let client = Client::builder()
            .timeout(config.navigation_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|err| BackendError::Launch(err.to_string()))?;

        *self.running.write().await = Some(Running {
            client,
            config: config.clone(),
        });
        Ok(())
    }

    async fn fetch(&self, url: &Url, run: &RunConfig) -> Result<RenderedPage, BackendError> {
        let (client, config) = {
            let guard = self.running.read().await;
            let running = guard.as_ref().ok_or(BackendError::NotRunning)?;
            (running.client.clone(), running.config.clone())
        };

        if !run.scripts.is_empty() {
            debug!(
                target = "pagefit::renderer",
                url = %url,
                scripts = run.scripts.len(),
                javascript = config.javascript_enabled,
                "static renderer ignores injected scripts"
            );
        }

        let response = match client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => {
                return Ok(RenderedPage::failed(
                    url.clone(),
                    Self::describe_request_error(&err, &config),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(RenderedPage::failed(
                url.clone(),
                format!("HTTP {status} while fetching {url}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return Ok(RenderedPage::failed(
                    url.clone(),
                    Self::describe_request_error(&err, &config),
                ));
            }
        };

        Ok(Self::render_body(url, &content_type, &body, run))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.running.write().await.take();
        Ok(())
    }
}
