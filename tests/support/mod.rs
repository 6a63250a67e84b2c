#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use url::Url;

use pagefit::{
    application::{
        backend::{BackendError, BrowserBackend, BrowserConfig, RunConfig},
        crawl::CrawlService,
        reduce::{ContentFilter, ContentReducer},
        session::FetchSession,
    },
    domain::types::{FilterThreshold, RenderedPage},
    infra::http::HttpState,
};

/// What the scripted backend does for one URL.
#[derive(Debug, Clone)]
pub enum Outcome {
    Page { title: Option<String>, text: String },
    Fail(String),
    Crash(String),
}

impl Outcome {
    pub fn page(text: &str) -> Self {
        Self::Page {
            title: None,
            text: text.to_string(),
        }
    }

    pub fn titled(title: &str, text: &str) -> Self {
        Self::Page {
            title: Some(title.to_string()),
            text: text.to_string(),
        }
    }
}

/// Backend that answers from a fixed script and counts every call.
#[derive(Default)]
pub struct ScriptedBackend {
    outcomes: HashMap<String, Outcome>,
    pub launches: AtomicUsize,
    pub fetches: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, outcome: Outcome) -> Self {
        let key = Url::parse(url).expect("scripted url").to_string();
        self.outcomes.insert(key, outcome);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserBackend for ScriptedBackend {
    async fn launch(&self, _config: &BrowserConfig) -> Result<(), BackendError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, url: &Url, _config: &RunConfig) -> Result<RenderedPage, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.get(url.as_str()) {
            Some(Outcome::Page { title, text }) => {
                Ok(RenderedPage::succeeded(url.clone(), text.clone()).with_title(title.clone()))
            }
            Some(Outcome::Fail(detail)) => Ok(RenderedPage::failed(url.clone(), detail.clone())),
            Some(Outcome::Crash(detail)) => Err(BackendError::Crashed(detail.clone())),
            None => Ok(RenderedPage::succeeded(
                url.clone(),
                format!("Content for {url}"),
            )),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Drops navigation and footer tokens, keeping everything else.
pub struct ChromeStripFilter;

impl ContentFilter for ChromeStripFilter {
    fn filter(&self, raw: &str, _threshold: FilterThreshold) -> Option<String> {
        let kept: Vec<&str> = raw
            .split_whitespace()
            .filter(|word| !matches!(*word, "Nav" | "Footer"))
            .collect();
        Some(kept.join(" "))
    }
}

pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub session: Arc<FetchSession>,
    pub crawler: Arc<CrawlService>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        let backend = Arc::new(backend);
        let session = Arc::new(FetchSession::new(
            backend.clone(),
            BrowserConfig::default(),
        ));
        let reducer = ContentReducer::new(Arc::new(ChromeStripFilter));
        let crawler = Arc::new(CrawlService::new(session.clone(), reducer));
        Self {
            backend,
            session,
            crawler,
        }
    }

    pub async fn started(backend: ScriptedBackend) -> Self {
        let harness = Self::new(backend);
        harness.session.start().await.expect("session starts");
        harness
    }

    pub fn http_state(&self) -> HttpState {
        HttpState::new(self.crawler.clone())
    }
}
