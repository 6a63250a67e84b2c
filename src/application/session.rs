//! Lifetime management for the single shared rendering session.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::types::{FetchOptions, RenderedPage};

use super::backend::{BackendError, BrowserBackend, BrowserConfig, RunConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    ShuttingDown,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("fetch session is not ready (state: {state})")]
    NotReady { state: SessionState },
    #[error("fetch session cannot be started from state {state}")]
    AlreadyStarted { state: SessionState },
    #[error("fetch session was stopped while starting")]
    StoppedDuringStart,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Owns the one backend session shared by every request.
///
/// Fetches hold a read guard on `gate` for their whole duration, so `stop`
/// (which takes the write guard) only releases the backend once in-flight
/// fetches have returned.
pub struct FetchSession {
    backend: Arc<dyn BrowserBackend>,
    config: BrowserConfig,
    state: watch::Sender<SessionState>,
    gate: RwLock<()>,
}

impl FetchSession {
    pub fn new(backend: Arc<dyn BrowserBackend>, config: BrowserConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            backend,
            config,
            state,
            gate: RwLock::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        let _exclusive = self.gate.write().await;
        let state = self.state();
        if state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyStarted { state });
        }

        self.backend.launch(&self.config).await?;

        // `stop` does not wait for the gate on an unstarted session, so it may
        // have run while the backend was launching.
        let promoted = self.state.send_if_modified(|state| {
            if *state == SessionState::Uninitialized {
                *state = SessionState::Ready;
                true
            } else {
                false
            }
        });
        if !promoted {
            warn!(
                target = "pagefit::session",
                "fetch session stopped during launch, closing backend"
            );
            self.backend.close().await?;
            return Err(SessionError::StoppedDuringStart);
        }

        info!(
            target = "pagefit::session",
            headless = self.config.headless,
            javascript = self.config.javascript_enabled,
            batch_concurrency = self.config.batch_concurrency,
            "fetch session ready"
        );
        Ok(())
    }

    pub async fn fetch_one(&self, options: &FetchOptions) -> Result<RenderedPage, SessionError> {
        let _in_flight = self.gate.read().await;
        self.ensure_ready()?;

        let config = RunConfig::new(options.filter_threshold)
            .with_wait_for(options.wait_for_selector.clone())
            .with_script(options.injected_script.clone());

        let page = self.backend.fetch(&options.target_url, &config).await?;
        debug!(
            target = "pagefit::session",
            url = %options.target_url,
            success = page.success,
            "fetched page"
        );
        Ok(page)
    }

    /// Fetch every URL with the shared configuration; output is aligned to `urls`.
    pub async fn fetch_many(
        &self,
        urls: &[Url],
        config: &RunConfig,
    ) -> Result<Vec<RenderedPage>, SessionError> {
        let _in_flight = self.gate.read().await;
        self.ensure_ready()?;

        let pages = self
            .backend
            .fetch_many(urls, config, self.config.batch_concurrency)
            .await?;
        Ok(align_pages(urls, pages))
    }

    /// Release the backend. Safe to call more than once.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut previous = SessionState::Stopped;
        self.state.send_modify(|state| {
            previous = *state;
            *state = match *state {
                SessionState::Ready => SessionState::ShuttingDown,
                SessionState::Uninitialized => SessionState::Stopped,
                other => other,
            };
        });
        if previous != SessionState::Ready {
            return Ok(());
        }

        info!(target = "pagefit::session", "draining fetch session");
        let _exclusive = self.gate.write().await;
        let result = self.backend.close().await;
        self.state.send_replace(SessionState::Stopped);

        match result {
            Ok(()) => {
                info!(target = "pagefit::session", "fetch session stopped");
                Ok(())
            }
            Err(err) => {
                warn!(target = "pagefit::session", error = %err, "backend did not close cleanly");
                Err(err.into())
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(SessionError::NotReady { state }),
        }
    }
}

/// Put backend results back into request order.
///
/// Pages already in order pass straight through. Otherwise each input URL
/// takes the first unclaimed page with the same URL, and URLs the backend
/// returned nothing for get a failed page.
fn align_pages(urls: &[Url], pages: Vec<RenderedPage>) -> Vec<RenderedPage> {
    let in_order = pages.len() == urls.len()
        && pages.iter().zip(urls).all(|(page, url)| &page.url == url);
    if in_order {
        return pages;
    }

    let mut by_url: HashMap<String, VecDeque<RenderedPage>> = HashMap::new();
    for page in pages {
        by_url
            .entry(page.url.to_string())
            .or_default()
            .push_back(page);
    }

    urls.iter()
        .map(|url| {
            by_url
                .get_mut(url.as_str())
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    RenderedPage::failed(url.clone(), format!("no result returned for {url}"))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        launches: AtomicUsize,
        fetches: AtomicUsize,
        closes: AtomicUsize,
        hold: Option<Arc<Notify>>,
        launch_hold: Option<Arc<Notify>>,
        reverse_batches: bool,
    }

    #[async_trait]
    impl BrowserBackend for FakeBackend {
        async fn launch(&self, config: &BrowserConfig) -> Result<(), BackendError> {
            assert!(config.headless);
            assert!(config.javascript_enabled);
            self.launches.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.launch_hold {
                hold.notified().await;
            }
            Ok(())
        }

        async fn fetch(&self, url: &Url, _config: &RunConfig) -> Result<RenderedPage, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            Ok(RenderedPage::succeeded(url.clone(), format!("body of {url}")))
        }

        async fn fetch_many(
            &self,
            urls: &[Url],
            config: &RunConfig,
            _concurrency: usize,
        ) -> Result<Vec<RenderedPage>, BackendError> {
            let mut pages = Vec::new();
            for url in urls {
                pages.push(self.fetch(url, config).await?);
            }
            if self.reverse_batches {
                pages.reverse();
            }
            Ok(pages)
        }

        async fn close(&self) -> Result<(), BackendError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("valid url")
    }

    fn session(backend: Arc<FakeBackend>) -> FetchSession {
        FetchSession::new(backend, BrowserConfig::default())
    }

    #[tokio::test]
    async fn fetch_before_start_is_not_ready() {
        let backend = Arc::new(FakeBackend::default());
        let session = session(backend.clone());

        let err = session
            .fetch_one(&FetchOptions::new(url("https://example.com")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Uninitialized
            }
        ));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lifecycle_runs_once_and_stop_is_idempotent() {
        let backend = Arc::new(FakeBackend::default());
        let session = session(backend.clone());

        session.start().await.expect("first start");
        assert!(session.is_ready());
        assert!(matches!(
            session.start().await,
            Err(SessionError::AlreadyStarted {
                state: SessionState::Ready
            })
        ));

        let page = session
            .fetch_one(&FetchOptions::new(url("https://example.com")))
            .await
            .expect("fetch while ready");
        assert!(page.success);

        session.stop().await.expect("stop");
        session.stop().await.expect("second stop");
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(backend.launches.load(Ordering::SeqCst), 1);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

        let err = session
            .fetch_many(&[url("https://example.com")], &RunConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Stopped
            }
        ));
    }

    #[tokio::test]
    async fn stopping_unstarted_session_skips_backend() {
        let backend = Arc::new(FakeBackend::default());
        let session = session(backend.clone());

        session.stop().await.expect("stop");

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 0);
        assert!(session.start().await.is_err());
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_fetch() {
        let hold = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend {
            hold: Some(hold.clone()),
            ..FakeBackend::default()
        });
        let session = Arc::new(session(backend.clone()));
        session.start().await.expect("start");

        let fetching = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .fetch_one(&FetchOptions::new(url("https://example.com")))
                    .await
            })
        };
        while backend.fetches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let stopping = {
            let session = session.clone();
            tokio::spawn(async move { session.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.state(), SessionState::ShuttingDown);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 0);

        hold.notify_one();
        let page = fetching.await.expect("join").expect("fetch completes");
        assert!(page.success);
        stopping.await.expect("join").expect("stop completes");
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_during_launch_keeps_session_stopped() {
        let launch_hold = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend {
            launch_hold: Some(launch_hold.clone()),
            ..FakeBackend::default()
        });
        let session = Arc::new(session(backend.clone()));

        let starting = {
            let session = session.clone();
            tokio::spawn(async move { session.start().await })
        };
        while backend.launches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.stop().await.expect("stop");
        assert_eq!(session.state(), SessionState::Stopped);

        launch_hold.notify_one();
        let started = starting.await.expect("join");
        assert!(matches!(started, Err(SessionError::StoppedDuringStart)));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

        let err = session
            .fetch_one(&FetchOptions::new(url("https://example.com")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Stopped
            }
        ));
    }

    #[tokio::test]
    async fn batch_results_are_realigned_to_input_order() {
        let backend = Arc::new(FakeBackend {
            reverse_batches: true,
            ..FakeBackend::default()
        });
        let session = session(backend);
        session.start().await.expect("start");

        let urls = vec![
            url("https://a.example/"),
            url("https://b.example/"),
            url("https://c.example/"),
        ];
        let pages = session
            .fetch_many(&urls, &RunConfig::default())
            .await
            .expect("batch");

        let returned: Vec<&Url> = pages.iter().map(|page| &page.url).collect();
        assert_eq!(returned, urls.iter().collect::<Vec<_>>());
    }

    #[test]
    fn missing_batch_results_become_failures() {
        let urls = vec![url("https://a.example/"), url("https://b.example/")];
        let pages = vec![RenderedPage::succeeded(url("https://b.example/"), "b")];

        let aligned = align_pages(&urls, pages);

        assert_eq!(aligned.len(), 2);
        assert!(!aligned[0].success);
        assert!(
            aligned[0]
                .error_detail
                .as_deref()
                .is_some_and(|detail| detail.contains("a.example"))
        );
        assert!(aligned[1].success);
    }

    #[test]
    fn duplicate_urls_each_claim_one_page() {
        let urls = vec![url("https://a.example/"), url("https://a.example/")];
        let pages = vec![
            RenderedPage::succeeded(url("https://a.example/"), "first"),
            RenderedPage::failed(url("https://a.example/"), "second"),
        ];

        let aligned = align_pages(&urls, pages.clone());
        assert_eq!(aligned, pages);
    }
}
