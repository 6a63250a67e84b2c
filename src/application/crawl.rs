//! Single and batch crawl orchestration.

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use tracing::{info, warn};
use url::Url;

use crate::domain::{
    error::DomainError,
    types::{BatchRequest, CrawlRecord, FetchOptions, FilterThreshold, RenderedPage},
};

use super::{
    backend::RunConfig, error::AppError, reduce::ContentReducer, session::FetchSession,
};

pub const METRIC_CRAWL_TOTAL: &str = "pagefit_crawl_total";
pub const METRIC_CRAWL_FAILED_TOTAL: &str = "pagefit_crawl_failed_total";
pub const METRIC_CRAWL_MS: &str = "pagefit_crawl_ms";
pub const METRIC_BATCH_SIZE: &str = "pagefit_batch_size";

#[derive(Clone)]
pub struct CrawlService {
    session: Arc<FetchSession>,
    reducer: ContentReducer,
}

impl CrawlService {
    pub fn new(session: Arc<FetchSession>, reducer: ContentReducer) -> Self {
        Self { session, reducer }
    }

    pub fn session(&self) -> &Arc<FetchSession> {
        &self.session
    }

    /// Crawl one URL. A page that fails to load is a record, not an error.
    pub async fn crawl(&self, options: FetchOptions) -> Result<CrawlRecord, AppError> {
        let started = Instant::now();
        let page = self.session.fetch_one(&options).await?;
        let record = self.normalize(
            &options.target_url,
            page,
            options.filter_threshold,
            options.include_raw_text,
        );

        histogram!(METRIC_CRAWL_MS, "mode" => "single")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        record_outcome(&record, "single");
        info!(
            target = "pagefit::crawl",
            url = %record.url,
            success = record.success,
            word_count = record.word_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crawl finished"
        );
        Ok(record)
    }

    /// Crawl every URL in the batch with the default threshold. Output order
    /// matches input order and one failing URL never affects the others.
    pub async fn crawl_batch(&self, batch: BatchRequest) -> Result<Vec<CrawlRecord>, AppError> {
        let started = Instant::now();
        histogram!(METRIC_BATCH_SIZE).record(batch.len() as f64);

        let threshold = FilterThreshold::default();
        let config = RunConfig::new(threshold);
        let pages = self.session.fetch_many(batch.urls(), &config).await?;
        if pages.len() != batch.len() {
            return Err(DomainError::invariant(format!(
                "batch of {} urls produced {} pages",
                batch.len(),
                pages.len()
            ))
            .into());
        }

        let records: Vec<CrawlRecord> = batch
            .urls()
            .iter()
            .zip(pages)
            .map(|(url, page)| self.normalize(url, page, threshold, false))
            .collect();

        histogram!(METRIC_CRAWL_MS, "mode" => "batch")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        for record in &records {
            record_outcome(record, "batch");
        }
        let failed = records.iter().filter(|record| !record.success).count();
        info!(
            target = "pagefit::crawl",
            urls = records.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch crawl finished"
        );
        Ok(records)
    }

    fn normalize(
        &self,
        url: &Url,
        page: RenderedPage,
        threshold: FilterThreshold,
        include_raw_text: bool,
    ) -> CrawlRecord {
        if !page.success {
            warn!(
                target = "pagefit::crawl",
                url = %url,
                error = page.error_detail.as_deref().unwrap_or(""),
                "page fetch failed"
            );
            return CrawlRecord::failed(url, page.error_detail);
        }

        let reduction = self.reducer.reduce_page(&page, threshold);
        let word_count = reduction.word_count();
        CrawlRecord::succeeded(
            url,
            page.title,
            reduction.fit,
            include_raw_text.then_some(reduction.raw),
            word_count,
        )
    }
}

fn record_outcome(record: &CrawlRecord, mode: &'static str) {
    counter!(METRIC_CRAWL_TOTAL, "mode" => mode).increment(1);
    if !record.success {
        counter!(METRIC_CRAWL_FAILED_TOTAL, "mode" => mode).increment(1);
    }
}
