use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::DomainError;

/// Threshold applied when a request does not carry one, and for every batch item.
pub const DEFAULT_FILTER_THRESHOLD: f64 = 0.4;
/// Upper bound on the number of URLs accepted by a single batch request.
pub const MAX_BATCH_URLS: usize = 10;
/// Error reported for a failed page when the backend supplies no detail.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Crawl failed";

/// Content density cutoff in `[0.0, 1.0]`; higher values prune more aggressively.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct FilterThreshold(f64);

impl FilterThreshold {
    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "filter_threshold must be between 0.0 and 1.0, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for FilterThreshold {
    fn default() -> Self {
        Self(DEFAULT_FILTER_THRESHOLD)
    }
}

impl fmt::Display for FilterThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a user supplied URL, accepting only absolute `http`/`https` URLs with a host.
pub fn parse_target_url(raw: &str) -> Result<Url, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("url must not be empty"));
    }

    let url = Url::parse(trimmed)
        .map_err(|err| DomainError::validation(format!("invalid url `{trimmed}`: {err}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DomainError::validation(format!(
            "unsupported url scheme `{}`; expected http or https",
            url.scheme()
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(DomainError::validation(format!(
            "url `{trimmed}` has no host"
        )));
    }

    Ok(url)
}

/// Validated per-request options for a single crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub target_url: Url,
    pub include_raw_text: bool,
    pub filter_threshold: FilterThreshold,
    pub wait_for_selector: Option<String>,
    pub injected_script: Option<String>,
}

impl FetchOptions {
    pub fn new(target_url: Url) -> Self {
        Self {
            target_url,
            include_raw_text: false,
            filter_threshold: FilterThreshold::default(),
            wait_for_selector: None,
            injected_script: None,
        }
    }

    pub fn with_threshold(mut self, threshold: FilterThreshold) -> Self {
        self.filter_threshold = threshold;
        self
    }

    pub fn with_raw_text(mut self, include: bool) -> Self {
        self.include_raw_text = include;
        self
    }

    pub fn with_wait_for_selector(mut self, selector: Option<String>) -> Self {
        self.wait_for_selector = non_blank(selector);
        self
    }

    pub fn with_injected_script(mut self, script: Option<String>) -> Self {
        self.injected_script = non_blank(script);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|candidate| !candidate.trim().is_empty())
}

/// Ordered list of URLs crawled together, bounded to `1..=MAX_BATCH_URLS` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    urls: Vec<Url>,
}

impl BatchRequest {
    pub fn new(urls: Vec<Url>) -> Result<Self, DomainError> {
        check_batch_len(urls.len())?;
        Ok(Self { urls })
    }

    /// Validate the size first so an oversized batch is rejected without inspecting any URL.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, DomainError> {
        check_batch_len(raw.len())?;
        let urls = raw
            .iter()
            .map(|value| parse_target_url(value.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

fn check_batch_len(len: usize) -> Result<(), DomainError> {
    if len == 0 {
        return Err(DomainError::validation(
            "batch must contain at least one url",
        ));
    }
    if len > MAX_BATCH_URLS {
        return Err(DomainError::validation(format!(
            "Maximum {MAX_BATCH_URLS} URLs per batch request, got {len}"
        )));
    }
    Ok(())
}

/// Outcome of one backend fetch. Lives only for the orchestration call that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: Url,
    pub raw_text: String,
    /// Present only when the backend separated boilerplate itself.
    pub filtered_text: Option<String>,
    pub title: Option<String>,
    pub success: bool,
    pub error_detail: Option<String>,
}

impl RenderedPage {
    pub fn succeeded(url: Url, raw_text: impl Into<String>) -> Self {
        Self {
            url,
            raw_text: raw_text.into(),
            filtered_text: None,
            title: None,
            success: true,
            error_detail: None,
        }
    }

    pub fn failed(url: Url, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            url,
            raw_text: String::new(),
            filtered_text: None,
            title: None,
            success: false,
            error_detail: (!detail.trim().is_empty()).then_some(detail),
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_filtered_text(mut self, filtered: impl Into<String>) -> Self {
        self.filtered_text = Some(filtered.into());
        self
    }
}

/// Normalised response for one URL. Failures never carry text; successes never carry an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub url: String,
    pub title: Option<String>,
    #[serde(rename = "markdown")]
    pub text: String,
    #[serde(rename = "raw_markdown")]
    pub raw_text: Option<String>,
    pub word_count: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl CrawlRecord {
    pub fn succeeded(
        url: &Url,
        title: Option<String>,
        text: String,
        raw_text: Option<String>,
        word_count: usize,
    ) -> Self {
        Self {
            url: url.to_string(),
            title,
            text,
            raw_text,
            word_count,
            success: true,
            error: None,
        }
    }

    pub fn failed(url: &Url, error: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            text: String::new(),
            raw_text: None,
            word_count: 0,
            success: false,
            error: Some(error.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("valid url")
    }

    #[test]
    fn threshold_accepts_closed_unit_interval() {
        assert_eq!(FilterThreshold::new(0.0).unwrap().get(), 0.0);
        assert_eq!(FilterThreshold::new(1.0).unwrap().get(), 1.0);
        assert_eq!(FilterThreshold::default().get(), DEFAULT_FILTER_THRESHOLD);
    }

    #[test]
    fn threshold_rejects_out_of_range_and_nan() {
        for value in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    FilterThreshold::new(value),
                    Err(DomainError::Validation { .. })
                ),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn target_url_requires_http_scheme_and_host() {
        assert!(parse_target_url("https://example.com").is_ok());
        assert!(parse_target_url("  http://example.com/a?b=c ").is_ok());
        assert!(parse_target_url("").is_err());
        assert!(parse_target_url("example.com").is_err());
        assert!(parse_target_url("ftp://example.com").is_err());
        assert!(parse_target_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn fetch_options_drop_blank_optionals() {
        let options = FetchOptions::new(url("https://example.com"))
            .with_wait_for_selector(Some("   ".to_string()))
            .with_injected_script(Some("window.scrollTo(0, 1)".to_string()));

        assert!(options.wait_for_selector.is_none());
        assert_eq!(
            options.injected_script.as_deref(),
            Some("window.scrollTo(0, 1)")
        );
        assert!(!options.include_raw_text);
    }

    #[test]
    fn batch_of_ten_is_accepted() {
        let raw: Vec<String> = (0..MAX_BATCH_URLS)
            .map(|i| format!("https://example.com/{i}"))
            .collect();
        let batch = BatchRequest::parse(&raw).expect("ten urls are allowed");
        assert_eq!(batch.len(), MAX_BATCH_URLS);
        assert_eq!(batch.urls()[3].path(), "/3");
    }

    #[test]
    fn batch_of_eleven_is_rejected_before_url_parsing() {
        let raw: Vec<&str> = vec!["not a url"; MAX_BATCH_URLS + 1];
        let err = BatchRequest::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("Maximum 10 URLs"));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let raw: Vec<&str> = Vec::new();
        assert!(BatchRequest::parse(&raw).is_err());
        assert!(BatchRequest::new(Vec::new()).is_err());
    }

    #[test]
    fn failed_page_drops_blank_detail() {
        let page = RenderedPage::failed(url("https://example.com"), "  ");
        assert!(!page.success);
        assert!(page.error_detail.is_none());
    }

    #[test]
    fn failed_record_has_no_text_and_a_message() {
        let record = CrawlRecord::failed(&url("https://example.com"), None);
        assert!(!record.success);
        assert_eq!(record.text, "");
        assert_eq!(record.word_count, 0);
        assert_eq!(record.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[test]
    fn record_serializes_with_public_field_names() {
        let record = CrawlRecord::succeeded(
            &url("https://example.com"),
            Some("Example".to_string()),
            "Main content".to_string(),
            None,
            2,
        );
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["url"], "https://example.com/");
        assert_eq!(value["markdown"], "Main content");
        assert!(value["raw_markdown"].is_null());
        assert_eq!(value["word_count"], 2);
        assert_eq!(value["success"], true);
        assert!(value["error"].is_null());
    }

    #[test]
    fn absent_optional_fields_serialize_as_null() {
        let record = CrawlRecord::failed(&url("https://example.com"), None);
        let value = serde_json::to_value(&record).expect("serialize");
        let fields = value.as_object().expect("object");
        for key in ["title", "raw_markdown"] {
            assert!(fields.contains_key(key), "{key} should be present");
            assert!(fields[key].is_null());
        }
        assert_eq!(fields["error"], DEFAULT_FAILURE_MESSAGE);
    }
}
