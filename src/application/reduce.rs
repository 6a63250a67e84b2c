//! Turns a page's raw text into its filtered ("fit") form.

use std::sync::Arc;

use crate::domain::types::{FilterThreshold, RenderedPage};

/// Removes low-information segments from extracted page text.
///
/// Returning `None` signals that the filter could not separate content from
/// boilerplate; callers then fall back to the raw text.
pub trait ContentFilter: Send + Sync {
    fn filter(&self, raw: &str, threshold: FilterThreshold) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reduction {
    pub fit: String,
    pub raw: String,
}

impl Reduction {
    pub fn word_count(&self) -> usize {
        word_count(&self.fit)
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Clone)]
pub struct ContentReducer {
    filter: Arc<dyn ContentFilter>,
}

impl ContentReducer {
    pub fn new(filter: Arc<dyn ContentFilter>) -> Self {
        Self { filter }
    }

    pub fn reduce(&self, raw: &str, threshold: FilterThreshold) -> Reduction {
        if raw.trim().is_empty() {
            return Reduction {
                fit: String::new(),
                raw: raw.to_string(),
            };
        }

        let fit = self
            .filter
            .filter(raw, threshold)
            .unwrap_or_else(|| raw.to_string());

        Reduction {
            fit,
            raw: raw.to_string(),
        }
    }

    /// Reduce a rendered page, preferring text the backend already filtered.
    pub fn reduce_page(&self, page: &RenderedPage, threshold: FilterThreshold) -> Reduction {
        match page.filtered_text.as_ref() {
            Some(fit) => Reduction {
                fit: fit.clone(),
                raw: page.raw_text.clone(),
            },
            None => self.reduce(&page.raw_text, threshold),
        }
    }
}

impl Default for ContentReducer {
    fn default() -> Self {
        Self::new(Arc::new(PruningFilter::default()))
    }
}

const DENSE_BLOCK_WORDS: f64 = 20.0;
const WORD_WEIGHT: f64 = 0.5;
const SENTENCE_WEIGHT: f64 = 0.25;
const ALPHA_WEIGHT: f64 = 0.25;
const HEADING_BONUS: f64 = 0.3;

/// Block-level pruning with a fixed cutoff.
///
/// Each non-empty line is one block. A block scores in `[0, 1]` from its word
/// density, whether it reads like prose, and how much of it is alphabetic;
/// headings get a bonus so section titles survive alongside their content.
/// Blocks scoring below the threshold are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruningFilter;

impl PruningFilter {
    pub fn score(block: &str) -> f64 {
        let words = word_count(block);
        if words == 0 {
            return 0.0;
        }

        let density = (words as f64 / DENSE_BLOCK_WORDS).min(1.0);
        let sentence = if block
            .trim_end()
            .ends_with(['.', '!', '?', ':', ';', '"', ')'])
        {
            1.0
        } else {
            0.0
        };

        let visible = block.chars().filter(|c| !c.is_whitespace()).count();
        let alphabetic = block.chars().filter(|c| c.is_alphabetic()).count();
        let alpha_ratio = if visible == 0 {
            0.0
        } else {
            alphabetic as f64 / visible as f64
        };

        let mut score =
            WORD_WEIGHT * density + SENTENCE_WEIGHT * sentence + ALPHA_WEIGHT * alpha_ratio;
        if block.trim_start().starts_with('#') {
            score += HEADING_BONUS;
        }
        score.min(1.0)
    }
}

impl ContentFilter for PruningFilter {
    fn filter(&self, raw: &str, threshold: FilterThreshold) -> Option<String> {
        let blocks: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if blocks.is_empty() {
            return None;
        }

        let kept: Vec<&str> = blocks
            .into_iter()
            .filter(|block| Self::score(block) >= threshold.get())
            .collect();
        Some(kept.join("\n"))
    }
}
