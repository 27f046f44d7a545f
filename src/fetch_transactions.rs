//! Paginated transaction retrieval with bounded exponential backoff.
//!
//! [`PageFetcher`] walks pages 1, 2, 3, ... of any [`PageSource`] until a
//! short page is returned. Each page gets its own retry budget; a page that
//! exhausts it aborts the whole fetch and nothing fetched so far is returned.

use crate::auth::TokenError;
use crate::config::RetryConfig;
use crate::schemas::RawTransaction;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Records requested per page; a shorter page marks the end of the collection.
pub const PAGE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("access token unavailable: {0}")]
    Token(#[from] TokenError),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid page body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("page {page} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        page: u32,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }
}

/// How the fetch loop should react to a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth another attempt after a backoff
    Transient,
    /// Abort the run immediately
    Fatal,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Token(_) | FetchError::RetriesExhausted { .. } => FailureKind::Fatal,
            FetchError::Timeout
            | FetchError::Http(_)
            | FetchError::Status { .. }
            | FetchError::Decode(_) => FailureKind::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// A paged collection of raw transactions.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    /// Fetch a single 1-based page.
    async fn fetch_page(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RawTransaction>, FetchError>;
}

/// Per-page retry budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_retry_delay(),
            backoff_factor: config.backoff_factor,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` (1-based): `initial * factor^(retry - 1)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Walks every page of a [`PageSource`].
#[derive(Debug, Clone)]
pub struct PageFetcher {
    policy: RetryPolicy,
    rate_limit_delay: Duration,
}

impl PageFetcher {
    pub fn new(policy: RetryPolicy, rate_limit_delay: Duration) -> Self {
        Self {
            policy,
            rate_limit_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(RetryPolicy::from_config(config), config.rate_limit_delay())
    }

    /// Fetch all pages in order and return the concatenated records.
    pub async fn fetch_all<S: PageSource>(
        &self,
        source: &mut S,
    ) -> Result<Vec<RawTransaction>, FetchError> {
        let mut all_transactions = Vec::new();
        let mut page: u32 = 1;

        loop {
            let transactions = self.fetch_page_with_retry(source, page).await?;
            let page_count = transactions.len();
            all_transactions.extend(transactions);

            if page_count > 0 {
                info!(
                    "Successfully fetched {} transactions from page {} (total so far: {})",
                    page_count,
                    page,
                    all_transactions.len()
                );
            }

            if page_count < PAGE_SIZE as usize {
                break;
            }

            page += 1;

            // Be polite to the upstream API between pages
            tokio::time::sleep(self.rate_limit_delay).await;
        }

        info!("Total transactions fetched: {}", all_transactions.len());
        Ok(all_transactions)
    }

    async fn fetch_page_with_retry<S: PageSource>(
        &self,
        source: &mut S,
        page: u32,
    ) -> Result<Vec<RawTransaction>, FetchError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            if attempt == 1 {
                info!("Fetching page {} of transactions...", page);
            } else {
                info!(
                    "Retrying page {} (attempt {}/{})...",
                    page, attempt, max_attempts
                );
            }

            let err = match source.fetch_page(page, PAGE_SIZE).await {
                Ok(transactions) => return Ok(transactions),
                Err(e) => e,
            };

            if !err.is_transient() {
                error!("Fatal error on page {}: {}", page, err);
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    "Final error on page {} after {} attempts: {}",
                    page, max_attempts, err
                );
                return Err(FetchError::RetriesExhausted {
                    page,
                    attempts: max_attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_before_retry(attempt);
            warn!(
                "[attempt {}] Error on page {}: {}, retrying in {:?}",
                attempt, page, err, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
