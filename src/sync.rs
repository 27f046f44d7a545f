//! End-to-end sync run: fetch, normalize, write.

use crate::classy::ClassyClient;
use crate::config::SyncConfig;
use crate::fetch_transactions::{PageFetcher, PageSource};
use crate::normalize::Normalizer;
use crate::schemas::ExportDocument;
use crate::sink::write_export;
use anyhow::Context;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub fetched: usize,
    pub processed: usize,
    pub filtered: usize,
    pub failed: usize,

    /// `None` when nothing was fetched and no file was written
    pub output_path: Option<PathBuf>,

    pub elapsed: Duration,
}

/// Run a full sync against the Classy API.
pub async fn run_sync(config: &SyncConfig) -> anyhow::Result<SyncSummary> {
    let mut client = ClassyClient::new(config).context("Failed to build Classy API client")?;
    info!("Syncing transactions from {}", client.transactions_url());
    if let Some(organization_id) = &config.classy.organization_id {
        info!("Organization: {}", organization_id);
    }
    run_with_source(&mut client, config).await
}

/// Run a full sync reading pages from `source`.
pub async fn run_with_source<S: PageSource>(
    source: &mut S,
    config: &SyncConfig,
) -> anyhow::Result<SyncSummary> {
    let start = Instant::now();
    info!("Starting Classy transactions sync");

    let fetcher = PageFetcher::from_config(&config.retry);
    let raw = fetcher
        .fetch_all(source)
        .await
        .context("Failed to fetch transactions")?;

    if raw.is_empty() {
        warn!("No transactions found");
        let summary = SyncSummary {
            fetched: 0,
            processed: 0,
            filtered: 0,
            failed: 0,
            output_path: None,
            elapsed: start.elapsed(),
        };
        log_summary(&summary);
        return Ok(summary);
    }

    let batch = Normalizer::new(&config.filter.excluded_statuses).normalize(&raw);
    let (processed, filtered, failed) = (batch.processed(), batch.filtered, batch.failed);

    let output_path = config.paths.output_file.clone();
    let document = ExportDocument::new(batch.transactions);
    write_export(&output_path, &document)
        .with_context(|| format!("Failed to write export to {:?}", output_path))?;

    let summary = SyncSummary {
        fetched: raw.len(),
        processed,
        filtered,
        failed,
        output_path: Some(output_path),
        elapsed: start.elapsed(),
    };
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &SyncSummary) {
    info!("=== Sync Summary ===");
    info!("Fetched:   {}", summary.fetched);
    info!("Processed: {}", summary.processed);
    info!("Filtered:  {}", summary.filtered);
    info!("Failed:    {}", summary.failed);
    if let Some(path) = &summary.output_path {
        info!("Output:    {}", path.display());
    }
    info!(
        "Sync completed successfully in {:.2} seconds",
        summary.elapsed.as_secs_f64()
    );
}
