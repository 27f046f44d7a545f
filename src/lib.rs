//! Classy Transactions Sync Library
//!
//! Pulls every fundraising transaction of a Classy campaign and publishes
//! them as a single normalized JSON export for downstream dashboards.
//!
//! # Pipeline Stages
//!
//! 1. **Authentication** ([`auth`]): OAuth2 client-credentials token with cached expiry
//! 2. **Transaction Collection** ([`fetch_transactions`], [`classy`]): Paginated fetch with retry and rate limiting
//! 3. **Normalization** ([`normalize`]): Status filtering and mapping onto the export schema
//! 4. **Export** ([`sink`]): Atomic JSON write with run metadata
//!
//! [`sync`] sequences the stages for a single run.
//!
//! # Example
//!
//! ```no_run
//! use classy_sync::config::SyncConfig;
//! use classy_sync::sync::run_sync;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::load()?;
//!     let summary = run_sync(&config).await?;
//!     println!("Exported {} transactions", summary.processed);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod classy;
pub mod config;
pub mod fetch_transactions;
pub mod logging;
pub mod normalize;
pub mod schemas;
pub mod sink;
pub mod sync;

#[cfg(test)]
mod stub_http;

// Re-export commonly used types
pub use config::SyncConfig;
pub use schemas::{ExportDocument, NormalizedTransaction, RawTransaction};
pub use sync::{run_sync, SyncSummary};
