//! Data schemas for the sync job.
//!
//! This module is the canonical definition of the exported JSON document.
//! Upstream records stay loosely typed until the normalizer maps them onto
//! [`NormalizedTransaction`].

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Version marker written into every export
pub const EXPORT_VERSION: &str = "2025-08-21";

/// Transaction exactly as returned by the API.
///
/// The upstream schema is not contractually fixed, so records are kept as
/// raw JSON and every field is read defensively during normalization.
pub type RawTransaction = serde_json::Value;

// ============================================================================
// Normalized Transaction
// ============================================================================

/// Flat, fixed-shape transaction record written to the export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedTransaction {
    pub transaction_id: String,

    /// Gross amount charged
    pub amount: serde_json::Number,

    /// ISO-4217 currency code
    pub currency: String,

    pub fee_amount: serde_json::Number,

    /// Donation amount after fees
    pub net_amount: serde_json::Number,

    pub status: String,

    /// Payment type (e.g. "cc", "paypal")
    #[serde(rename = "type")]
    pub transaction_type: String,

    pub payment_method: String,

    /// `%Y-%m-%d %H:%M:%S`, or the upstream string if it could not be parsed
    pub created_date: String,

    pub updated_date: String,

    pub member_name: String,

    pub member_email: String,

    pub fundraising_page_title: String,

    pub fundraising_team_name: String,

    pub campaign_id: String,

    pub designation_id: String,

    pub comment: String,

    pub is_anonymous: bool,

    /// Whether the transaction belongs to a recurring donation plan
    pub is_recurring: bool,

    /// "In honor of" dedication text
    pub tribute_info: String,
}

// ============================================================================
// Export Document
// ============================================================================

/// Run metadata stored alongside the exported transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMetadata {
    /// Local generation timestamp (RFC 3339)
    pub generated_at: String,

    pub total_transactions: usize,

    pub version: String,
}

/// The complete JSON document written by the sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub transactions: Vec<NormalizedTransaction>,
}

impl ExportDocument {
    pub fn new(transactions: Vec<NormalizedTransaction>) -> Self {
        Self {
            metadata: ExportMetadata {
                generated_at: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
                total_transactions: transactions.len(),
                version: EXPORT_VERSION.to_string(),
            },
            transactions,
        }
    }
}
