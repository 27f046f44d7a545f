//! Transaction normalization.
//!
//! Maps loosely-typed upstream records onto the fixed export schema. Every
//! output field gets an explicit default, excluded statuses are dropped, and
//! a record that cannot be mapped is logged and skipped without affecting
//! the rest of the batch.
//!
//! A scalar field with an unexpected JSON type is logged and replaced by its
//! default; only records whose overall shape is wrong are skipped.

use crate::config::default_excluded_statuses;
use crate::schemas::{NormalizedTransaction, RawTransaction};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Output format for `created_date` / `updated_date`
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DEFAULT_CURRENCY: &str = "USD";
const ANONYMOUS_MEMBER: &str = "Anonymous";

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("record is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("field `{field}` is a JSON {found}")]
    UnexpectedType {
        field: &'static str,
        found: &'static str,
    },
}

/// Result of normalizing one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// Surviving records in input order
    pub transactions: Vec<NormalizedTransaction>,

    /// Records dropped because of their status
    pub filtered: usize,

    /// Records skipped because they could not be mapped
    pub failed: usize,
}

impl NormalizedBatch {
    pub fn processed(&self) -> usize {
        self.transactions.len()
    }
}

/// What happened to a single record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Kept(NormalizedTransaction),
    Filtered,
}

/// Stateless mapper from raw API records to [`NormalizedTransaction`]
#[derive(Debug, Clone)]
pub struct Normalizer {
    excluded_statuses: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&default_excluded_statuses())
    }
}

impl Normalizer {
    pub fn new(excluded_statuses: &[String]) -> Self {
        Self {
            excluded_statuses: excluded_statuses
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
        }
    }

    /// Normalize a batch, isolating per-record failures.
    pub fn normalize(&self, raw: &[RawTransaction]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            transactions: Vec::with_capacity(raw.len()),
            ..Default::default()
        };

        for record in raw {
            match self.normalize_record(record) {
                Ok(RecordOutcome::Kept(transaction)) => batch.transactions.push(transaction),
                Ok(RecordOutcome::Filtered) => batch.filtered += 1,
                Err(e) => {
                    batch.failed += 1;
                    warn!("Error processing transaction {}: {}", record_id(record), e);
                }
            }
        }

        info!(
            "Processed {} transactions for JSON output",
            batch.processed()
        );
        if batch.filtered > 0 {
            info!(
                "Filtered out {} transactions with excluded status ({})",
                batch.filtered,
                self.excluded_statuses.join(", ")
            );
        }
        if batch.failed > 0 {
            warn!("Skipped {} transactions that could not be processed", batch.failed);
        }

        batch
    }

    /// Map a single record, or report that it was filtered out.
    pub fn normalize_record(
        &self,
        record: &RawTransaction,
    ) -> Result<RecordOutcome, NormalizeError> {
        let map = record
            .as_object()
            .ok_or_else(|| NormalizeError::NotAnObject(json_type(record)))?;
        let id = record_id(record);
        let fields = Fields { map, id: &id };

        let status = status_field(map)?;
        if self.is_excluded(&status) {
            return Ok(RecordOutcome::Filtered);
        }

        let (member_name, member_email) = resolve_member(&fields);

        Ok(RecordOutcome::Kept(NormalizedTransaction {
            transaction_id: fields.text_or_default("id"),
            amount: fields.amount("total_gross_amount"),
            currency: fields
                .text("currency_code")
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            fee_amount: fields.amount("fees_amount"),
            net_amount: fields.amount("donation_net_amount"),
            status,
            transaction_type: fields.text_or_default("payment_type"),
            payment_method: fields.text_or_default("payment_method"),
            created_date: format_date(fields.text("created_at").as_deref()),
            updated_date: format_date(fields.text("updated_at").as_deref()),
            member_name,
            member_email,
            fundraising_page_title: resolve_related(
                &fields,
                "fundraising_page",
                "title",
                "fundraising_page_id",
                "Page ID",
            )?,
            fundraising_team_name: resolve_related(
                &fields,
                "fundraising_team",
                "name",
                "fundraising_team_id",
                "Team ID",
            )?,
            campaign_id: fields.text_or_default("campaign_id"),
            designation_id: fields.text_or_default("designation_id"),
            comment: fields.text_or_default("comment"),
            is_anonymous: fields.flag("is_anonymous"),
            is_recurring: is_present(map.get("recurring_donation_plan_id")),
            tribute_info: fields.text_or_default("in_honor_of"),
        }))
    }

    fn is_excluded(&self, status: &str) -> bool {
        let status = status.trim().to_lowercase();
        self.excluded_statuses.iter().any(|s| *s == status)
    }
}

/// Format an ISO-8601 timestamp as [`DATE_FORMAT`], keeping its own offset.
///
/// Unparsable input is returned unchanged; missing input becomes `""`.
pub fn format_date(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return raw.to_string();
    }

    let with_offset = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&with_offset) {
        return dt.format(DATE_FORMAT).to_string();
    }
    if let Ok(dt) = DateTime::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return dt.format(DATE_FORMAT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return dt.format(DATE_FORMAT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.format(DATE_FORMAT).to_string();
        }
    }

    raw.to_string()
}

// ============================================================================
// Field helpers
// ============================================================================

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Id for log messages, `unknown` when the record has none
fn record_id(record: &RawTransaction) -> String {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Lenient reader over one record (or one of its nested objects).
///
/// Values of the wrong JSON type are logged against the record id and read
/// as absent.
struct Fields<'a> {
    map: &'a Map<String, Value>,
    id: &'a str,
}

impl<'a> Fields<'a> {
    fn nested(&self, map: &'a Map<String, Value>) -> Fields<'a> {
        Fields { map, id: self.id }
    }

    fn ignore(&self, key: &str, value: &Value) {
        warn!(
            "Transaction {}: field `{}` has unexpected {} value {}, using default",
            self.id,
            key,
            json_type(value),
            value
        );
    }

    /// Scalar field as text; absent and `null` become `None`.
    fn text(&self, key: &str) -> Option<String> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(other) => {
                self.ignore(key, other);
                None
            }
        }
    }

    fn text_or_default(&self, key: &str) -> String {
        self.text(key).unwrap_or_default()
    }

    /// Monetary field; absent, `null`, blank and unparsable values become 0.
    fn amount(&self, key: &str) -> Number {
        let parsed = match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => return n.clone(),
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value @ Value::String(s)) => {
                let parsed = parse_amount(s);
                if parsed.is_none() {
                    self.ignore(key, value);
                }
                parsed
            }
            Some(other) => {
                self.ignore(key, other);
                None
            }
        };
        parsed.unwrap_or_else(|| Number::from(0))
    }

    fn flag(&self, key: &str) -> bool {
        match self.map.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(value @ Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" | "" => false,
                _ => {
                    self.ignore(key, value);
                    false
                }
            },
            Some(other) => {
                self.ignore(key, other);
                false
            }
        }
    }
}

fn parse_amount(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Number::from(int));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

/// The filter decision depends on status, so a non-text status fails the record.
fn status_field(map: &Map<String, Value>) -> Result<String, NormalizeError> {
    match map.get("status") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(NormalizeError::UnexpectedType {
            field: "status",
            found: json_type(other),
        }),
    }
}

/// Whether an optional identifier is set (non-null, non-empty, non-zero).
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Name and email from the nested `member` object, falling back to the
/// top-level copies when the object is missing or empty.
fn resolve_member(fields: &Fields<'_>) -> (String, String) {
    let (name, email) = match fields.map.get("member") {
        Some(Value::Object(member)) if !member.is_empty() => {
            let member = fields.nested(member);
            let first = member.text_or_default("first_name");
            let last = member.text_or_default("last_name");
            (
                format!("{} {}", first.trim(), last.trim()).trim().to_string(),
                member.text_or_default("email_address"),
            )
        }
        _ => (
            fields.text_or_default("member_name").trim().to_string(),
            fields.text_or_default("member_email_address"),
        ),
    };

    let name = if name.is_empty() {
        ANONYMOUS_MEMBER.to_string()
    } else {
        name
    };
    (name, email.trim().to_string())
}

/// Title/name of a nested related object, or a placeholder carrying its id.
fn resolve_related(
    fields: &Fields<'_>,
    object_key: &'static str,
    label_key: &str,
    id_key: &str,
    placeholder: &str,
) -> Result<String, NormalizeError> {
    let label = match fields.map.get(object_key) {
        None | Some(Value::Null) => None,
        Some(Value::Object(related)) => fields.nested(related).text(label_key),
        Some(other) => {
            return Err(NormalizeError::UnexpectedType {
                field: object_key,
                found: json_type(other),
            })
        }
    };
    if let Some(label) = label {
        return Ok(label);
    }

    Ok(match fields.text(id_key) {
        Some(id) if !id.is_empty() => format!("{}: {}", placeholder, id),
        _ => String::new(),
    })
}
