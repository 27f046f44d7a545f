//! Classy REST API client.
//!
//! Wraps the campaign transactions endpoint:
//! - Bearer authentication through the [`TokenManager`]
//! - Related-object inclusion (`with=fundraising_team,fundraising_page,member`)
//! - Mapping of transport, HTTP and decode failures onto [`FetchError`]

use crate::auth::TokenManager;
use crate::config::SyncConfig;
use crate::fetch_transactions::{FetchError, PageSource};
use crate::schemas::RawTransaction;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Longest response body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One page of the transactions collection
#[derive(Debug, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub data: Option<Vec<RawTransaction>>,

    /// Total records across all pages, when the API reports it
    #[serde(default)]
    pub total: Option<u64>,

    #[serde(default)]
    pub current_page: Option<u32>,

    #[serde(default)]
    pub last_page: Option<u32>,
}

impl TransactionPage {
    pub fn into_transactions(self) -> Vec<RawTransaction> {
        self.data.unwrap_or_default()
    }
}

/// Authenticated client for a single campaign's transactions
pub struct ClassyClient {
    client: reqwest::Client,
    tokens: TokenManager,
    transactions_url: String,
    include: String,
}

impl ClassyClient {
    pub fn new(config: &SyncConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.http.request_timeout())
            .user_agent(concat!("classy-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            tokens: TokenManager::new(config)?,
            transactions_url: config.transactions_url(),
            include: config.http.include.join(","),
        })
    }

    pub fn transactions_url(&self) -> &str {
        &self.transactions_url
    }

    /// Fetch one page including the pagination envelope.
    pub async fn fetch_transaction_page(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<TransactionPage, FetchError> {
        let token = self.tokens.get_token().await?;

        let response = self
            .client
            .get(&self.transactions_url)
            .bearer_auth(token.value())
            .query(&[
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("with", self.include.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response.text().await?;
        let envelope: TransactionPage = serde_json::from_str(&body)?;

        debug!(
            "Page {} envelope: current_page={:?}, last_page={:?}, total={:?}",
            page, envelope.current_page, envelope.last_page, envelope.total
        );

        Ok(envelope)
    }
}

impl PageSource for ClassyClient {
    async fn fetch_page(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RawTransaction>, FetchError> {
        self.fetch_transaction_page(page, per_page)
            .await
            .map(TransactionPage::into_transactions)
    }
}

/// One line per top-level field of a raw record, sorted by key.
///
/// Nested objects list their keys, arrays their length, scalars their value
/// and JSON type.
pub fn describe_fields(record: &RawTransaction) -> Vec<String> {
    let Some(fields) = record.as_object() else {
        return Vec::new();
    };

    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| match &fields[key.as_str()] {
            Value::Object(nested) => {
                let nested_keys: Vec<&str> = nested.keys().map(String::as_str).collect();
                format!("{}: object with keys: [{}]", key, nested_keys.join(", "))
            }
            Value::Array(items) => format!("{}: array with {} items", key, items.len()),
            Value::Null => format!("{}: null", key),
            Value::Bool(b) => format!("{}: {} (boolean)", key, b),
            Value::Number(n) => format!("{}: {} (number)", key, n),
            Value::String(s) => format!("{}: {} (string)", key, s),
        })
        .collect()
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;
    use crate::fetch_transactions::PAGE_SIZE;
    use crate::stub_http::StubServer;

    #[test]
    fn test_page_envelope_parsing() {
        let page: TransactionPage = serde_json::from_str(
            r#"{"current_page":1,"last_page":3,"per_page":100,"total":250,
                "data":[{"id":1},{"id":2}]}"#,
        )
        .unwrap();
        assert_eq!(page.total, Some(250));
        assert_eq!(page.last_page, Some(3));
        assert_eq!(page.into_transactions().len(), 2);
    }

    #[test]
    fn test_missing_or_null_data_is_empty_page() {
        let page: TransactionPage = serde_json::from_str(r#"{"total":0}"#).unwrap();
        assert!(page.into_transactions().is_empty());

        let page: TransactionPage = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(page.into_transactions().is_empty());
    }

    #[test]
    fn test_non_object_body_is_decode_error() {
        let result: Result<TransactionPage, _> = serde_json::from_str("[1,2,3]");
        let err = FetchError::from(result.unwrap_err());
        assert!(matches!(err, FetchError::Decode(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_describe_fields() {
        let record = serde_json::json!({
            "status": "success",
            "id": 17,
            "member": {"first_name": "Ada"},
            "items": [1, 2],
            "comment": null,
            "is_anonymous": false,
        });
        assert_eq!(
            describe_fields(&record),
            vec![
                "comment: null",
                "id: 17 (number)",
                "is_anonymous: false (boolean)",
                "items: array with 2 items",
                "member: object with keys: [first_name]",
                "status: success (string)",
            ]
        );
        assert!(describe_fields(&serde_json::json!([1])).is_empty());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short  "), "short");
        let long = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }

    fn stub_config(server: &StubServer) -> SyncConfig {
        let mut config = SyncConfig::from_toml_str(
            r#"
            [classy]
            client_id = "id"
            client_secret = "secret"
            campaign_id = "656775"
            "#,
        )
        .unwrap();
        config.classy.token_url = format!("{}/oauth2/auth", server.url);
        config.classy.api_base_url = format!("{}/2.0", server.url);
        config
    }

    const GRANT: &str = r#"{"access_token":"tok123","expires_in":3600}"#;

    #[tokio::test]
    async fn test_page_requests_carry_query_and_bearer_token() {
        let server = StubServer::start(vec![
            (200, GRANT),
            (200, r#"{"total":3,"data":[{"id":1},{"id":2}]}"#),
            (200, r#"{"total":3,"data":[{"id":3}]}"#),
        ])
        .await;
        let mut client = ClassyClient::new(&stub_config(&server)).unwrap();

        let first = client.fetch_page(1, PAGE_SIZE).await.unwrap();
        let second = client.fetch_page(2, PAGE_SIZE).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second[0]["id"], 3);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/oauth2/auth");

        for (request, page) in requests[1..].iter().zip(1..) {
            assert_eq!(request.method, "GET");
            assert_eq!(
                request.target,
                format!(
                    "/2.0/campaigns/656775/transactions?page={}&per_page=100&with=fundraising_team%2Cfundraising_page%2Cmember",
                    page
                )
            );
            assert_eq!(request.header("authorization"), Some("Bearer tok123"));
        }
    }

    #[tokio::test]
    async fn test_error_status_becomes_transient_failure() {
        let server = StubServer::start(vec![(200, GRANT), (503, "upstream unavailable")]).await;
        let mut client = ClassyClient::new(&stub_config(&server)).unwrap();

        let err = client.fetch_page(1, PAGE_SIZE).await.unwrap_err();
        match &err {
            FetchError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "upstream unavailable");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_token_failure_surfaces_as_fatal() {
        let server = StubServer::start(vec![(401, r#"{"error":"invalid_client"}"#)]).await;
        let mut client = ClassyClient::new(&stub_config(&server)).unwrap();

        let err = client.fetch_page(1, PAGE_SIZE).await.unwrap_err();
        assert!(matches!(err, FetchError::Token(TokenError::Status { status: 401, .. })));
        assert!(!err.is_transient());
        // No page request is made without a token
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn test_client_uses_campaign_url_and_include_list() {
        let config = SyncConfig::from_toml_str(
            r#"
            [classy]
            client_id = "id"
            client_secret = "secret"
            campaign_id = "656775"
            "#,
        )
        .unwrap();
        let client = ClassyClient::new(&config).unwrap();
        assert_eq!(
            client.transactions_url(),
            "https://api.classy.org/2.0/campaigns/656775/transactions"
        );
        assert_eq!(client.include, "fundraising_team,fundraising_page,member");
    }
}
